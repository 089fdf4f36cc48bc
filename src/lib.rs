//! Ephemeral room-scoped chat relay
//!
//! Clients mint a short-lived room over HTTP, join it over a WebSocket,
//! and exchange text messages and references to uploaded media. Rooms are
//! garbage-collected after a period of inactivity; all state is in-memory
//! and deliberately lost on restart.
//!
//! The interesting part is the room lifecycle and broadcast coordinator:
//! see [`coordinator`] for the event handlers, [`room`] for the registry,
//! and [`timer`] for the inactivity state machine.

pub mod coordinator;
pub mod error;
pub mod room;
pub mod server;
pub mod session;
pub mod storage;
pub mod timer;

pub use coordinator::{Coordinator, RelayConfig};
pub use error::{Result, ServerError};
pub use room::{ChatMessage, InboundEvent, MessagePayload, OutboundEvent, RoomStore, RoomToken};
pub use server::{RelayServer, ServerConfig};
pub use session::{SessionDirectory, SessionId};
pub use storage::{HttpObjectStorage, ObjectStorage, ResourceType};
pub use timer::TimerManager;
