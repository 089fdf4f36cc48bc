//! Room registry and wire events
//!
//! The room store is the authoritative source of truth for token validity,
//! membership, message history, and tracked media references. Fan-out uses
//! one unbounded channel per member, drained by that connection's writer
//! task.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<RoomStore>
//!                  ┌────────────────────────────┐
//!                  │ rooms: HashMap<RoomToken,  │
//!                  │   RoomEntry {              │
//!                  │     messages,              │
//!                  │     media_refs,            │
//!                  │     members: Map<Id, Tx>,  │
//!                  │   }                        │
//!                  │ >                          │
//!                  └─────────────┬──────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            │                   │                   │
//!            ▼                   ▼                   ▼
//!       [Member ws]         [Member ws]         [Member ws]
//!       rx.recv()           rx.recv()           rx.recv()
//!            │                   │                   │
//!            └──◄ store.broadcast() ◄── Coordinator handlers
//! ```
//!
//! Rooms are ephemeral by design: nothing here survives a process restart.

pub mod entry;
pub mod error;
pub mod event;
pub mod store;
pub mod token;

pub use entry::{MemberSender, RoomEntry};
pub use error::RoomError;
pub use event::{ChatMessage, InboundEvent, MessagePayload, OutboundEvent};
pub use store::{RemovedRoom, RoomStore};
pub use token::RoomToken;
