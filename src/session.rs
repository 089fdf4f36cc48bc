//! Connection sessions
//!
//! A session binds a live connection to the display name it presented at
//! join time. Sessions are never persisted: a reconnect is a new identity
//! with no continuity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

/// Unique identity of a live connection
pub type SessionId = u64;

/// Display name used when a session has vanished mid-flight
///
/// Session loss must never block delivery, so handlers fall back to this
/// instead of erroring.
pub const ANONYMOUS: &str = "Anonymous";

/// Directory of active sessions
///
/// Entries are written only by the owning connection's join and disconnect
/// handlers.
pub struct SessionDirectory {
    names: RwLock<HashMap<SessionId, String>>,
    next_session_id: AtomicU64,
}

impl SessionDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self {
            names: RwLock::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh session ID for a new connection
    pub fn allocate(&self) -> SessionId {
        self.next_session_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Bind a session to a display name
    pub async fn register(&self, session_id: SessionId, name: impl Into<String>) {
        self.names.write().await.insert(session_id, name.into());
    }

    /// Look up the display name for a session
    pub async fn resolve(&self, session_id: SessionId) -> Option<String> {
        self.names.read().await.get(&session_id).cloned()
    }

    /// Look up the display name, falling back to [`ANONYMOUS`]
    pub async fn resolve_or_anonymous(&self, session_id: SessionId) -> String {
        self.resolve(session_id)
            .await
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    /// Remove a session, returning the name it was bound to
    pub async fn remove(&self, session_id: SessionId) -> Option<String> {
        self.names.write().await.remove(&session_id)
    }

    /// Number of active sessions
    pub async fn len(&self) -> usize {
        self.names.read().await.len()
    }

    /// Whether the directory is empty
    pub async fn is_empty(&self) -> bool {
        self.names.read().await.is_empty()
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new()
    }
}
