//! Room token type
//!
//! A token names a room and doubles as the capability needed to join it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique identifier for a room
///
/// Generated once at room creation and immutable afterwards. A token is
/// valid if and only if the room store currently holds an entry for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomToken(String);

impl RoomToken {
    /// Generate a fresh token
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a client-supplied token string
    ///
    /// No validation happens here; unknown tokens are rejected by the store.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The token as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
