//! Room store error types

use super::token::RoomToken;

/// Error type for room store operations
#[derive(Debug, Clone)]
pub enum RoomError {
    /// Room not found (unknown or already torn down token)
    RoomNotFound(RoomToken),
}

impl std::fmt::Display for RoomError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomError::RoomNotFound(token) => write!(f, "Room not found: {}", token),
        }
    }
}

impl std::error::Error for RoomError {}
