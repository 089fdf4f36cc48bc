//! Crate-level error types

/// Convenience result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Top-level error for running the relay server
#[derive(Debug)]
pub enum ServerError {
    /// I/O error (bind, accept, serve)
    Io(std::io::Error),
    /// Invalid configuration value
    Config { key: String, reason: String },
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
            ServerError::Config { key, reason } => {
                write!(f, "Invalid configuration for {}: {}", key, reason)
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Io(e) => Some(e),
            ServerError::Config { .. } => None,
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e)
    }
}
