//! Error types for STUN encoding and decoding

use thiserror::Error;

/// Result type for ice-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while handling STUN messages
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported STUN message
    #[error("STUN error: {0}")]
    Stun(String),

    /// MESSAGE-INTEGRITY could not be computed or verified
    #[error("Message integrity error: {0}")]
    Integrity(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a STUN format error
    pub fn stun(message: impl Into<String>) -> Self {
        Self::Stun(message.into())
    }
}
