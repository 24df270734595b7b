//! Error types for camera sessions

use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures reported by the signaling (SIP) collaborator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalingError {
    /// The remote dialog expired before the invite completed. Recoverable by
    /// requesting fresh signaling options and inviting again.
    #[error("Signaling session expired")]
    SessionExpired,

    /// The remote end declined the call
    #[error("Call rejected: {reason}")]
    Rejected { reason: String },

    /// SIP transport failure
    #[error("Signaling transport error: {message}")]
    Transport { message: String },

    #[error("Signaling error: {message}")]
    Other { message: String },
}

impl SignalingError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Errors that can occur in a camera session
#[derive(Debug, Error)]
pub enum SessionError {
    /// `start` was called on a session that has already been started
    #[error("Camera session has already been started")]
    AlreadyStarted,

    /// `start` was called on a session that has already ended
    #[error("Camera session has already ended")]
    AlreadyEnded,

    #[error(transparent)]
    Signaling(#[from] SignalingError),

    #[error("Port reservation failed: {message}")]
    PortReservation { message: String },

    #[error("Transcoder error: {message}")]
    Transcoder { message: String },

    #[error("STUN error: {0}")]
    Stun(#[from] sipcam_ice_core::Error),

    #[error("Media path is closed")]
    MediaPathClosed,

    #[error("Timed out waiting for {what}")]
    Timeout { what: String },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether this is the recoverable signaling-expiry condition
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::Signaling(SignalingError::SessionExpired))
    }

    /// Whether this error is a misuse of the session API rather than a runtime failure
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::AlreadyStarted | Self::AlreadyEnded)
    }

    pub fn port_reservation(message: impl Into<String>) -> Self {
        Self::PortReservation {
            message: message.into(),
        }
    }

    pub fn transcoder(message: impl Into<String>) -> Self {
        Self::Transcoder {
            message: message.into(),
        }
    }

    pub fn timeout(what: impl Into<String>) -> Self {
        Self::Timeout { what: what.into() }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
