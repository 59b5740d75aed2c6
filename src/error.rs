//! Error types shared across the presence subsystem.
//!
//! DESIGN
//! ======
//! Errors never cross into the host page. The session driver logs them and
//! degrades to solo mode, so these enums exist for the transport adapters,
//! the storage backends, and the relay's error frames.

// =============================================================================
// CHANNEL
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("subscription refused: {0}")]
    Refused(String),
    #[error("transport connect failed: {0}")]
    Connect(String),
    #[error("channel closed")]
    Closed,
    #[error("timed out waiting for the transport")]
    Timeout,
    #[error("outbound queue full")]
    Busy,
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl crate::frame::ErrorCode for ChannelError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Refused(_) => "E_REFUSED",
            Self::Connect(_) => "E_CONNECT",
            Self::Closed => "E_CLOSED",
            Self::Timeout => "E_TIMEOUT",
            Self::Busy => "E_BUSY",
            Self::Protocol(_) => "E_PROTOCOL",
            Self::Json(_) => "E_JSON",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Timeout | Self::Closed | Self::Busy)
    }
}

// =============================================================================
// STORAGE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session storage unavailable: {0}")]
    Unavailable(String),
    #[error("session storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("session storage is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// RELAY
// =============================================================================

/// Failures the relay reports back to a websocket client as error frames.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("not subscribed to a topic")]
    NotSubscribed,
    #[error("already subscribed to {0}")]
    AlreadySubscribed(String),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("unknown syscall: {0}")]
    UnknownSyscall(String),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl crate::frame::ErrorCode for RelayError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotSubscribed => "E_NOT_SUBSCRIBED",
            Self::AlreadySubscribed(_) => "E_ALREADY_SUBSCRIBED",
            Self::InvalidFrame(_) => "E_INVALID_FRAME",
            Self::UnknownSyscall(_) => "E_UNKNOWN_SYSCALL",
            Self::Channel(_) => "E_CHANNEL",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Channel(e) => crate::frame::ErrorCode::retryable(e),
            _ => false,
        }
    }
}
