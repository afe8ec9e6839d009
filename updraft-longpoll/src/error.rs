//! Error types for the long poll session.

use thiserror::Error;
use updraft_api::ApiError;
use updraft_events::DecodeError;

/// Result type for long poll operations.
pub type LongPollResult<T> = Result<T, LongPollError>;

/// Long poll errors.
#[derive(Debug, Error)]
pub enum LongPollError {
    /// A setter or constructor argument is out of range
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// `run` was called while the loop is running
    #[error("Long poll is already running")]
    AlreadyRunning,

    /// No server coordinates; call `connect` or `set_server` first
    #[error("Long poll server is undefined")]
    ServerUndefined,

    /// The server does not support the requested protocol version
    #[error("Long poll protocol version is not supported")]
    InvalidVersion,

    /// Failure code without a recovery action
    #[error("Long poll failed with code {0}")]
    Failed(i64),

    /// API executor error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// An update could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// The update receiver was dropped
    #[error("Update queue closed")]
    QueueClosed,
}

impl LongPollError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Network-level failure that a later attempt may not hit.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Api(err) if err.is_transport())
    }
}
