//! Error types for the callback server

use std::net::SocketAddr;
use thiserror::Error;
use updraft_api::ApiError;

/// Result type for callback server operations
pub type WebhookResult<T> = Result<T, WebhookError>;

/// Errors raised by the callback server and its admin calls.
///
/// Failures while handling a notification never surface here; they become
/// an HTTP status for the sender.
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Invalid configuration or argument
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// The listen address could not be bound
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Callback server is already running")]
    AlreadyRunning,

    #[error("Callback server is not running")]
    NotRunning,

    /// Transport or remote application error from an admin call
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WebhookError {
    pub(crate) fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}
