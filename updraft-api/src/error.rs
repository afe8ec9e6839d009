//! API error types.

use serde::Deserialize;
use thiserror::Error;

/// Result type for API calls.
pub type Result<T> = std::result::Result<T, ApiError>;

/// Structured error object returned by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteError {
    pub error_code: i64,
    #[serde(default)]
    pub error_msg: String,
}

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request never produced a response (connect, timeout, TLS).
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The call reached the API and the API reported a failure.
    #[error("API error {}: {}", .0.error_code, .0.error_msg)]
    Application(RemoteError),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Body was not the JSON we expected.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response decoded but is missing required data.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl ApiError {
    /// Remote error object, if the API reported one.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Application(err) => Some(err),
            _ => None,
        }
    }

    /// Failures below the API layer: network, timeouts, HTTP status.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Http { .. })
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }

    /// Get the HTTP status code if this is a response error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
