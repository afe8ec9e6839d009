//! Decode error types

use thiserror::Error;

/// Why a raw update could not be turned into a typed event.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Update is not an array")]
    NotAnArray,

    #[error("Update has no event code")]
    MissingCode,

    #[error("Event {code}: missing field at position {index}")]
    MissingField { code: i64, index: usize },

    #[error("Event {code}: field at position {index} is not {expected}")]
    InvalidField {
        code: i64,
        index: usize,
        expected: &'static str,
    },

    #[error("Unknown event type: {0}")]
    UnknownKind(String),

    #[error("Invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, DecodeError>;
