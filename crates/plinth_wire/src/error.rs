//! Wire error types

use thiserror::Error;

/// Errors raised while encoding documents or decoding client messages
#[derive(Error, Debug)]
pub enum WireError {
    /// A value has no wire representation
    #[error("cannot encode value at `{path}`: {reason}")]
    EncodingFailure { path: String, reason: String },

    /// An element reached the encoder without being rendered first
    #[error("element `{element}` at `{path}` was not rendered before encoding")]
    UnrenderedElement { element: String, path: String },

    /// A client message referred to an object index it was never sent
    #[error("unknown object reference {index}")]
    UnknownReference { index: u64 },

    /// A client message was not a well-formed request
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WireError {
    /// Short machine-readable name of the error kind, used on the wire
    pub fn kind(&self) -> &'static str {
        match self {
            WireError::EncodingFailure { .. } => "EncodingFailure",
            WireError::UnrenderedElement { .. } => "UnrenderedElement",
            WireError::UnknownReference { .. } => "UnknownReference",
            WireError::InvalidMessage(_) => "InvalidMessage",
            WireError::Json(_) => "JsonError",
        }
    }
}

/// Result type for wire operations
pub type Result<T> = std::result::Result<T, WireError>;
