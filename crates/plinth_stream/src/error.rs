//! Stream error types

use plinth_core::RenderError;
use plinth_wire::WireError;
use thiserror::Error;

/// Errors raised by a message stream
#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Wire(#[from] WireError),

    /// The transport refused an outbound message
    #[error("transport failed: {0}")]
    Transport(#[source] anyhow::Error),

    #[error("stream has not been started")]
    NotStarted,

    #[error("stream has already been started")]
    AlreadyStarted,

    /// The stream was closed, or stopped after a fatal render error
    #[error("stream is closed")]
    Closed,

    /// A request named a callable that is not part of the current document
    #[error("unknown callable `{0}`")]
    UnknownCallable(String),
}

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;
