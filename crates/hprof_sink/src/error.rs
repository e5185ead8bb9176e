//! Error types for sink operations.

use std::io;
use thiserror::Error;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors that can occur while writing to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The sink was already closed.
    #[error("sink is closed")]
    Closed,

    /// The debugger transport rejected a chunk.
    #[error("transport error: {0}")]
    Transport(String),
}
