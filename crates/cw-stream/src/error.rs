//! Error types for the ingestion core.

use thiserror::Error;

/// Errors raised by a byte source.
///
/// A read that simply times out is not an error: sources report it as an
/// empty read.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {port}: {message}")]
    Open { port: String, message: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("source reached end of stream")]
    Closed,

    #[error("device disconnected: {0}")]
    Disconnected(String),
}

/// Convenience alias for byte source results.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors surfaced by the controller.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("source open failed: {0}")]
    Open(#[from] SourceError),

    #[error("monitor already started")]
    AlreadyStarted,

    #[error("task join error: {0}")]
    Join(String),
}

/// Convenience alias for controller results.
pub type StreamResult<T> = Result<T, StreamError>;
