//! Error types for herdbook-sync

use thiserror::Error;

use crate::conflict::ConflictError;

/// Result type alias using herdbook-sync's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in herdbook-sync operations
#[derive(Error, Debug)]
pub enum Error {
    /// Version conflict reported by the server (HTTP 409)
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Transport-level failure (timeout, 5xx, connectivity loss)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Transport-level failure of a dispatched mutation.
///
/// Recoverable up to the retry cap via exponential backoff; distinct from a
/// 409 conflict, which is resolved deterministically in one step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Server returned a failure status
    #[error("Server returned status {0}")]
    Status(u16),

    /// Connection dropped before a response arrived
    #[error("Connection lost")]
    ConnectionLost,
}
