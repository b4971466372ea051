use std::time::Duration;

/// Errors that can occur while dispatching batches to the backend.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] streamgate_transport::TransportError),

    /// Backend connection I/O failed.
    #[error("backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend line codec failed.
    #[error("backend codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A reply was not valid base64.
    #[error("invalid base64 reply: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A command in the batch reported failure.
    #[error("{command} failed: {message}")]
    CommandFailed {
        command: &'static str,
        message: String,
    },

    /// The backend answered with the wrong number of results.
    #[error("expected {expected} results, got {got}")]
    ResultCount { expected: usize, got: usize },

    /// A command succeeded but its value has the wrong shape.
    #[error("unexpected {command} result: {message}")]
    UnexpectedResult {
        command: &'static str,
        message: String,
    },

    /// No authenticated session is available.
    #[error("no authenticated session")]
    NoSession,

    /// The batch did not complete in time.
    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),

    /// The gateway dropped the batch without answering.
    #[error("batch cancelled by gateway")]
    Cancelled,

    /// The backend closed the connection before answering.
    #[error("backend disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, DispatchError>;
