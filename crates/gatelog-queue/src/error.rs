/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The ack id does not name an outstanding delivery.
    #[error("unknown ack id: {0}")]
    UnknownAckId(String),

    /// The backend answered with an unexpected HTTP status.
    #[error("queue returned HTTP {status} for {operation}: {message}")]
    Http {
        status: u16,
        operation: String,
        message: String,
    },

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The queue is closed and accepts no more operations.
    #[error("queue is closed")]
    Closed,

    /// The backend is misconfigured.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
