/// Errors from object store operations.
///
/// A failed precondition is not an error; see
/// [`WriteOutcome::Conflict`](crate::WriteOutcome::Conflict).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The object name is empty or escapes the store's namespace.
    #[error("invalid object name: {0:?}")]
    InvalidName(String),

    /// The backend answered with an unexpected HTTP status.
    #[error("store returned HTTP {status} for {name}: {message}")]
    Http {
        status: u16,
        name: String,
        message: String,
    },

    /// The request never produced a response (DNS, TLS, connection reset).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Stored metadata could not be decoded.
    #[error("corrupt object {name}: {reason}")]
    Corrupt { name: String, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    Task(String),

    /// The backend is misconfigured.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
