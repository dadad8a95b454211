use gatelog_queue::QueueError;
use gatelog_store::StoreError;

/// Errors from the audit pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Every attempt lost its race; the line was not written.
    #[error("append to {object} gave up after {attempts} conflicting attempts")]
    Exhausted { object: String, attempts: u32 },

    /// The line would not stay a single line in the log.
    #[error("log line contains a line break: {0:?}")]
    InvalidLine(String),

    /// A stored line does not have the expected shape.
    #[error("unparsable log line: {0}")]
    Parse(String),

    /// The object store failed for a reason other than a lost race.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The queue failed to deliver, ack, or nack.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl AuditError {
    /// Returns `true` for retry exhaustion, as opposed to a hard failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

pub type AuditResult<T> = Result<T, AuditError>;
