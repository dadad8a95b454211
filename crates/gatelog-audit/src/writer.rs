use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use gatelog_store::{ObjectStore, Precondition, StoreError, WriteOutcome};
use gatelog_types::Generation;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{AuditError, AuditResult};

/// Proof that a line landed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppendReceipt {
    /// Generation of the log object that contains the line.
    pub generation: Generation,
    /// 1 if the first attempt won, higher after lost races.
    pub attempts: u32,
    /// Size of the log object after the append.
    pub size: usize,
}

/// What one read-modify-write round produced.
enum Attempt {
    Committed { generation: Generation, size: usize },
    Conflict,
    Fatal(StoreError),
}

/// Appends lines to a log object that lives in an [`ObjectStore`].
///
/// Each append reads the object and its generation, writes back the old
/// content plus the new line on condition that the generation is unchanged
/// (or, for a missing object, that it is still missing), and starts over
/// when another writer got there first. A successful append is therefore
/// never overwritten by a concurrent one. Line order follows commit order.
#[derive(Clone)]
pub struct AppendLog {
    store: Arc<dyn ObjectStore>,
    policy: RetryPolicy,
}

impl AppendLog {
    pub fn new(store: Arc<dyn ObjectStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Append `line` plus a newline to `object`.
    ///
    /// Returns [`AuditError::Exhausted`] when every allowed attempt lost
    /// its race, and [`AuditError::Store`] at once on any other store
    /// failure. In both cases the object is unchanged by this call.
    pub async fn append(&self, object: &str, line: &str) -> AuditResult<AppendReceipt> {
        if line.contains(['\n', '\r']) {
            return Err(AuditError::InvalidLine(line.to_string()));
        }

        let max_attempts = self.policy.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.try_append(object, line).await {
                Attempt::Committed { generation, size } => {
                    debug!(object, %generation, attempt, "line appended");
                    return Ok(AppendReceipt {
                        generation,
                        attempts: attempt,
                        size,
                    });
                }
                Attempt::Conflict => {
                    debug!(object, attempt, "generation moved, retrying");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.policy.delay_for(attempt)).await;
                    }
                }
                Attempt::Fatal(e) => return Err(e.into()),
            }
        }

        warn!(object, attempts = max_attempts, "append retries exhausted");
        Err(AuditError::Exhausted {
            object: object.to_string(),
            attempts: max_attempts,
        })
    }

    async fn try_append(&self, object: &str, line: &str) -> Attempt {
        let current = match self.store.read(object).await {
            Ok(current) => current,
            Err(e) => return Attempt::Fatal(e),
        };
        let precondition = Precondition::after_read(current.as_ref());
        let content = concat_line(current.as_ref().map(|c| &c.data), line);
        let size = content.len();

        match self.store.write_if(object, content, precondition).await {
            Ok(WriteOutcome::Committed(generation)) => Attempt::Committed { generation, size },
            Ok(WriteOutcome::Conflict) => Attempt::Conflict,
            Err(e) => Attempt::Fatal(e),
        }
    }
}

fn concat_line(current: Option<&Bytes>, line: &str) -> Bytes {
    let existing = current.map_or(0, Bytes::len);
    let mut buf = BytesMut::with_capacity(existing + line.len() + 1);
    if let Some(current) = current {
        buf.extend_from_slice(current);
    }
    buf.extend_from_slice(line.as_bytes());
    buf.extend_from_slice(b"\n");
    buf.freeze()
}

impl std::fmt::Debug for AppendLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppendLog")
            .field("bucket", &self.store.bucket())
            .field("policy", &self.policy)
            .finish()
    }
}
