use std::sync::Arc;

use bytes::Bytes;
use gatelog_queue::{Attributes, Publisher};
use gatelog_types::AuditRecord;
use tracing::{info, warn};

/// Tracing target that carries one JSON audit record per access decision.
pub const AUDIT_TARGET: &str = "gatelog::audit";

/// Emits audit records to the log and, optionally, to a topic.
///
/// Publishing is best effort. A failed publish is logged and does not
/// change the response the client receives.
#[derive(Clone, Default)]
pub struct AuditRelay {
    publisher: Option<Arc<dyn Publisher>>,
}

impl AuditRelay {
    /// Log records only.
    pub fn log_only() -> Self {
        Self::default()
    }

    /// Log records and publish each one as a JSON event.
    pub fn publishing(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher: Some(publisher),
        }
    }

    pub fn is_publishing(&self) -> bool {
        self.publisher.is_some()
    }

    pub async fn emit(&self, record: &AuditRecord) {
        let json = match record.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(event_type = record.event_type(), error = %e, "audit record not serializable");
                return;
            }
        };
        info!(target: AUDIT_TARGET, event_type = record.event_type(), record = %json);

        let Some(publisher) = &self.publisher else {
            return;
        };
        let mut attributes = Attributes::new();
        attributes.insert("event_type".into(), record.event_type().into());
        if let Err(e) = publisher.publish(Bytes::from(json), attributes).await {
            warn!(event_type = record.event_type(), error = %e, "audit event not published");
        }
    }
}

impl std::fmt::Debug for AuditRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRelay")
            .field("publishing", &self.is_publishing())
            .finish()
    }
}
