//! Per-request access decision, independent of the HTTP framework.

use bytes::Bytes;
use gatelog_store::ObjectStore;
use gatelog_types::{join_prefix, AccessDecision, AuditRecord};
use tracing::debug;

use crate::config::ServerConfig;

/// The request facts the gate looks at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AccessRequest {
    pub method: String,
    /// Request path as received, for the audit record.
    pub path: String,
    /// Raw query string, for the audit record.
    pub query: String,
    /// Decoded `file` query parameter.
    pub file: Option<String>,
    /// Decoded request path, the fallback file name.
    pub path_name: String,
    /// Value of the `X-country` header, untrimmed.
    pub country: String,
    pub user_agent: String,
}

/// The decision and, for a served file, its bytes.
#[derive(Clone, Debug)]
pub struct Outcome {
    pub record: AuditRecord,
    pub body: Option<Bytes>,
}

/// Object name for a request, or `None` if it names no file.
///
/// The `file` parameter wins over the path when it is non-empty after
/// stripping leading slashes.
pub fn resolve_name(file: Option<&str>, path_name: &str, prefix: &str) -> Option<String> {
    let from_query = file.map(|f| f.trim_start_matches('/')).unwrap_or_default();
    let name = if from_query.is_empty() {
        path_name.trim_start_matches('/')
    } else {
        from_query
    };
    if name.is_empty() {
        return None;
    }
    Some(join_prefix(prefix, name))
}

/// Run the request through method, country, name, and fetch checks.
///
/// Terminates at the first check that fails. Store faults become an
/// internal-error decision, never an `Err`.
pub async fn evaluate(store: &dyn ObjectStore, config: &ServerConfig, req: &AccessRequest) -> Outcome {
    let country = req.country.trim();
    let finish = |decision: AccessDecision, body: Option<Bytes>| Outcome {
        record: AuditRecord {
            decision,
            path: req.path.clone(),
            query: req.query.clone(),
            country: country.to_string(),
            user_agent: req.user_agent.clone(),
        },
        body,
    };

    if req.method != "GET" {
        return finish(
            AccessDecision::MethodNotImplemented {
                method: req.method.clone(),
            },
            None,
        );
    }

    if config.forbidden_countries.denied(&req.country).is_some() {
        return finish(AccessDecision::ForbiddenCountry, None);
    }

    let Some(object) = resolve_name(req.file.as_deref(), &req.path_name, &config.prefix) else {
        return finish(AccessDecision::missing_filename(), None);
    };
    let bucket = store.bucket().to_string();
    debug!(%bucket, %object, "resolved object");

    let internal = |error: String| AccessDecision::InternalError {
        error,
        bucket: bucket.clone(),
        object: object.clone(),
    };

    match store.exists(&object).await {
        Ok(true) => {}
        Ok(false) => return finish(AccessDecision::object_missing(&bucket, &object), None),
        Err(e) => return finish(internal(e.to_string()), None),
    }

    match store.read(&object).await {
        Ok(Some(found)) => {
            let decision = AccessDecision::FileServed {
                bucket: bucket.clone(),
                object: object.clone(),
                bytes: found.len() as u64,
            };
            finish(decision, Some(found.data))
        }
        // Deleted between the existence check and the download.
        Ok(None) => finish(AccessDecision::object_missing(&bucket, &object), None),
        Err(e) => finish(internal(e.to_string()), None),
    }
}
