use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use gatelog_store::ObjectStore;

use crate::config::ServerConfig;
use crate::gate::{self, AccessRequest, Outcome};
use crate::relay::AuditRelay;

/// Header carrying the client-declared country.
pub const COUNTRY_HEADER: &str = "x-country";

/// Shared, read-only state for every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub config: Arc<ServerConfig>,
    pub relay: AuditRelay,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, config: ServerConfig, relay: AuditRelay) -> Self {
        Self {
            store,
            config: Arc::new(config),
            relay,
        }
    }
}

/// Single endpoint: gate the request, fetch the object, record the decision.
pub async fn file_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path: Option<Path<String>>,
    query: Option<Query<Vec<(String, String)>>>,
) -> Response {
    // Header values may carry non-ASCII bytes; keep them rather than drop them.
    let header = |name: &str| {
        headers
            .get(name)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    };
    // First `file` wins when the parameter is repeated.
    let file = query.and_then(|Query(pairs)| {
        pairs.into_iter().find(|(key, _)| key == "file").map(|(_, value)| value)
    });

    let request = AccessRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        file,
        path_name: path.map(|Path(p)| p).unwrap_or_default(),
        country: header(COUNTRY_HEADER),
        user_agent: header(USER_AGENT.as_str()),
    };

    let outcome = gate::evaluate(state.store.as_ref(), &state.config, &request).await;
    state.relay.emit(&outcome.record).await;
    into_response(outcome)
}

fn into_response(outcome: Outcome) -> Response {
    let status = StatusCode::from_u16(outcome.record.decision.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match (outcome.body, outcome.record.decision.error_body()) {
        (Some(data), _) => (status, [(CONTENT_TYPE, "application/octet-stream")], data).into_response(),
        (None, body) => (
            status,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            body.unwrap_or("500 Internal Server Error\n"),
        )
            .into_response(),
    }
}
