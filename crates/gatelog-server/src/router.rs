use axum::routing::any;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the router: every path and method reaches the file handler.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", any(handler::file_handler))
        .route("/*path", any(handler::file_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
