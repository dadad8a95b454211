use std::future::Future;
use std::sync::Arc;

use gatelog_store::ObjectStore;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::relay::AuditRelay;
use crate::router::build_router;

/// Access-gated file server.
pub struct FileServer {
    config: ServerConfig,
    store: Arc<dyn ObjectStore>,
    relay: AuditRelay,
}

impl FileServer {
    pub fn new(config: ServerConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config,
            store,
            relay: AuditRelay::log_only(),
        }
    }

    /// Publish audit records through `relay` as well as logging them.
    pub fn with_relay(mut self, relay: AuditRelay) -> Self {
        self.relay = relay;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(
            self.store.clone(),
            self.config.clone(),
            self.relay.clone(),
        ))
    }

    /// Serve until `shutdown` resolves. In-flight requests are drained.
    pub async fn serve_until<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.config.validate()?;
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            bucket = self.store.bucket(),
            prefix = %self.config.prefix,
            publishing = self.relay.is_publishing(),
            "file server listening on {}",
            self.config.bind_addr
        );
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }

    /// Serve until the process is stopped.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_until(std::future::pending()).await
    }
}
