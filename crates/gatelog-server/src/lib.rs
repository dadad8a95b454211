//! Access-gated file server for gatelog.
//!
//! A single endpoint serves objects from the configured bucket. Each
//! request passes a method check, a country denylist check, and name
//! resolution before the object is fetched. Every request ends in exactly
//! one [`gatelog_types::AuditRecord`], which is logged and optionally
//! published for the audit consumer.

pub mod config;
pub mod error;
pub mod gate;
pub mod handler;
pub mod relay;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use gate::{resolve_name, AccessRequest, Outcome};
pub use handler::{AppState, COUNTRY_HEADER};
pub use relay::{AuditRelay, AUDIT_TARGET};
pub use server::FileServer;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, HeaderValue, Request, StatusCode};
    use axum::response::Response;
    use bytes::Bytes;
    use gatelog_queue::{InMemoryQueue, Subscription};
    use gatelog_store::{
        InMemoryObjectStore, ObjectStore, Precondition, StoreError, StoreResult, StoredObject,
        WriteOutcome,
    };
    use gatelog_types::Generation;
    use serde_json::Value;
    use tower::util::ServiceExt;

    /// Fails every lookup with a detailed error.
    struct Faulty;

    #[async_trait]
    impl ObjectStore for Faulty {
        fn bucket(&self) -> &str {
            "faulty"
        }
        async fn read(&self, name: &str) -> StoreResult<Option<StoredObject>> {
            Err(StoreError::Corrupt {
                name: name.into(),
                reason: "disk on fire at /var/secret".into(),
            })
        }
        async fn exists(&self, name: &str) -> StoreResult<bool> {
            self.read(name).await.map(|o| o.is_some())
        }
        async fn write_if(&self, _: &str, _: Bytes, _: Precondition) -> StoreResult<WriteOutcome> {
            Ok(WriteOutcome::Conflict)
        }
        async fn put(&self, _: &str, _: Bytes) -> StoreResult<Generation> {
            Ok(Generation::first())
        }
    }

    struct Harness {
        app: axum::Router,
        queue: Arc<InMemoryQueue>,
    }

    async fn harness(store: Arc<dyn ObjectStore>, config: ServerConfig) -> Harness {
        let queue = Arc::new(InMemoryQueue::new());
        let relay = AuditRelay::publishing(queue.clone());
        let app = FileServer::new(config, store).with_relay(relay).router();
        Harness { app, queue }
    }

    async fn seeded() -> Harness {
        let store = Arc::new(InMemoryObjectStore::new("my-bucket"));
        store.put("foo.txt", Bytes::from_static(b"foo contents\n")).await.unwrap();
        store.put("docs/a.txt", Bytes::from_static(b"A")).await.unwrap();
        harness(store, ServerConfig::default()).await
    }

    impl Harness {
        async fn send(&self, request: Request<Body>) -> Response {
            self.app.clone().oneshot(request).await.unwrap()
        }

        async fn get(&self, uri: &str) -> Response {
            self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
        }

        /// The one audit event the last request published.
        async fn audit(&self) -> Value {
            let batch = self.queue.pull(10).await.unwrap();
            assert_eq!(batch.len(), 1, "exactly one audit record per request");
            self.queue.ack(&batch[0].ack_id).await.unwrap();
            serde_json::from_slice(&batch[0].data).unwrap()
        }
    }

    async fn body(response: Response) -> Bytes {
        to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[tokio::test]
    async fn non_get_is_not_implemented() {
        let h = seeded().await;
        for method in ["POST", "PUT", "DELETE", "HEAD"] {
            let response = h
                .send(
                    Request::builder()
                        .method(method)
                        .uri("/foo.txt?x=1")
                        .header(header::USER_AGENT, "curl/8")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await;
            assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
            let event = h.audit().await;
            assert_eq!(event["event_type"], "method_not_implemented");
            assert_eq!(event["method"], method);
            assert_eq!(event["query"], "x=1");
            assert_eq!(event["user_agent"], "curl/8");
            if method != "HEAD" {
                assert_eq!(body(response).await, "501 Not Implemented\n");
            }
        }
    }

    #[tokio::test]
    async fn forbidden_country_is_rejected() {
        let h = seeded().await;
        let response = h
            .send(
                Request::builder()
                    .uri("/foo.txt")
                    .header("X-country", "Iran")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(body(response).await, "400 Permission Denied\n");

        let event = h.audit().await;
        assert_eq!(event["event_type"], "forbidden_country");
        assert_eq!(event["country"], "Iran");
        assert_eq!(event["path"], "/foo.txt");
    }

    #[tokio::test]
    async fn allowed_country_passes() {
        let h = seeded().await;
        let response = h
            .send(
                Request::builder()
                    .uri("/foo.txt")
                    .header("X-country", "Iranian Republic")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn root_without_file_param_is_missing_filename() {
        let h = seeded().await;
        let response = h.get("/").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(response).await, "404 Not Found\n");

        let event = h.audit().await;
        assert_eq!(event["event_type"], "file_not_found");
        assert_eq!(event["reason"], "missing_filename");
        assert!(event.get("object").is_none());
    }

    #[tokio::test]
    async fn existing_object_is_served_byte_for_byte() {
        let h = seeded().await;
        let response = h.get("/foo.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        let data = body(response).await;
        assert_eq!(data, "foo contents\n");

        let event = h.audit().await;
        assert_eq!(event["event_type"], "file_served");
        assert_eq!(event["bucket"], "my-bucket");
        assert_eq!(event["object"], "foo.txt");
        assert_eq!(event["bytes"], data.len() as u64);
    }

    #[tokio::test]
    async fn file_param_takes_precedence_over_path() {
        let h = seeded().await;
        let response = h.get("/ignored.txt?file=docs/a.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "A");
        assert_eq!(h.audit().await["object"], "docs/a.txt");
    }

    #[tokio::test]
    async fn repeated_file_param_uses_first() {
        let h = seeded().await;
        let response = h.get("/?file=docs/a.txt&file=foo.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "A");
        let event = h.audit().await;
        assert_eq!(event["object"], "docs/a.txt");
        assert_eq!(event["query"], "file=docs/a.txt&file=foo.txt");

        let response = h.get("/foo.txt?other=1&file=docs/a.txt&other=2").await;
        assert_eq!(body(response).await, "A");
        h.audit().await;
    }

    #[tokio::test]
    async fn non_ascii_headers_are_kept() {
        let store = Arc::new(InMemoryObjectStore::new("b"));
        store.put("a", Bytes::from_static(b"a")).await.unwrap();
        let config = ServerConfig {
            forbidden_countries: gatelog_types::CountryDenylist::new(["Côte d'Ivoire"]),
            ..ServerConfig::default()
        };
        let h = harness(store, config).await;
        let request = |country: &str| {
            Request::builder()
                .uri("/a")
                .header("X-country", HeaderValue::from_bytes(country.as_bytes()).unwrap())
                .header(header::USER_AGENT, HeaderValue::from_bytes("naïve/1.0".as_bytes()).unwrap())
                .body(Body::empty())
                .unwrap()
        };

        let response = h.send(request("Côte d'Ivoire")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let event = h.audit().await;
        assert_eq!(event["country"], "Côte d'Ivoire");
        assert_eq!(event["user_agent"], "naïve/1.0");

        let response = h.send(request("España")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.audit().await["country"], "España");
    }

    #[tokio::test]
    async fn invalid_utf8_header_is_replaced_not_dropped() {
        let h = seeded().await;
        let response = h
            .send(
                Request::builder()
                    .uri("/foo.txt")
                    .header("X-country", HeaderValue::from_bytes(b"Espa\xf1a").unwrap())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.audit().await["country"], "Espa\u{fffd}a");
    }

    #[tokio::test]
    async fn nested_path_and_percent_encoding() {
        let h = seeded().await;
        assert_eq!(h.get("/docs/a.txt").await.status(), StatusCode::OK);
        h.audit().await;
        assert_eq!(h.get("/?file=docs%2Fa.txt").await.status(), StatusCode::OK);
        h.audit().await;
    }

    #[tokio::test]
    async fn missing_object_cites_bucket_and_name() {
        let h = seeded().await;
        let response = h.get("/nope.txt").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(response).await, "404 Not Found\n");

        let event = h.audit().await;
        assert_eq!(event["reason"], "object_missing");
        assert_eq!(event["bucket"], "my-bucket");
        assert_eq!(event["object"], "nope.txt");
    }

    #[tokio::test]
    async fn prefix_is_applied_to_resolved_name() {
        let store = Arc::new(InMemoryObjectStore::new("b"));
        store.put("public/a.txt", Bytes::from_static(b"pub")).await.unwrap();
        let config = ServerConfig {
            prefix: "/public".into(),
            ..ServerConfig::default()
        };
        let h = harness(store, config).await;
        let response = h.get("/a.txt").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "pub");
        assert_eq!(h.audit().await["object"], "public/a.txt");
    }

    #[tokio::test]
    async fn store_fault_is_generic_500() {
        let h = harness(Arc::new(Faulty), ServerConfig::default()).await;
        let response = h.get("/foo.txt").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let text = body(response).await;
        assert_eq!(text, "500 Internal Server Error\n");

        let event = h.audit().await;
        assert_eq!(event["event_type"], "internal_error");
        assert_eq!(event["object"], "foo.txt");
        assert!(event["error"].as_str().unwrap().contains("disk on fire"));
    }

    #[tokio::test]
    async fn custom_denylist_replaces_default() {
        let store = Arc::new(InMemoryObjectStore::new("b"));
        store.put("a", Bytes::from_static(b"a")).await.unwrap();
        let config = ServerConfig {
            forbidden_countries: gatelog_types::CountryDenylist::new(["Atlantis"]),
            ..ServerConfig::default()
        };
        let h = harness(store, config).await;
        let request = |country: &str| {
            Request::builder()
                .uri("/a")
                .header("X-country", country)
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(h.send(request("Atlantis")).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.send(request("Iran")).await.status(), StatusCode::OK);
    }
}
