use async_trait::async_trait;
use bytes::Bytes;
use gatelog_types::Generation;
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectStore, Precondition, StoredObject, WriteOutcome};

const GENERATION_HEADER: &str = "x-goog-generation";

/// Connection settings for [`GcsObjectStore`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsConfig {
    pub bucket: String,
    /// Base URL of the JSON API. Point this at an emulator for local runs.
    pub endpoint: String,
    /// OAuth access token sent as a bearer credential. Emulators accept none.
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: "https://storage.googleapis.com".into(),
            token: None,
        }
    }
}

#[derive(Deserialize)]
struct ObjectResource {
    generation: String,
}

/// Object store backed by the Google Cloud Storage JSON API.
///
/// Conditional writes use `ifGenerationMatch`, with `0` standing for
/// "the object must not exist". GCS answers a failed precondition with
/// HTTP 412, which maps to [`WriteOutcome::Conflict`].
pub struct GcsObjectStore {
    config: GcsConfig,
    client: reqwest::Client,
}

impl GcsObjectStore {
    pub fn new(config: GcsConfig) -> StoreResult<Self> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Like [`new`](Self::new), sending requests through `client`.
    pub fn with_client(config: GcsConfig, client: reqwest::Client) -> StoreResult<Self> {
        if config.bucket.is_empty() {
            return Err(StoreError::Config("GCS bucket name is empty".into()));
        }
        Url::parse(&config.endpoint)
            .map_err(|e| StoreError::Config(format!("bad endpoint {}: {e}", config.endpoint)))?;
        Ok(Self { config, client })
    }

    fn base(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = Url::parse(&self.config.endpoint)
            .map_err(|e| StoreError::Config(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("endpoint cannot be a base: {}", self.config.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{name}` with `name` fully escaped.
    pub(crate) fn object_url(&self, name: &str) -> StoreResult<Url> {
        self.base(&["storage", "v1", "b", &self.config.bucket, "o", name])
    }

    /// Simple-upload URL, optionally carrying a generation precondition.
    pub(crate) fn upload_url(&self, name: &str, precondition: Option<Precondition>) -> StoreResult<Url> {
        let mut url = self.base(&["upload", "storage", "v1", "b", &self.config.bucket, "o"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("uploadType", "media");
            query.append_pair("name", name);
            if let Some(p) = precondition {
                query.append_pair("ifGenerationMatch", &p.if_generation_match().to_string());
            }
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn unexpected(name: &str, response: Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        StoreError::Http {
            status,
            name: name.to_string(),
            message,
        }
    }

    async fn upload(
        &self,
        name: &str,
        data: Bytes,
        precondition: Option<Precondition>,
    ) -> StoreResult<Option<Generation>> {
        let url = self.upload_url(name, precondition)?;
        let response = self
            .authorize(self.client.post(url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await?;

        match response.status() {
            StatusCode::PRECONDITION_FAILED => Ok(None),
            s if s.is_success() => {
                let resource: ObjectResource = response.json().await?;
                let generation = parse_generation(name, &resource.generation)?;
                Ok(Some(generation))
            }
            _ => Err(Self::unexpected(name, response).await),
        }
    }
}

fn parse_generation(name: &str, raw: &str) -> StoreResult<Generation> {
    raw.parse::<Generation>().map_err(|e| StoreError::Corrupt {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn read(&self, name: &str) -> StoreResult<Option<StoredObject>> {
        let mut url = self.object_url(name)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self.authorize(self.client.get(url)).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let raw = response
                    .headers()
                    .get(GENERATION_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| StoreError::Corrupt {
                        name: name.to_string(),
                        reason: format!("missing {GENERATION_HEADER} header"),
                    })?
                    .to_string();
                let generation = parse_generation(name, &raw)?;
                let data = response.bytes().await?;
                Ok(Some(StoredObject { data, generation }))
            }
            _ => Err(Self::unexpected(name, response).await),
        }
    }

    async fn exists(&self, name: &str) -> StoreResult<bool> {
        let url = self.object_url(name)?;
        let response = self.authorize(self.client.get(url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            s if s.is_success() => Ok(true),
            _ => Err(Self::unexpected(name, response).await),
        }
    }

    async fn write_if(
        &self,
        name: &str,
        data: Bytes,
        precondition: Precondition,
    ) -> StoreResult<WriteOutcome> {
        match self.upload(name, data, Some(precondition)).await? {
            Some(generation) => Ok(WriteOutcome::Committed(generation)),
            None => {
                debug!(bucket = %self.config.bucket, name, ?precondition, "precondition failed");
                Ok(WriteOutcome::Conflict)
            }
        }
    }

    async fn put(&self, name: &str, data: Bytes) -> StoreResult<Generation> {
        self.upload(name, data, None).await?.ok_or_else(|| StoreError::Http {
            status: StatusCode::PRECONDITION_FAILED.as_u16(),
            name: name.to_string(),
            message: "unconditional upload reported a failed precondition".into(),
        })
    }
}

impl std::fmt::Debug for GcsObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsObjectStore")
            .field("bucket", &self.config.bucket)
            .field("endpoint", &self.config.endpoint)
            .finish()
    }
}
