use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use gatelog_audit::ConsumerConfig;
use gatelog_queue::PubSubConfig;
use gatelog_server::ServerConfig;
use gatelog_store::GcsConfig;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Fs,
    Gcs,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueBackend {
    #[default]
    Memory,
    Pubsub,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Directory for the `fs` backend.
    pub root: PathBuf,
    /// Bucket name plus the GCS connection; the bucket also labels the
    /// local backends.
    #[serde(flatten)]
    pub gcs: GcsConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            root: PathBuf::from("gatelog-data"),
            gcs: GcsConfig {
                bucket: "gatelog".into(),
                ..GcsConfig::default()
            },
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub backend: QueueBackend,
    #[serde(flatten)]
    pub pubsub: PubSubConfig,
}

/// Everything the binary needs, from a TOML file and the environment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub server: ServerConfig,
    pub consumer: ConsumerConfig,
}

impl Settings {
    /// Read `path` if given, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut settings = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Self::from_toml(&text).with_context(|| format!("parsing {}", path.display()))?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from environment-style variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup("BUCKET_NAME") {
            self.store.gcs.bucket = bucket;
        }
        if let Some(prefix) = lookup("BUCKET_PREFIX") {
            self.server.prefix = prefix.trim_start_matches('/').to_string();
        }
        if let Some(backend) = lookup("STORE_BACKEND") {
            self.store.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => StoreBackend::Memory,
                "fs" => StoreBackend::Fs,
                "gcs" => StoreBackend::Gcs,
                other => bail!("STORE_BACKEND must be memory, fs, or gcs, got {other:?}"),
            };
        }
        if let Some(root) = lookup("STORE_ROOT") {
            self.store.root = PathBuf::from(root);
        }
        if let Some(backend) = lookup("QUEUE_BACKEND") {
            self.queue.backend = match backend.to_ascii_lowercase().as_str() {
                "memory" => QueueBackend::Memory,
                "pubsub" => QueueBackend::Pubsub,
                other => bail!("QUEUE_BACKEND must be memory or pubsub, got {other:?}"),
            };
        }
        if let Some(project) = lookup("PROJECT_ID") {
            self.queue.pubsub.project = project;
        }
        if let Some(subscription) = lookup("SUBSCRIPTION_ID") {
            self.queue.pubsub.subscription = subscription;
        }
        if let Some(topic) = lookup("TOPIC_ID") {
            self.queue.pubsub.topic = Some(topic).filter(|t| !t.is_empty());
        }
        if let Some(token) = lookup("GOOGLE_OAUTH_ACCESS_TOKEN") {
            self.store.gcs.token = Some(token.clone());
            self.queue.pubsub.token = Some(token);
        }
        if let Some(object) = lookup("LOG_OBJECT") {
            self.consumer.log_object = object;
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            self.server.bind_addr = addr
                .parse()
                .with_context(|| format!("BIND_ADDR is not a socket address: {addr}"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.gcs.bucket.trim().is_empty() {
            bail!("a bucket name is required (BUCKET_NAME)");
        }
        if self.queue.backend == QueueBackend::Pubsub {
            let pubsub = &self.queue.pubsub;
            if pubsub.project.is_empty() {
                bail!("the pubsub queue needs a project (PROJECT_ID)");
            }
            if pubsub.subscription.is_empty() {
                bail!("the pubsub queue needs a subscription (SUBSCRIPTION_ID)");
            }
            if pubsub.token.is_none() {
                bail!("the pubsub queue needs a token (GOOGLE_OAUTH_ACCESS_TOKEN)");
            }
        }
        self.server.validate()?;
        self.consumer.validate()?;
        Ok(())
    }
}
