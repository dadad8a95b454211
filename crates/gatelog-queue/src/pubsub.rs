use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::{RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};
use crate::traits::{Attributes, Delivery, Publisher, Subscription};

/// Connection settings for the Pub/Sub REST backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PubSubConfig {
    pub project: String,
    pub subscription: String,
    /// Topic the audit relay publishes to. Not needed for consuming.
    #[serde(default)]
    pub topic: Option<String>,
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            subscription: String::new(),
            topic: None,
            endpoint: "https://pubsub.googleapis.com".into(),
            token: None,
        }
    }
}

impl PubSubConfig {
    /// `projects/{project}/subscriptions/{subscription}`
    pub fn subscription_path(&self) -> String {
        format!("projects/{}/subscriptions/{}", self.project, self.subscription)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: WireMessage,
    #[serde(default)]
    delivery_attempt: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage {
    #[serde(default)]
    data: String,
    message_id: String,
    #[serde(default)]
    attributes: Attributes,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishResponse {
    message_ids: Vec<String>,
}

/// Shared HTTP plumbing for the subscription and publisher halves.
#[derive(Clone)]
struct RestClient {
    endpoint: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl RestClient {
    fn new(endpoint: &str, token: Option<String>, http: reqwest::Client) -> QueueResult<Self> {
        Url::parse(endpoint).map_err(|e| QueueError::Config(format!("bad endpoint {endpoint}: {e}")))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            token,
            http,
        })
    }

    /// `{endpoint}/v1/projects/{project}/{kind}/{name}:{action}`
    fn url(&self, project: &str, kind: &str, name: &str, action: &str) -> QueueResult<Url> {
        let mut url = Url::parse(&self.endpoint).map_err(|e| QueueError::Config(e.to_string()))?;
        let target = format!("{name}:{action}");
        url.path_segments_mut()
            .map_err(|_| QueueError::Config(format!("endpoint cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(["v1", "projects", project, kind, target.as_str()]);
        Ok(url)
    }

    fn post(&self, url: Url, body: serde_json::Value) -> RequestBuilder {
        let request = self.http.post(url).json(&body);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(operation: &str, response: Response) -> QueueResult<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(QueueError::Http {
            status,
            operation: operation.to_string(),
            message,
        })
    }
}

/// Decode a Pub/Sub `data` field. Bytes that are not valid base64 are passed
/// through verbatim so the message is still delivered and can be logged.
fn decode_data(message_id: &str, data: &str) -> Bytes {
    match BASE64.decode(data) {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            warn!(message_id, error = %e, "message data is not base64, delivering raw");
            Bytes::copy_from_slice(data.as_bytes())
        }
    }
}

/// Pull subscription over the Pub/Sub REST API.
///
/// Negative acknowledgement sets the ack deadline to zero, which makes the
/// message immediately eligible for redelivery.
pub struct PubSubSubscription {
    config: PubSubConfig,
    client: RestClient,
}

impl PubSubSubscription {
    pub fn new(config: PubSubConfig) -> QueueResult<Self> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Like [`new`](Self::new), sending requests through `http`.
    pub fn with_client(config: PubSubConfig, http: reqwest::Client) -> QueueResult<Self> {
        if config.project.is_empty() || config.subscription.is_empty() {
            return Err(QueueError::Config(
                "Pub/Sub project and subscription must be set".into(),
            ));
        }
        let client = RestClient::new(&config.endpoint, config.token.clone(), http)?;
        Ok(Self { config, client })
    }

    fn action_url(&self, action: &str) -> QueueResult<Url> {
        self.client.url(
            &self.config.project,
            "subscriptions",
            &self.config.subscription,
            action,
        )
    }
}

#[async_trait]
impl Subscription for PubSubSubscription {
    async fn pull(&self, max_messages: usize) -> QueueResult<Vec<Delivery>> {
        let url = self.action_url("pull")?;
        let response = self
            .client
            .post(url, json!({ "maxMessages": max_messages }))
            .send()
            .await?;
        let response = RestClient::check("pull", response).await?;
        let body: PullResponse = response.json().await?;

        let deliveries: Vec<Delivery> = body
            .received_messages
            .into_iter()
            .map(|received| Delivery {
                data: decode_data(&received.message.message_id, &received.message.data),
                message_id: received.message.message_id,
                ack_id: received.ack_id,
                attributes: received.message.attributes,
                delivery_attempt: received.delivery_attempt.unwrap_or(1),
            })
            .collect();
        debug!(
            subscription = %self.config.subscription_path(),
            count = deliveries.len(),
            "pulled messages"
        );
        Ok(deliveries)
    }

    async fn ack(&self, ack_id: &str) -> QueueResult<()> {
        let url = self.action_url("acknowledge")?;
        let response = self
            .client
            .post(url, json!({ "ackIds": [ack_id] }))
            .send()
            .await?;
        RestClient::check("acknowledge", response).await?;
        Ok(())
    }

    async fn nack(&self, ack_id: &str) -> QueueResult<()> {
        let url = self.action_url("modifyAckDeadline")?;
        let response = self
            .client
            .post(url, json!({ "ackIds": [ack_id], "ackDeadlineSeconds": 0 }))
            .send()
            .await?;
        RestClient::check("modifyAckDeadline", response).await?;
        Ok(())
    }
}

/// Topic publisher over the Pub/Sub REST API.
pub struct PubSubPublisher {
    project: String,
    topic: String,
    client: RestClient,
}

impl PubSubPublisher {
    pub fn new(config: &PubSubConfig) -> QueueResult<Self> {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Like [`new`](Self::new), sending requests through `http`.
    pub fn with_client(config: &PubSubConfig, http: reqwest::Client) -> QueueResult<Self> {
        let topic = config
            .topic
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| QueueError::Config("Pub/Sub topic must be set to publish".into()))?;
        if config.project.is_empty() {
            return Err(QueueError::Config("Pub/Sub project must be set".into()));
        }
        Ok(Self {
            project: config.project.clone(),
            topic,
            client: RestClient::new(&config.endpoint, config.token.clone(), http)?,
        })
    }
}

#[async_trait]
impl Publisher for PubSubPublisher {
    async fn publish(&self, data: Bytes, attributes: Attributes) -> QueueResult<String> {
        let url = self.client.url(&self.project, "topics", &self.topic, "publish")?;
        let body = json!({
            "messages": [{ "data": BASE64.encode(&data), "attributes": attributes }]
        });
        let response = self.client.post(url, body).send().await?;
        let response = RestClient::check("publish", response).await?;
        let PublishResponse { message_ids } = response.json().await?;
        message_ids.into_iter().next().ok_or_else(|| QueueError::Http {
            status: 200,
            operation: "publish".into(),
            message: "response carried no message id".into(),
        })
    }
}
