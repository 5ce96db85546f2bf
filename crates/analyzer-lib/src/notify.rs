//! Notification bus publishing
//!
//! The pipeline hands a [`NotificationEvent`] to the bus and considers it
//! delivered once the bus accepts it. Downstream fan-out to chat users is
//! somebody else's job.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::models::NotificationEvent;

/// Topic consumed by the downstream notifier
pub const DEFAULT_TOPIC: &str = "monitoring.notification";

/// Default HTTP timeout for a publish
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

const KAFKA_JSON_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// Errors raised while publishing
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bus rejected record with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid bus url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// An at-least-once message channel
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// Topic events are published to
    fn topic(&self) -> &str;

    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError>;
}

#[derive(Serialize)]
struct RecordBatch<'a> {
    records: [Record<'a>; 1],
}

#[derive(Serialize)]
struct Record<'a> {
    value: &'a NotificationEvent,
}

/// [`NotificationBus`] that produces to a Kafka topic through the REST proxy
#[derive(Clone)]
pub struct KafkaRestBus {
    client: Client,
    topic_url: Url,
    topic: String,
}

impl KafkaRestBus {
    pub fn new(base_url: &str, topic: &str, timeout: Duration) -> Result<Self, PublishError> {
        let client = Client::builder().timeout(timeout).build()?;

        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let topic_url = base.join(&format!("topics/{}", topic))?;

        Ok(Self {
            client,
            topic_url,
            topic: topic.to_string(),
        })
    }

    pub fn topic_url(&self) -> &Url {
        &self.topic_url
    }
}

#[async_trait]
impl NotificationBus for KafkaRestBus {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
        let batch = RecordBatch {
            records: [Record { value: event }],
        };

        let body = serde_json::to_vec(&batch)?;

        debug!(topic = %self.topic, url = %self.topic_url, bytes = body.len(), "Publishing notification");

        let response = self
            .client
            .post(self.topic_url.clone())
            .header(reqwest::header::CONTENT_TYPE, KAFKA_JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(topic = %self.topic, status = %status, body = %body, "Bus rejected notification");
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Writes events to the log instead of a real bus. Used when no bus is configured.
#[derive(Debug, Clone)]
pub struct LoggingBus {
    topic: String,
}

impl LoggingBus {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
        }
    }
}

impl Default for LoggingBus {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC)
    }
}

#[async_trait]
impl NotificationBus for LoggingBus {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
        info!(
            topic = %self.topic,
            recipients = ?event.slack_user_ids,
            message = %event.message,
            "Notification (no bus configured)"
        );
        Ok(())
    }
}
