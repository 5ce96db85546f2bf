//! Grafana / Alertmanager webhook payload
//!
//! Only the fields the pipeline reads are modelled. Every field is optional
//! and unknown fields are ignored, so administrative payloads still parse.

use serde::{Deserialize, Serialize};

use crate::models::Labels;

/// Webhook body posted by the alerting frontend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertWebhook {
    pub status: Option<String>,
    pub receiver: Option<String>,
    pub alerts: Option<Vec<WebhookAlert>>,
    pub group_labels: Option<Labels>,
    pub common_labels: Option<Labels>,
    pub common_annotations: Option<Labels>,
    #[serde(rename = "externalURL")]
    pub external_url: Option<String>,
}

/// One alert inside a webhook body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebhookAlert {
    pub status: Option<String>,
    pub labels: Option<Labels>,
    pub annotations: Option<Labels>,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    #[serde(rename = "generatorURL")]
    pub generator_url: Option<String>,
    pub fingerprint: Option<String>,
}

impl AlertWebhook {
    /// Parse a raw webhook body
    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }

    /// Alerts carried by the payload; absent and empty lists look the same
    pub fn alerts(&self) -> &[WebhookAlert] {
        self.alerts.as_deref().unwrap_or_default()
    }

    /// The alert the pipeline analyses
    pub fn primary_alert(&self) -> Option<&WebhookAlert> {
        self.alerts().first()
    }
}
