//! API client for communicating with the Alert Analyzer service

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Analysis can take as long as the engine timeout plus metrics collection
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// API client for the Alert Analyzer
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("Invalid path")
    }

    /// Make a GET request and return the body as text
    pub async fn get_text(&self, path: &str) -> Result<String> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .context("Failed to send request")?;

        let response = check_status(response).await?;
        response.text().await.context("Failed to read response")
    }

    /// Make a GET request with a JSON response.
    ///
    /// Health endpoints answer 503 with a JSON body, so any status is accepted here.
    pub async fn get_json_any_status<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.url(path)?)
            .send()
            .await
            .context("Failed to send request")?;

        response.json().await.context("Failed to parse response")
    }

    /// POST a raw JSON document
    pub async fn post_raw<T: DeserializeOwned>(&self, path: &str, body: String) -> Result<T> {
        let response = self
            .client
            .post(self.url(path)?)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to send request")?;

        let response = check_status(response).await?;
        response.json().await.context("Failed to parse response")
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let response = self
            .client
            .post(self.url(path)?)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        let response = check_status(response).await?;
        response.json().await.context("Failed to parse response")
    }

    /// POST with query parameters and no body
    pub async fn post_query<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T> {
        let mut url = self.url(path)?;
        url.query_pairs_mut().extend_pairs(params);

        let response = self
            .client
            .post(url)
            .send()
            .await
            .context("Failed to send request")?;

        let response = check_status(response).await?;
        response.json().await.context("Failed to parse response")
    }
}

/// Turn a non-success response into an error carrying the server's message
async fn check_status(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or(body);
    anyhow::bail!("API error ({}): {}", status, detail);
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub status: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Minimal single-alert webhook payload, shaped like a Grafana notification
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAlertPayload {
    pub receiver: String,
    pub status: String,
    pub alerts: Vec<TestAlert>,
    pub common_labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestAlert {
    pub status: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
}

impl TestAlertPayload {
    pub fn new(node: &str, alert_name: &str, severity: &str, summary: Option<&str>) -> Self {
        let mut labels = HashMap::new();
        labels.insert("severity".to_string(), severity.to_string());

        let mut annotations = HashMap::new();
        annotations.insert("node".to_string(), node.to_string());
        if let Some(summary) = summary {
            annotations.insert("summary".to_string(), summary.to_string());
        }

        let mut common_labels = HashMap::new();
        common_labels.insert("alertname".to_string(), alert_name.to_string());

        Self {
            receiver: "alertctl".to_string(),
            status: "firing".to_string(),
            alerts: vec![TestAlert {
                status: "firing".to_string(),
                labels,
                annotations,
            }],
            common_labels,
        }
    }
}
