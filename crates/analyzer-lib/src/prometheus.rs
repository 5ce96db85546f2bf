//! Prometheus HTTP API client
//!
//! Every failure is absorbed here: a point query that cannot be answered
//! yields `0.0` and a vector query yields no samples. Callers never see an
//! error from the metrics backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::models::Labels;
use crate::observability::AnalyzerMetrics;

/// Default per-call timeout for backend queries
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

const QUERY_PATH: &str = "api/v1/query";

/// One series of an instant-vector result
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub value: f64,
}

/// Read-only access to the metrics backend
#[async_trait]
pub trait MetricsGateway: Send + Sync {
    /// Evaluate `expression` at `timestamp` and return the first sample's value, or 0.0
    async fn query_scalar_at(&self, expression: &str, timestamp: DateTime<Utc>) -> f64;

    /// Evaluate `expression` now and return every series, or nothing on failure
    async fn query_vector(&self, expression: &str) -> Vec<Sample>;
}

/// Reasons a backend query produced no usable data
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("backend reported status '{status}': {error}")]
    Backend { status: String, error: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unsupported result type '{0}'")]
    UnsupportedResultType(String),

    #[error("sample value '{0}' is not a finite number")]
    InvalidValue(String),

    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    #[serde(default)]
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: Labels,
    value: (serde_json::Value, String),
}

/// [`MetricsGateway`] backed by the Prometheus `/api/v1/query` endpoint
#[derive(Clone)]
pub struct PrometheusClient {
    client: Client,
    query_url: Url,
    metrics: AnalyzerMetrics,
}

impl PrometheusClient {
    /// Create a client for the Prometheus server at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(timeout).build()?;

        // Url::join drops the last path segment unless it ends with a slash
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let query_url = base.join(QUERY_PATH)?;

        Ok(Self {
            client,
            query_url,
            metrics: AnalyzerMetrics::new(),
        })
    }

    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    async fn execute(
        &self,
        expression: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Vec<Sample>, GatewayError> {
        let mut request = self.client.get(self.query_url.clone());
        request = match timestamp {
            Some(ts) => request.query(&[
                ("query", expression.to_string()),
                ("time", ts.timestamp().to_string()),
            ]),
            None => request.query(&[("query", expression)]),
        };

        debug!(query = %expression, time = ?timestamp.map(|t| t.timestamp()), "Executing query");

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        // Prometheus answers 400/422 with a JSON error body; prefer its message
        let parsed: Result<QueryResponse, _> = serde_json::from_str(&body);
        if !status.is_success() {
            return Err(match parsed {
                Ok(resp) => backend_error(resp),
                Err(_) => GatewayError::Status {
                    status: status.as_u16(),
                    body,
                },
            });
        }

        let response = parsed?;
        if response.status != "success" {
            return Err(backend_error(response));
        }

        match response.data {
            Some(data) => parse_result(data),
            None => Ok(Vec::new()),
        }
    }

    fn record_failure(&self, expression: &str, error: &GatewayError) {
        self.metrics.inc_metrics_query_failures();
        warn!(query = %expression, error = %error, "Metrics query failed, treating as no data");
    }
}

#[async_trait]
impl MetricsGateway for PrometheusClient {
    async fn query_scalar_at(&self, expression: &str, timestamp: DateTime<Utc>) -> f64 {
        match self.execute(expression, Some(timestamp)).await {
            Ok(samples) => match samples.first() {
                Some(sample) if sample.value.is_finite() => sample.value,
                Some(sample) => {
                    self.record_failure(
                        expression,
                        &GatewayError::InvalidValue(sample.value.to_string()),
                    );
                    0.0
                }
                None => {
                    warn!(query = %expression, time = timestamp.timestamp(), "Metrics query returned no data");
                    0.0
                }
            },
            Err(e) => {
                self.record_failure(expression, &e);
                0.0
            }
        }
    }

    async fn query_vector(&self, expression: &str) -> Vec<Sample> {
        match self.execute(expression, None).await {
            Ok(samples) => {
                let samples: Vec<Sample> = samples
                    .into_iter()
                    .filter(|s| {
                        let finite = s.value.is_finite();
                        if !finite {
                            debug!(labels = ?s.labels, value = s.value, "Skipping non-finite series");
                        }
                        finite
                    })
                    .collect();
                debug!(query = %expression, series = samples.len(), "Vector query completed");
                samples
            }
            Err(e) => {
                self.record_failure(expression, &e);
                Vec::new()
            }
        }
    }
}

fn backend_error(response: QueryResponse) -> GatewayError {
    let error = match (response.error_type, response.error) {
        (Some(kind), Some(message)) => format!("{}: {}", kind, message),
        (None, Some(message)) => message,
        (Some(kind), None) => kind,
        (None, None) => "no error detail".to_string(),
    };
    GatewayError::Backend {
        status: response.status,
        error,
    }
}

fn parse_result(data: QueryData) -> Result<Vec<Sample>, GatewayError> {
    match data.result_type.as_str() {
        "vector" => {
            if data.result.is_null() {
                return Ok(Vec::new());
            }
            let raw: Vec<VectorSample> = serde_json::from_value(data.result)?;
            // Series order is kept as returned; a point query only reads the first
            raw.into_iter()
                .map(|s| {
                    Ok(Sample {
                        value: parse_value(&s.value.1)?,
                        labels: s.metric,
                    })
                })
                .collect()
        }
        "scalar" => {
            let (_, value): (serde_json::Value, String) = serde_json::from_value(data.result)?;
            Ok(vec![Sample {
                labels: Labels::new(),
                value: parse_value(&value)?,
            }])
        }
        other => Err(GatewayError::UnsupportedResultType(other.to_string())),
    }
}

/// Parse a sample value. NaN and infinities are valid samples and are kept;
/// callers decide how to treat them.
fn parse_value(raw: &str) -> Result<f64, GatewayError> {
    raw.parse::<f64>()
        .map_err(|_| GatewayError::InvalidValue(raw.to_string()))
}
