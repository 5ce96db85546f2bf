//! HTTP API: alert webhook, manual analysis, health checks and Prometheus metrics

use analyzer_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability,
    pipeline::{AnalysisPipeline, PipelineError, PipelineOutcome},
    webhook::AlertWebhook,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

/// Liveness text returned by the monitoring health endpoint
pub const HEALTH_MESSAGE: &str = "Monitoring server is running";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: AnalysisPipeline,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(pipeline: AnalysisPipeline, health_registry: HealthRegistry) -> Self {
        Self {
            pipeline,
            health_registry,
        }
    }
}

/// Body returned by the alert and analyze endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
}

impl From<PipelineOutcome> for AnalysisResponse {
    fn from(outcome: PipelineOutcome) -> Self {
        let status = outcome.status().to_string();
        match outcome {
            PipelineOutcome::NoAlerts => Self {
                status,
                message: "No alerts to process".to_string(),
                node: None,
                alert_name: None,
                analysis: None,
            },
            PipelineOutcome::NoMetricsData { node } => Self {
                status,
                message: format!("No metrics data available for node {}", node),
                node: Some(node),
                alert_name: None,
                analysis: None,
            },
            PipelineOutcome::Published {
                node,
                alert_name,
                analysis,
            } => Self {
                status,
                message: "Analysis completed and notification published".to_string(),
                node: Some(node),
                alert_name: Some(alert_name),
                analysis: Some(analysis),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Errors surfaced to HTTP callers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("missing nodeName query parameter")]
    MissingNode,

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("failed to encode metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingNode => StatusCode::BAD_REQUEST,
            ApiError::InvalidPayload(_) | ApiError::Pipeline(_) | ApiError::Metrics(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        error!(status = %status, error = %self, "Request failed");

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    #[serde(rename = "nodeName", alias = "node_name")]
    pub node_name: Option<String>,
}

/// Webhook receiver. The body is parsed here so a malformed payload is
/// reported as a server error with the parse detail.
async fn receive_alert(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let payload = AlertWebhook::from_json(&body)?;
    info!(
        status = ?payload.status,
        alerts = payload.alerts().len(),
        "Received alert webhook"
    );

    let outcome = state.pipeline.handle_webhook(&payload).await?;
    Ok(Json(outcome.into()))
}

async fn analyze_node(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AnalyzeParams>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let node = params
        .node_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or(ApiError::MissingNode)?;

    let outcome = state.pipeline.analyze_node(&node).await?;
    Ok(Json(outcome.into()))
}

async fn monitoring_health() -> &'static str {
    HEALTH_MESSAGE
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let buffer = observability::encode_text()?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/monitoring/alert", post(receive_alert))
        .route("/v1/monitoring/analyze", post(analyze_node))
        .route("/v1/monitoring/health", get(monitoring_health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
