//! Alert Analyzer - enriches monitoring alerts with node metrics history
//! and publishes an AI diagnosis to the notification bus.

use alert_analyzer::{api, config::AnalyzerConfig};
use analyzer_lib::{
    engine::OpenAiCompatibleEngine,
    health::{components, HealthRegistry},
    history::HistoryAccumulator,
    notify::{KafkaRestBus, LoggingBus, NotificationBus},
    observability::{AnalyzerMetrics, StructuredLogger},
    pipeline::AnalysisPipeline,
    prometheus::PrometheusClient,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_NAME: &str = "alert-analyzer";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting alert-analyzer");

    let config = AnalyzerConfig::load()?;
    info!(
        prometheus = %config.prometheus.url,
        llm = %config.llm.base_url,
        model = %config.llm.model,
        history_hours = config.history_hours,
        "Analyzer configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ANALYSIS_ENGINE).await;
    health_registry.register(components::NOTIFICATION_BUS).await;

    // Register metrics up front so /metrics is complete before the first alert
    AnalyzerMetrics::new();
    let logger = StructuredLogger::new(SERVICE_NAME);

    let gateway = PrometheusClient::new(&config.prometheus.url, config.prometheus_timeout())
        .context("invalid prometheus.url")?;
    let accumulator = HistoryAccumulator::new(Arc::new(gateway))
        .with_templates(config.prometheus.templates.clone())
        .with_workload_label(config.prometheus.workload_label.clone());

    if config.llm.api_key.is_empty() {
        warn!("llm.api_key is empty, requests will be sent without authorization");
    }
    let engine = OpenAiCompatibleEngine::new(
        &config.llm.base_url,
        config.llm.api_key.clone(),
        config.llm.model.clone(),
        config.llm_timeout(),
    )
    .context("failed to build analysis engine client")?
    .with_system_prompt(config.llm.system_prompt.clone())
    .with_max_tokens(config.llm.max_tokens)
    .with_temperature(config.llm.temperature);

    let bus: Arc<dyn NotificationBus> = match &config.notification.bus_url {
        Some(url) => Arc::new(
            KafkaRestBus::new(url, &config.notification.topic, config.publish_timeout())
                .context("invalid notification.bus_url")?,
        ),
        None => {
            warn!("notification.bus_url not set, notifications will only be logged");
            Arc::new(LoggingBus::new(config.notification.topic.clone()))
        }
    };

    let pipeline = AnalysisPipeline::new(accumulator, Arc::new(engine), bus)
        .with_settings(config.pipeline_settings())
        .with_health_registry(health_registry.clone())
        .with_logger(logger.clone());

    let app_state = Arc::new(api::AppState::new(pipeline, health_registry.clone()));

    health_registry.set_ready(true).await;
    logger.log_startup(SERVICE_VERSION, config.api_port);

    let shutdown_logger = logger.clone();
    api::serve(config.api_port, app_state, async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        shutdown_logger.log_shutdown("SIGINT received");
    })
    .await?;

    info!("Shutting down");
    Ok(())
}
