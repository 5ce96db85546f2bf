//! Observability infrastructure for the alert analyzer
//!
//! Provides:
//! - Prometheus metrics (alert throughput, pipeline and analysis latency, failure counters)
//! - Structured JSON logging of pipeline events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Encoder, Histogram,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for pipeline stages (in seconds). Analysis calls can take tens of seconds.
const LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0,
];

static GLOBAL_METRICS: OnceLock<AnalyzerMetricsInner> = OnceLock::new();

struct AnalyzerMetricsInner {
    alerts_received: IntCounter,
    alerts_processed: IntCounterVec,
    analysis_failures: IntCounter,
    metrics_query_failures: IntCounter,
    publish_failures: IntCounter,
    pipeline_latency_seconds: Histogram,
    analysis_latency_seconds: Histogram,
}

impl AnalyzerMetricsInner {
    fn new() -> Self {
        Self {
            alerts_received: register_int_counter!(
                "alert_analyzer_alerts_received_total",
                "Total number of alert webhooks received"
            )
            .expect("Failed to register alerts_received"),

            alerts_processed: register_int_counter_vec!(
                "alert_analyzer_alerts_processed_total",
                "Pipeline runs by terminal outcome",
                &["outcome"]
            )
            .expect("Failed to register alerts_processed"),

            analysis_failures: register_int_counter!(
                "alert_analyzer_analysis_failures_total",
                "Analysis engine calls that failed or timed out"
            )
            .expect("Failed to register analysis_failures"),

            metrics_query_failures: register_int_counter!(
                "alert_analyzer_metrics_query_failures_total",
                "Metrics backend queries that were answered with zero or no data"
            )
            .expect("Failed to register metrics_query_failures"),

            publish_failures: register_int_counter!(
                "alert_analyzer_publish_failures_total",
                "Notifications the bus did not accept"
            )
            .expect("Failed to register publish_failures"),

            pipeline_latency_seconds: register_histogram!(
                "alert_analyzer_pipeline_latency_seconds",
                "Time from alert receipt to publish",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register pipeline_latency_seconds"),

            analysis_latency_seconds: register_histogram!(
                "alert_analyzer_analysis_latency_seconds",
                "Time spent waiting for the analysis engine",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register analysis_latency_seconds"),
        }
    }
}

/// Handle to the process-wide analyzer metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct AnalyzerMetrics {
    _private: (),
}

impl Default for AnalyzerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerMetrics {
    /// Create a handle, registering the metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AnalyzerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AnalyzerMetricsInner {
        GLOBAL_METRICS.get_or_init(AnalyzerMetricsInner::new)
    }

    pub fn inc_alerts_received(&self) {
        self.inner().alerts_received.inc();
    }

    /// Count a finished pipeline run. `outcome` is one of the response statuses.
    pub fn inc_alerts_processed(&self, outcome: &str) {
        self.inner()
            .alerts_processed
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn inc_analysis_failures(&self) {
        self.inner().analysis_failures.inc();
    }

    pub fn inc_metrics_query_failures(&self) {
        self.inner().metrics_query_failures.inc();
    }

    pub fn inc_publish_failures(&self) {
        self.inner().publish_failures.inc();
    }

    pub fn observe_pipeline_latency(&self, duration_secs: f64) {
        self.inner().pipeline_latency_seconds.observe(duration_secs);
    }

    pub fn observe_analysis_latency(&self, duration_secs: f64) {
        self.inner().analysis_latency_seconds.observe(duration_secs);
    }

    /// Current value of `alert_analyzer_alerts_processed_total{outcome}`
    pub fn alerts_processed(&self, outcome: &str) -> u64 {
        self.inner()
            .alerts_processed
            .with_label_values(&[outcome])
            .get()
    }

    pub fn analysis_failures(&self) -> u64 {
        self.inner().analysis_failures.get()
    }

    pub fn metrics_query_failures(&self) -> u64 {
        self.inner().metrics_query_failures.get()
    }
}

/// Encode the default registry in the Prometheus text format
pub fn encode_text() -> Result<Vec<u8>, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

/// Structured logger for pipeline events
///
/// Every event carries an `event` field and the service name so log
/// pipelines can filter on them.
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            port = port,
            "Alert analyzer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Alert analyzer shutting down"
        );
    }

    pub fn log_alert_received(&self, node: &str, alert_name: &str, severity: &str, alert_count: usize) {
        info!(
            event = "alert_received",
            service = %self.service,
            node = %node,
            alert_name = %alert_name,
            severity = %severity,
            alert_count = alert_count,
            "Alert received"
        );
    }

    pub fn log_analysis_completed(&self, node: &str, alert_name: &str, duration_ms: u64, chars: usize) {
        info!(
            event = "analysis_completed",
            service = %self.service,
            node = %node,
            alert_name = %alert_name,
            duration_ms = duration_ms,
            analysis_chars = chars,
            "Analysis completed"
        );
    }

    pub fn log_analysis_failed(&self, node: &str, alert_name: &str, error: &str) {
        warn!(
            event = "analysis_failed",
            service = %self.service,
            node = %node,
            alert_name = %alert_name,
            error = %error,
            "Analysis failed, publishing failure notice"
        );
    }

    pub fn log_notification_published(&self, node: &str, topic: &str, recipients: usize) {
        info!(
            event = "notification_published",
            service = %self.service,
            node = %node,
            topic = %topic,
            recipients = recipients,
            "Notification published"
        );
    }
}
