//! Per-alert analysis pipeline
//!
//! ```text
//! Received -> IdentityResolved -> HistoryFetched -> ContextBuilt -> Analyzed -> Published
//!    |                                  |
//!    +-> NoAlerts                       +-> NoMetricsData
//! ```
//!
//! Metrics backend failures are absorbed by the gateway and analysis engine
//! failures are replaced by a failure notice. Only a failed publish is
//! reported to the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use crate::context;
use crate::engine::{AnalysisEngine, AnalysisError, DEFAULT_ANALYSIS_TIMEOUT};
use crate::health::{components, HealthRegistry};
use crate::history::HistoryAccumulator;
use crate::identity;
use crate::models::{AlertContext, AnalysisRequest, NotificationEvent};
use crate::notify::{NotificationBus, PublishError};
use crate::observability::{AnalyzerMetrics, StructuredLogger};
use crate::webhook::AlertWebhook;

/// Prepended to the error detail when the engine produced no analysis
pub const ANALYSIS_FAILURE_PREFIX: &str = "AI analysis failed: ";

/// Hours of history collected per alert unless configured otherwise
pub const DEFAULT_HISTORY_HOURS: usize = 6;

/// Terminal state of a successful run
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    /// The payload carried no alerts
    NoAlerts,
    /// The node has no metrics history
    NoMetricsData { node: String },
    /// Analysis was published to the bus
    Published {
        node: String,
        alert_name: String,
        analysis: String,
    },
}

impl PipelineOutcome {
    /// Status string used in responses and metric labels
    pub fn status(&self) -> &'static str {
        match self {
            PipelineOutcome::NoAlerts => "no_alerts",
            PipelineOutcome::NoMetricsData { .. } => "no_data",
            PipelineOutcome::Published { .. } => "processed",
        }
    }

    pub fn node(&self) -> Option<&str> {
        match self {
            PipelineOutcome::NoAlerts => None,
            PipelineOutcome::NoMetricsData { node } | PipelineOutcome::Published { node, .. } => {
                Some(node)
            }
        }
    }
}

/// Caller-visible pipeline failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to publish notification: {0}")]
    Publish(#[from] PublishError),
}

/// Tunables for [`AnalysisPipeline`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub history_hours: usize,
    pub analysis_timeout: Duration,
    /// Chat user ids the notification is addressed to
    pub recipients: Vec<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            history_hours: DEFAULT_HISTORY_HOURS,
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
            recipients: Vec::new(),
        }
    }
}

/// Runs alerts through enrichment, analysis and publishing.
///
/// Holds only shared client handles, so one instance serves any number of
/// concurrent alerts.
#[derive(Clone)]
pub struct AnalysisPipeline {
    accumulator: HistoryAccumulator,
    engine: Arc<dyn AnalysisEngine>,
    bus: Arc<dyn NotificationBus>,
    settings: PipelineSettings,
    health: HealthRegistry,
    metrics: AnalyzerMetrics,
    logger: StructuredLogger,
}

impl AnalysisPipeline {
    pub fn new(
        accumulator: HistoryAccumulator,
        engine: Arc<dyn AnalysisEngine>,
        bus: Arc<dyn NotificationBus>,
    ) -> Self {
        Self {
            accumulator,
            engine,
            bus,
            settings: PipelineSettings::default(),
            health: HealthRegistry::new(),
            metrics: AnalyzerMetrics::new(),
            logger: StructuredLogger::new("alert-analyzer"),
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Report component status into a shared registry
    pub fn with_health_registry(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Process a webhook payload. Only the first alert is analysed.
    pub async fn handle_webhook(
        &self,
        payload: &AlertWebhook,
    ) -> Result<PipelineOutcome, PipelineError> {
        let started = Instant::now();
        self.metrics.inc_alerts_received();

        let Some(alert) = payload.primary_alert() else {
            info!(receiver = ?payload.receiver, "Webhook carried no alerts");
            self.metrics.inc_alerts_processed(PipelineOutcome::NoAlerts.status());
            return Ok(PipelineOutcome::NoAlerts);
        };

        let merged = identity::merge_labels(alert.labels.as_ref(), payload.common_labels.as_ref());
        let annotations = alert.annotations.clone().unwrap_or_default();
        let node = identity::resolve(&merged, &annotations);

        debug!(
            labels = ?alert.labels,
            common_labels = ?payload.common_labels,
            merged_labels = ?merged,
            "Alert labels"
        );

        let context = AlertContext::from_alert(merged, &annotations);
        self.logger.log_alert_received(
            &node,
            &context.alert_name,
            &context.severity,
            payload.alerts().len(),
        );

        self.run(&node, context, started).await
    }

    /// Analyse a node on operator request, without an alert
    pub async fn analyze_node(&self, node: &str) -> Result<PipelineOutcome, PipelineError> {
        let started = Instant::now();
        info!(node = %node, "Manual analysis requested");
        self.run(node, AlertContext::manual(node), started).await
    }

    async fn run(
        &self,
        node: &str,
        alert: AlertContext,
        started: Instant,
    ) -> Result<PipelineOutcome, PipelineError> {
        let history = self
            .accumulator
            .accumulate(node, self.settings.history_hours)
            .await;

        let Some(current) = history.current().cloned() else {
            info!(node = %node, "No metrics history for node, skipping analysis");
            let outcome = PipelineOutcome::NoMetricsData {
                node: node.to_string(),
            };
            self.metrics.inc_alerts_processed(outcome.status());
            return Ok(outcome);
        };

        let workloads = self.accumulator.fetch_workloads(node).await;
        let alert_name = alert.alert_name.clone();
        let request = AnalysisRequest::new(current, history.into_snapshots(), workloads, alert);
        let prompt = context::build_request(&request);

        let analysis = self.analyze(&prompt, node, &alert_name).await;

        let event = NotificationEvent::new(
            self.settings.recipients.clone(),
            format_message(node, &alert_name, &analysis),
        );

        if let Err(e) = self.bus.publish(&event).await {
            self.metrics.inc_publish_failures();
            self.metrics.inc_alerts_processed("failed");
            self.health
                .record_failure(components::NOTIFICATION_BUS, e.to_string())
                .await;
            return Err(e.into());
        }
        self.health.record_success(components::NOTIFICATION_BUS).await;
        self.logger
            .log_notification_published(node, self.bus.topic(), event.slack_user_ids.len());

        let outcome = PipelineOutcome::Published {
            node: node.to_string(),
            alert_name,
            analysis,
        };
        self.metrics.inc_alerts_processed(outcome.status());
        self.metrics
            .observe_pipeline_latency(started.elapsed().as_secs_f64());
        Ok(outcome)
    }

    /// Returns the engine's text, or the failure notice if it failed or timed out
    async fn analyze(&self, prompt: &str, node: &str, alert_name: &str) -> String {
        let started = Instant::now();
        let timeout = self.settings.analysis_timeout;

        debug!(engine = %self.engine.name(), prompt_length = prompt.len(), "Requesting analysis");

        let result = match tokio::time::timeout(timeout, self.engine.analyze(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout(timeout)),
        };
        self.metrics
            .observe_analysis_latency(started.elapsed().as_secs_f64());

        match result {
            Ok(text) => {
                self.health.record_success(components::ANALYSIS_ENGINE).await;
                self.logger.log_analysis_completed(
                    node,
                    alert_name,
                    started.elapsed().as_millis() as u64,
                    text.len(),
                );
                text
            }
            Err(e) => {
                let detail = e.to_string();
                self.metrics.inc_analysis_failures();
                self.health
                    .record_failure(components::ANALYSIS_ENGINE, detail.clone())
                    .await;
                self.logger.log_analysis_failed(node, alert_name, &detail);
                format!("{}{}", ANALYSIS_FAILURE_PREFIX, detail)
            }
        }
    }
}

/// Chat message for a finished analysis
pub fn format_message(node: &str, alert_name: &str, analysis: &str) -> String {
    format!(
        "🚨 *Node alert: {}*\n\n*Alert:* {}\n\n*Analysis:*\n{}",
        node, alert_name, analysis
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;
    use crate::notify::PublishError;
    use crate::prometheus::{MetricsGateway, Sample};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Returns a fixed value for expressions containing a marker, 0.0 otherwise
    #[derive(Default)]
    struct FakeGateway {
        scalars: Vec<(&'static str, f64)>,
        vector: Vec<Sample>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetricsGateway for FakeGateway {
        async fn query_scalar_at(&self, expression: &str, _timestamp: DateTime<Utc>) -> f64 {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.scalars
                .iter()
                .find(|(marker, _)| expression.contains(marker))
                .map(|(_, v)| *v)
                .unwrap_or(0.0)
        }

        async fn query_vector(&self, _expression: &str) -> Vec<Sample> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.vector.clone()
        }
    }

    enum EngineBehaviour {
        Reply(&'static str),
        Fail,
        Hang,
    }

    struct FakeEngine {
        behaviour: EngineBehaviour,
        prompts: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn new(behaviour: EngineBehaviour) -> Self {
            Self {
                behaviour,
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnalysisEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }

        async fn analyze(&self, prompt: &str) -> Result<String, AnalysisError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.behaviour {
                EngineBehaviour::Reply(text) => Ok(text.to_string()),
                EngineBehaviour::Fail => Err(AnalysisError::Other("model overloaded".to_string())),
                EngineBehaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("too late".to_string())
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingBus {
        events: Mutex<Vec<NotificationEvent>>,
        reject: bool,
    }

    impl RecordingBus {
        fn events(&self) -> Vec<NotificationEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationBus for RecordingBus {
        fn topic(&self) -> &str {
            "test.notification"
        }

        async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
            if self.reject {
                return Err(PublishError::Rejected {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Harness {
        gateway: Arc<FakeGateway>,
        engine: Arc<FakeEngine>,
        bus: Arc<RecordingBus>,
        health: HealthRegistry,
        pipeline: AnalysisPipeline,
    }

    fn harness(gateway: FakeGateway, engine: FakeEngine, bus: RecordingBus) -> Harness {
        let gateway = Arc::new(gateway);
        let engine = Arc::new(engine);
        let bus = Arc::new(bus);
        let health = HealthRegistry::new();
        let pipeline = AnalysisPipeline::new(
            HistoryAccumulator::new(gateway.clone()),
            engine.clone(),
            bus.clone(),
        )
        .with_settings(PipelineSettings {
            history_hours: 6,
            analysis_timeout: Duration::from_millis(200),
            recipients: vec!["U1".to_string(), "U2".to_string()],
        })
        .with_health_registry(health.clone());

        Harness {
            gateway,
            engine,
            bus,
            health,
            pipeline,
        }
    }

    fn high_cpu_payload() -> AlertWebhook {
        AlertWebhook::from_json(
            r#"{
                "status": "firing",
                "alerts": [{
                    "status": "firing",
                    "labels": {"severity": "critical"},
                    "annotations": {"node": "app-vm-01", "summary": "CPU above 90%"}
                }],
                "commonLabels": {"alertname": "HighCPU"}
            }"#,
        )
        .unwrap()
    }

    fn cpu_gateway() -> FakeGateway {
        FakeGateway {
            scalars: vec![("node_cpu_seconds_total", 95.0)],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_empty_alert_list_skips_everything() {
        let h = harness(
            FakeGateway::default(),
            FakeEngine::new(EngineBehaviour::Reply("x")),
            RecordingBus::default(),
        );

        for body in [r#"{"alerts": []}"#, r#"{"status": "firing"}"#] {
            let payload = AlertWebhook::from_json(body).unwrap();
            let outcome = h.pipeline.handle_webhook(&payload).await.unwrap();
            assert_eq!(outcome, PipelineOutcome::NoAlerts);
        }

        assert_eq!(h.gateway.calls.load(Ordering::SeqCst), 0);
        assert!(h.engine.prompts().is_empty());
        assert!(h.bus.events().is_empty());
    }

    #[tokio::test]
    async fn test_high_cpu_alert_end_to_end() {
        let h = harness(
            cpu_gateway(),
            FakeEngine::new(EngineBehaviour::Reply("[Current state] CPU saturated")),
            RecordingBus::default(),
        );

        let outcome = h.pipeline.handle_webhook(&high_cpu_payload()).await.unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::Published {
                node: "app-vm-01".to_string(),
                alert_name: "HighCPU".to_string(),
                analysis: "[Current state] CPU saturated".to_string(),
            }
        );

        let prompts = h.engine.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- Node: app-vm-01"));
        assert!(prompts[0].contains("- CPU usage: 95.00%"));
        assert!(prompts[0].contains("Severity: critical"));

        let events = h.bus.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].slack_user_ids, vec!["U1", "U2"]);
        assert_eq!(
            events[0].message,
            "🚨 *Node alert: app-vm-01*\n\n*Alert:* HighCPU\n\n*Analysis:*\n[Current state] CPU saturated"
        );
    }

    #[tokio::test]
    async fn test_engine_failure_publishes_failure_notice() {
        let h = harness(
            cpu_gateway(),
            FakeEngine::new(EngineBehaviour::Fail),
            RecordingBus::default(),
        );

        let outcome = h.pipeline.handle_webhook(&high_cpu_payload()).await.unwrap();

        let PipelineOutcome::Published { analysis, .. } = outcome else {
            panic!("expected a published outcome");
        };
        assert!(analysis.starts_with(ANALYSIS_FAILURE_PREFIX));
        assert!(analysis.contains("model overloaded"));

        let events = h.bus.events();
        assert_eq!(events.len(), 1);
        assert!(events[0].message.contains(ANALYSIS_FAILURE_PREFIX));

        let health = h.health.health().await;
        assert_eq!(
            health.components[components::ANALYSIS_ENGINE].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_engine_timeout_publishes_failure_notice() {
        let h = harness(
            cpu_gateway(),
            FakeEngine::new(EngineBehaviour::Hang),
            RecordingBus::default(),
        );

        let outcome = h.pipeline.analyze_node("app-vm-01").await.unwrap();

        let PipelineOutcome::Published { analysis, .. } = outcome else {
            panic!("expected a published outcome");
        };
        assert!(analysis.starts_with(ANALYSIS_FAILURE_PREFIX));
        assert!(analysis.contains("timed out"));
        assert_eq!(h.bus.events().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned() {
        let h = harness(
            cpu_gateway(),
            FakeEngine::new(EngineBehaviour::Reply("ok")),
            RecordingBus {
                reject: true,
                ..Default::default()
            },
        );

        let err = h.pipeline.handle_webhook(&high_cpu_payload()).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Publish(PublishError::Rejected { status: 503, .. })
        ));

        let health = h.health.health().await;
        let bus = &health.components[components::NOTIFICATION_BUS];
        assert_eq!(bus.status, ComponentStatus::Degraded);
        assert_eq!(bus.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_no_history_skips_analysis() {
        let mut h = harness(
            cpu_gateway(),
            FakeEngine::new(EngineBehaviour::Reply("x")),
            RecordingBus::default(),
        );
        h.pipeline = h.pipeline.with_settings(PipelineSettings {
            history_hours: 0,
            ..PipelineSettings::default()
        });

        let outcome = h.pipeline.handle_webhook(&high_cpu_payload()).await.unwrap();

        assert_eq!(
            outcome,
            PipelineOutcome::NoMetricsData {
                node: "app-vm-01".to_string()
            }
        );
        assert_eq!(outcome.status(), "no_data");
        assert!(h.engine.prompts().is_empty());
        assert!(h.bus.events().is_empty());
    }

    #[tokio::test]
    async fn test_manual_analysis_of_unknown_node() {
        let h = harness(
            FakeGateway::default(),
            FakeEngine::new(EngineBehaviour::Reply("nothing to see")),
            RecordingBus::default(),
        );

        let outcome = h.pipeline.analyze_node("ghost-node").await.unwrap();

        assert_eq!(outcome.status(), "processed");
        assert_eq!(outcome.node(), Some("ghost-node"));

        let prompt = &h.engine.prompts()[0];
        assert!(prompt.contains("Alert: Manual Analysis"));
        assert!(prompt.contains("Severity: info"));
        assert!(prompt.contains("- CPU usage: 0.00%"));
        assert!(!prompt.contains("**Workloads on this node:**"));
        assert_eq!(
            prompt.lines().filter(|l| l.contains(" ago - CPU:")).count(),
            6
        );
    }

    #[tokio::test]
    async fn test_unresolvable_node_is_analysed_as_unknown() {
        let h = harness(
            FakeGateway::default(),
            FakeEngine::new(EngineBehaviour::Reply("x")),
            RecordingBus::default(),
        );
        let payload = AlertWebhook::from_json(r#"{"alerts": [{"labels": {}}]}"#).unwrap();

        let outcome = h.pipeline.handle_webhook(&payload).await.unwrap();

        assert_eq!(outcome.node(), Some(identity::UNKNOWN_NODE));
        assert!(h.bus.events()[0].message.contains("*Alert:* Unknown"));
    }
}
