//! Alert correlation and metrics enrichment
//!
//! This crate provides the core functionality for:
//! - Parsing alert webhooks and resolving the affected node
//! - Rendering PromQL queries and reading node and workload history
//! - Building the analysis prompt and calling the analysis engine
//! - Publishing the diagnosis to the notification bus
//! - Health checks and observability

pub mod context;
pub mod engine;
pub mod health;
pub mod history;
pub mod identity;
pub mod models;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod prometheus;
pub mod query;
pub mod webhook;

pub use engine::{AnalysisEngine, AnalysisError, OpenAiCompatibleEngine};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use history::{HistoryAccumulator, NodeHistory};
pub use models::*;
pub use notify::{KafkaRestBus, LoggingBus, NotificationBus, PublishError};
pub use observability::{AnalyzerMetrics, StructuredLogger};
pub use pipeline::{AnalysisPipeline, PipelineError, PipelineOutcome, PipelineSettings};
pub use crate::prometheus::{MetricsGateway, PrometheusClient};
pub use query::{QueryError, QueryKind, QueryTemplates};
pub use webhook::{AlertWebhook, WebhookAlert};
