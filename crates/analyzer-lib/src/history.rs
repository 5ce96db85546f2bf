//! Node history and workload collection
//!
//! Builds one [`NodeSnapshot`] per hour offset, newest first, and a map of
//! per-workload snapshots for the node. Relies on the gateway's fail-open
//! behaviour: an unreachable backend yields zero-valued snapshots, never
//! missing ones.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{NodeSnapshot, WorkloadMap, WorkloadSnapshot};
use crate::prometheus::MetricsGateway;
use crate::query::{validate_identifier, QueryKind, QueryTemplates};

/// Label that carries the workload name in workload CPU results
pub const DEFAULT_WORKLOAD_LABEL: &str = "name";

/// Snapshots of a node, newest first. Index 0 is the current hour.
#[derive(Debug, Clone, Default)]
pub struct NodeHistory {
    snapshots: Vec<NodeSnapshot>,
}

impl NodeHistory {
    pub fn new(snapshots: Vec<NodeSnapshot>) -> Self {
        Self { snapshots }
    }

    /// The most recent snapshot, if any were collected
    pub fn current(&self) -> Option<&NodeSnapshot> {
        self.snapshots.first()
    }

    pub fn snapshots(&self) -> &[NodeSnapshot] {
        &self.snapshots
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn into_snapshots(self) -> Vec<NodeSnapshot> {
        self.snapshots
    }
}

/// Collects node and workload metrics through a [`MetricsGateway`]
#[derive(Clone)]
pub struct HistoryAccumulator {
    gateway: Arc<dyn MetricsGateway>,
    templates: QueryTemplates,
    workload_label: String,
}

impl HistoryAccumulator {
    pub fn new(gateway: Arc<dyn MetricsGateway>) -> Self {
        Self {
            gateway,
            templates: QueryTemplates::default(),
            workload_label: DEFAULT_WORKLOAD_LABEL.to_string(),
        }
    }

    /// Use custom query templates
    pub fn with_templates(mut self, templates: QueryTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Read workload names from a different result label
    pub fn with_workload_label(mut self, label: impl Into<String>) -> Self {
        self.workload_label = label.into();
        self
    }

    /// Collect `hours` hourly snapshots ending now
    pub async fn accumulate(&self, node: &str, hours: usize) -> NodeHistory {
        self.accumulate_at(node, hours, Utc::now()).await
    }

    /// Collect `hours` hourly snapshots ending at `now`.
    ///
    /// Returns an empty history only when `hours` is zero or the node
    /// identifier cannot be embedded in a query.
    pub async fn accumulate_at(&self, node: &str, hours: usize, now: DateTime<Utc>) -> NodeHistory {
        if let Err(e) = validate_identifier("node identifier", node) {
            warn!(node = %node, error = %e, "Cannot query metrics for node");
            return NodeHistory::default();
        }

        info!(node = %node, hours = hours, "Fetching node metrics history");

        let mut snapshots = Vec::with_capacity(hours);
        for offset in 0..hours {
            let timestamp = now - ChronoDuration::hours(offset as i64);
            snapshots.push(self.snapshot_at(node, timestamp).await);
        }

        debug!(node = %node, snapshots = snapshots.len(), "Node metrics history collected");
        NodeHistory::new(snapshots)
    }

    async fn snapshot_at(&self, node: &str, timestamp: DateTime<Utc>) -> NodeSnapshot {
        let (cpu, memory, disk) = tokio::join!(
            self.node_metric(QueryKind::CpuUsage, node, timestamp),
            self.node_metric(QueryKind::MemoryUsage, node, timestamp),
            self.node_metric(QueryKind::DiskUsage, node, timestamp),
        );
        NodeSnapshot::new(node, timestamp, cpu, memory, disk)
    }

    async fn node_metric(&self, kind: QueryKind, node: &str, timestamp: DateTime<Utc>) -> f64 {
        match self.templates.render(kind, node, None) {
            Ok(expression) => self.gateway.query_scalar_at(&expression, timestamp).await,
            Err(e) => {
                warn!(kind = %kind, node = %node, error = %e, "Failed to render query");
                0.0
            }
        }
    }

    /// Discover workloads on the node and read their CPU and memory usage.
    ///
    /// An empty map means either no workloads or a failed discovery query;
    /// the two are not distinguished.
    pub async fn fetch_workloads(&self, node: &str) -> WorkloadMap {
        let expression = match self.templates.render(QueryKind::WorkloadCpu, node, None) {
            Ok(expression) => expression,
            Err(e) => {
                warn!(node = %node, error = %e, "Failed to render workload query");
                return WorkloadMap::new();
            }
        };

        let series = self.gateway.query_vector(&expression).await;
        let now = Utc::now();
        let mut workloads = WorkloadMap::new();

        for sample in series {
            let Some(name) = sample
                .labels
                .get(&self.workload_label)
                .filter(|n| !n.is_empty())
            else {
                debug!(labels = ?sample.labels, "Series has no workload name");
                continue;
            };

            let memory_query =
                match self
                    .templates
                    .render(QueryKind::WorkloadMemory, node, Some(name.as_str()))
                {
                    Ok(query) => query,
                    Err(e) => {
                        warn!(workload = %name, error = %e, "Skipping workload");
                        continue;
                    }
                };

            let memory_mb = self.gateway.query_scalar_at(&memory_query, now).await;
            workloads.insert(
                name.clone(),
                WorkloadSnapshot::new(name.clone(), sample.value, memory_mb),
            );
        }

        info!(node = %node, workloads = workloads.len(), "Fetched workload metrics");
        workloads
    }
}
