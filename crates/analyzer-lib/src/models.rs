//! Core data models for the alert analyzer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// String-to-string mapping used for alert labels and annotations
pub type Labels = HashMap<String, String>;

/// Maximum number of historical snapshots that reach the analysis context
pub const MAX_HISTORY_ENTRIES: usize = 6;

/// Severity used when an alert carries no `severity` label
pub const DEFAULT_SEVERITY: &str = "warning";

/// Alert name used when an alert carries no `alertname` label
pub const DEFAULT_ALERT_NAME: &str = "Unknown";

/// Point-in-time resource usage of a node.
///
/// Percentages are normalized on construction: non-finite values become 0
/// and everything else is clamped to `[0, 100]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    node: String,
    timestamp: DateTime<Utc>,
    cpu_usage_percent: f64,
    memory_usage_percent: f64,
    disk_usage_percent: f64,
}

impl NodeSnapshot {
    pub fn new(
        node: impl Into<String>,
        timestamp: DateTime<Utc>,
        cpu_usage_percent: f64,
        memory_usage_percent: f64,
        disk_usage_percent: f64,
    ) -> Self {
        Self {
            node: node.into(),
            timestamp,
            cpu_usage_percent: normalize_percent(cpu_usage_percent),
            memory_usage_percent: normalize_percent(memory_usage_percent),
            disk_usage_percent: normalize_percent(disk_usage_percent),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn cpu_usage_percent(&self) -> f64 {
        self.cpu_usage_percent
    }

    pub fn memory_usage_percent(&self) -> f64 {
        self.memory_usage_percent
    }

    pub fn disk_usage_percent(&self) -> f64 {
        self.disk_usage_percent
    }
}

/// Point-in-time resource usage of a workload (container or process) on a node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadSnapshot {
    name: String,
    cpu_usage_percent: f64,
    memory_usage_mb: f64,
}

impl WorkloadSnapshot {
    /// CPU may exceed 100% on multi-core hosts, so it is only floored at 0.
    pub fn new(name: impl Into<String>, cpu_usage_percent: f64, memory_usage_mb: f64) -> Self {
        Self {
            name: name.into(),
            cpu_usage_percent: normalize_non_negative(cpu_usage_percent),
            memory_usage_mb: normalize_non_negative(memory_usage_mb),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cpu_usage_percent(&self) -> f64 {
        self.cpu_usage_percent
    }

    pub fn memory_usage_mb(&self) -> f64 {
        self.memory_usage_mb
    }
}

/// Workload snapshots keyed by workload name. Iteration order is unspecified.
pub type WorkloadMap = HashMap<String, WorkloadSnapshot>;

/// Alert metadata relevant to the analysis
#[derive(Debug, Clone, PartialEq)]
pub struct AlertContext {
    pub alert_name: String,
    pub severity: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub labels: Labels,
}

impl AlertContext {
    /// Derive the context from a merged label mapping and the alert's own annotations
    pub fn from_alert(merged_labels: Labels, annotations: &Labels) -> Self {
        let alert_name = non_empty(merged_labels.get("alertname"))
            .unwrap_or_else(|| DEFAULT_ALERT_NAME.to_string());
        let severity = non_empty(merged_labels.get("severity"))
            .unwrap_or_else(|| DEFAULT_SEVERITY.to_string());

        Self {
            alert_name,
            severity,
            summary: non_empty(annotations.get("summary")),
            description: non_empty(annotations.get("description")),
            labels: merged_labels,
        }
    }

    /// Informational context used when analysis is requested by an operator
    pub fn manual(node: &str) -> Self {
        Self {
            alert_name: "Manual Analysis".to_string(),
            severity: "info".to_string(),
            summary: Some(format!("Manual analysis requested for {}", node)),
            description: None,
            labels: Labels::new(),
        }
    }
}

/// Everything the context builder needs for one alert
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub current: NodeSnapshot,
    pub history: Vec<NodeSnapshot>,
    pub workloads: WorkloadMap,
    pub alert: AlertContext,
}

impl AnalysisRequest {
    /// History is expected newest-first and is truncated to [`MAX_HISTORY_ENTRIES`].
    pub fn new(
        current: NodeSnapshot,
        mut history: Vec<NodeSnapshot>,
        workloads: WorkloadMap,
        alert: AlertContext,
    ) -> Self {
        history.truncate(MAX_HISTORY_ENTRIES);
        Self {
            current,
            history,
            workloads,
            alert,
        }
    }
}

/// Message handed to the notification bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub slack_user_ids: Vec<String>,
    pub message: String,
    /// Reserved for interactive notifications
    pub action_id: Option<String>,
    /// Reserved for interactive notifications
    pub action_value: Option<String>,
}

impl NotificationEvent {
    pub fn new(slack_user_ids: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            slack_user_ids,
            message: message.into(),
            action_id: None,
            action_value: None,
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

fn normalize_percent(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

fn normalize_non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}
