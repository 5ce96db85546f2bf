//! Component health tracking
//!
//! The analyzer has no background loops, so component status is updated as a
//! side effect of each pipeline run. A failed call to an external service
//! marks that component degraded, a run of failures marks it unhealthy, and
//! the next successful call clears it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is experiencing issues but still operational
    Degraded,
    /// Component has failed
    Unhealthy,
}

/// Information about a component's health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failed calls since the last success
    #[serde(default)]
    pub consecutive_failures: u32,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            consecutive_failures: 0,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Compute overall status from component statuses
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Consecutive failed calls after which a component is reported unhealthy
pub const UNHEALTHY_AFTER_FAILURES: u32 = 5;

/// Component names for health tracking
pub mod components {
    pub const ANALYSIS_ENGINE: &str = "analysis_engine";
    pub const NOTIFICATION_BUS: &str = "notification_bus";
}

/// Health registry for tracking component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Update component health status
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    /// Mark component as healthy
    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Mark component as degraded
    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    /// Record a successful call to an external component
    pub async fn record_success(&self, name: &str) {
        self.set_healthy(name).await;
    }

    /// Record a failed call. The component is degraded until
    /// [`UNHEALTHY_AFTER_FAILURES`] calls in a row have failed.
    pub async fn record_failure(&self, name: &str, message: impl Into<String>) {
        let mut components = self.components.write().await;
        let failures = components
            .get(name)
            .map(|c| c.consecutive_failures)
            .unwrap_or(0)
            .saturating_add(1);
        let mut health = if failures >= UNHEALTHY_AFTER_FAILURES {
            ComponentHealth::unhealthy(message)
        } else {
            ComponentHealth::degraded(message)
        };
        health.consecutive_failures = failures;
        components.insert(name.to_string(), health);
    }

    /// Set readiness status
    pub async fn set_ready(&self, ready: bool) {
        let mut r = self.ready.write().await;
        *r = ready;
    }

    /// Get health response
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Get readiness response.
    ///
    /// Component health does not affect readiness: a component only recovers
    /// through a successful call, which needs incoming alerts.
    pub async fn readiness(&self) -> ReadinessResponse {
        if *self.ready.read().await {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some("Service not yet initialized".to_string()),
            }
        }
    }
}
