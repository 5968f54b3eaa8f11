//! Component health behind the `/healthz` and `/readyz` endpoints
//!
//! The controller loop and the cluster API calls each report into a shared
//! registry. Liveness fails only on an unhealthy component; readiness also
//! waits for the controller to start.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Failing calls are being retried
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the component last reported
    pub reported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Worst status among the components
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Names the scaler reports under
pub mod components {
    pub const CONTROLLER: &str = "controller";
    pub const CLUSTER_API: &str = "cluster_api";
}

#[derive(Debug, Default)]
struct Registry {
    components: BTreeMap<String, ComponentHealth>,
    started: bool,
}

/// Cheap to clone; every clone shares the same registry
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also starts tracking a component not seen before
    pub async fn set_healthy(&self, name: &str) {
        self.report(name, ComponentStatus::Healthy, None).await;
    }

    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Degraded, Some(message.into()))
            .await;
    }

    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.report(name, ComponentStatus::Unhealthy, Some(message.into()))
            .await;
    }

    /// Flip readiness once the controller runs
    pub async fn set_ready(&self, ready: bool) {
        self.inner.write().await.started = ready;
    }

    async fn report(&self, name: &str, status: ComponentStatus, message: Option<String>) {
        self.inner.write().await.components.insert(
            name.to_string(),
            ComponentHealth {
                status,
                message,
                reported_at: Utc::now(),
            },
        );
    }

    pub async fn health(&self) -> HealthResponse {
        let registry = self.inner.read().await;
        let status = registry
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        HealthResponse {
            status,
            components: registry.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let registry = self.inner.read().await;
        let reason = if !registry.started {
            Some("controller not started".to_string())
        } else {
            registry
                .components
                .iter()
                .find(|(_, c)| c.status == ComponentStatus::Unhealthy)
                .map(|(name, _)| format!("component '{}' unhealthy", name))
        };
        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
