//! Core data models for the hybrid scaler

use crate::quantity::ResourceType;
use serde::{Deserialize, Serialize};

/// Declared traffic for one target service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingRequest {
    pub service_name: String,
    pub traffic_volume: f64,
}

/// A candidate (resource level, concurrency target) operating point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceProfile {
    /// Per-instance limit in canonical units of the catalog's resource type
    pub resource_level: f64,
    /// Simultaneous requests one instance should serve
    pub concurrency_target: f64,
}

impl ResourceProfile {
    pub fn new(resource_level: f64, concurrency_target: f64) -> Self {
        Self {
            resource_level,
            concurrency_target,
        }
    }

    /// Both dimensions finite and strictly positive
    pub fn is_valid(&self) -> bool {
        self.resource_level.is_finite()
            && self.resource_level > 0.0
            && self.concurrency_target.is_finite()
            && self.concurrency_target > 0.0
    }

    /// Whether the deployed state already runs this profile
    pub fn matches(&self, current: &CurrentDeployment, resource_type: ResourceType) -> bool {
        let level_matches = current
            .resource_level
            .map(|level| resource_type.same_value(level, self.resource_level))
            .unwrap_or(false);
        let concurrency_matches = current
            .concurrency_target
            .map(|target| (target - self.concurrency_target).abs() < 1e-9)
            .unwrap_or(false);

        level_matches && concurrency_matches
    }
}

/// Snapshot of what the target service currently runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentDeployment {
    /// Latest ready revision, if the service has ever become ready
    pub revision_id: Option<String>,
    /// Concurrency target annotation, `None` when not set
    pub concurrency_target: Option<f64>,
    /// Deployed limit in canonical units, `None` when not set
    pub resource_level: Option<f64>,
    /// Optimistic-concurrency token guarding the next write
    pub ownership_token: Option<String>,
}

/// Pod as seen by the drain phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSummary {
    pub name: String,
    pub phase: Option<String>,
}

/// Readiness of a revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionReadiness {
    pub ready: bool,
    pub reason: Option<String>,
}
