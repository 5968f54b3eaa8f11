//! Orchestration API seam
//!
//! The reconciler talks to the cluster only through [`ClusterApi`]. The kube
//! implementation is used in production; the in-memory one backs the unit
//! tests.

mod kube_api;
#[cfg(test)]
mod memory;

pub use kube_api::KubeClusterApi;
#[cfg(test)]
pub use memory::InMemoryCluster;

use crate::models::{PodSummary, RevisionReadiness};
use crate::resources::{KnativeService, TrafficStat, TrafficStatStatus};
use std::collections::BTreeMap;
use thiserror::Error;

pub use async_trait::async_trait;

/// Classified orchestration API failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("conflicting update to {kind} '{name}': {message}")]
    Conflict {
        kind: &'static str,
        name: String,
        message: String,
    },
    #[error("{kind} '{name}' rejected as invalid: {message}")]
    Invalid {
        kind: &'static str,
        name: String,
        message: String,
    },
    #[error("transient API failure: {0}")]
    Transient(String),
    #[error("API failure: {0}")]
    Other(String),
}

impl ApiError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        ApiError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ApiError::Conflict { .. })
    }

    /// Network failures, throttling and server-side errors
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}

/// Operations the scaler needs from the orchestration API
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch the scaling request resource
    async fn get_scaling_request(&self, namespace: &str, name: &str)
        -> Result<TrafficStat, ApiError>;

    /// Replace the status of a scaling request (merge patch)
    async fn patch_scaling_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TrafficStatStatus,
    ) -> Result<(), ApiError>;

    /// Raw profile catalog data for a service
    async fn get_profile_catalog(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<BTreeMap<String, String>, ApiError>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<KnativeService, ApiError>;

    /// Replace a service; `metadata.resourceVersion` guards the write
    async fn update_service(&self, service: &KnativeService) -> Result<KnativeService, ApiError>;

    async fn get_revision(&self, namespace: &str, name: &str)
        -> Result<RevisionReadiness, ApiError>;

    async fn delete_revision(&self, namespace: &str, name: &str) -> Result<(), ApiError>;

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>, ApiError>;

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: u32,
    ) -> Result<(), ApiError>;
}
