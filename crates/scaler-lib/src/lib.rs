//! Hybrid scaling library for Knative services
//!
//! This crate provides the core functionality for:
//! - Parsing per-service profile catalogs and resource quantities
//! - Choosing the cost-minimal concurrency/resource profile for a traffic volume
//! - Rolling a Knative service over to that profile without blocking
//! - Health checks and observability

pub mod catalog;
pub mod cluster;
pub mod controller;
pub mod deployment;
pub mod health;
pub mod locks;
pub mod models;
pub mod observability;
pub mod optimizer;
pub mod quantity;
pub mod reconciler;
pub mod resources;
pub mod retry;
pub mod rollover;

#[cfg(test)]
mod fixtures;

pub use catalog::ProfileCatalog;
pub use cluster::{ApiError, ClusterApi, KubeClusterApi};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ScalerMetrics, StructuredLogger};
pub use optimizer::{select_profile, ChosenProfile, SelectionError};
pub use reconciler::{reconcile_request, Context, ReconcileError, ReconcileOutcome};
pub use rollover::RolloverConfig;
