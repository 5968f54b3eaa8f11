//! Hybrid scaler - cost-aware profile controller for Knative services
//!
//! Watches `TrafficStat` resources, picks the cheapest concurrency/resource
//! profile for the declared traffic and rolls the target service over to it.

use anyhow::{Context as _, Result};
use hybrid_scaler::{api, config::ScalerConfig};
use kube::Client;
use scaler_lib::{
    controller,
    health::{components, HealthRegistry},
    Context, KubeClusterApi,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SCALER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = ScalerConfig::load().context("invalid SCALER_* configuration")?;
    info!(
        api_port = config.api_port,
        watch_namespace = ?config.watch_namespace,
        field_manager = %config.field_manager,
        "Scaler configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.set_healthy(components::CONTROLLER).await;
    health_registry.set_healthy(components::CLUSTER_API).await;

    let client = Client::try_default()
        .await
        .context("failed to build Kubernetes client")?;
    let cluster = Arc::new(KubeClusterApi::new(client.clone(), config.field_manager.clone()));
    let ctx = Arc::new(Context::new(
        cluster,
        config.rollover_config(),
        health_registry.clone(),
    ));
    ctx.logger
        .log_startup(SCALER_VERSION, config.watch_namespace.as_deref());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        ctx.metrics.clone(),
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    health_registry.set_ready(true).await;

    // Returns once SIGINT/SIGTERM stops the controller
    controller::run(client, config.watch_namespace.clone(), ctx.clone()).await;

    health_registry.set_ready(false).await;
    ctx.logger.log_shutdown("signal received");
    api_handle.abort();

    Ok(())
}
