//! kube-runtime wiring for the `TrafficStat` controller

use crate::cluster::ApiError;
use crate::health::components;
use crate::reconciler::{reconcile_request, Context, ReconcileError};
use crate::resources::TrafficStat;
use chrono::Utc;
use futures::StreamExt;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Api, Client, ResourceExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reconcile entry point handed to the controller
pub async fn reconcile(request: Arc<TrafficStat>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    let namespace = request
        .namespace()
        .ok_or(ReconcileError::MissingField("metadata.namespace"))?;
    let name = request.name_any();

    let outcome = reconcile_request(&ctx, &namespace, &name, Utc::now()).await?;
    debug!(
        namespace = %namespace,
        name = %name,
        outcome = outcome.label(),
        "Reconciled"
    );
    Ok(outcome.action())
}

/// Requeue delay after a failed reconciliation, by error class
pub fn error_delay(error: &ReconcileError) -> Duration {
    let secs = match error {
        ReconcileError::Api(ApiError::Transient(_)) => 10,
        ReconcileError::Api(ApiError::Conflict { .. }) => 2,
        ReconcileError::Api(ApiError::NotFound { .. }) => 30,
        ReconcileError::Api(ApiError::Invalid { .. }) | ReconcileError::Api(ApiError::Other(_)) => {
            300
        }
        ReconcileError::MissingField(_) => 300,
    };
    Duration::from_secs(secs)
}

pub fn error_policy(request: Arc<TrafficStat>, error: &ReconcileError, _ctx: Arc<Context>) -> Action {
    let delay = error_delay(error);
    warn!(
        name = %request.name_any(),
        namespace = ?request.namespace(),
        error = %error,
        requeue_secs = delay.as_secs(),
        "Reconciliation failed"
    );
    Action::requeue(delay)
}

/// Run the controller until a shutdown signal arrives
pub async fn run(client: Client, watch_namespace: Option<String>, ctx: Arc<Context>) {
    let requests: Api<TrafficStat> = match &watch_namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    ctx.health.set_healthy(components::CONTROLLER).await;
    info!(namespace = ?watch_namespace, "Starting TrafficStat controller");

    Controller::new(requests, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx.clone())
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(name = %object.name, "Reconcile finished"),
                Err(e) => debug!(error = %e, "Reconcile loop error"),
            }
        })
        .await;

    info!("TrafficStat controller stopped");
    ctx.health
        .set_unhealthy(components::CONTROLLER, "controller stopped")
        .await;
}
