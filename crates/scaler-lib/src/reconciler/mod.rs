//! Reconciler driver
//!
//! One invocation per `TrafficStat` event: read the request, take the
//! per-service lock, then either advance the rollover in flight or evaluate
//! the catalog and start a new one. Every state change is written to the
//! request's status before the next step runs.
//!
//! The lock only covers one invocation. Across requeues a service belongs to
//! the request named in its rollover-owner annotation until that request's
//! rollover is done or failed; other requests for the service defer.

#[cfg(test)]
mod tests;

use crate::catalog::ProfileCatalog;
use crate::cluster::{ApiError, ClusterApi};
use crate::deployment::read_current_deployment;
use crate::health::{components, HealthRegistry};
use crate::locks::ServiceLocks;
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::resources::{ChosenProfileStatus, TrafficStatStatus};
use crate::retry::with_backoff;
use crate::rollover::{
    Orchestrator, Publication, RolloverConfig, RolloverError, RolloverState, Transition,
};
use chrono::{DateTime, Utc};
use kube::runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Shared state handed to every reconciliation
#[derive(Clone)]
pub struct Context {
    pub api: Arc<dyn ClusterApi>,
    pub orchestrator: Orchestrator,
    pub locks: ServiceLocks,
    pub metrics: ScalerMetrics,
    pub logger: StructuredLogger,
    pub health: HealthRegistry,
}

impl Context {
    pub fn new(api: Arc<dyn ClusterApi>, config: RolloverConfig, health: HealthRegistry) -> Self {
        let metrics = ScalerMetrics::new();
        let logger = StructuredLogger::new("hybrid-scaler");
        Self {
            orchestrator: Orchestrator::new(api.clone(), config, metrics.clone(), logger.clone()),
            api,
            locks: ServiceLocks::new(),
            metrics,
            logger,
            health,
        }
    }

    pub fn config(&self) -> &RolloverConfig {
        self.orchestrator.config()
    }
}

/// Result of one reconciliation
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The service already runs the chosen profile
    Unchanged,
    /// A rollover is waiting on readiness or the settle delay
    InProgress { retry_after: Duration },
    /// A rollover finished in this invocation
    Completed,
    /// Another reconciliation or an unfinished rollover of another request holds the service
    Deferred { retry_after: Duration },
    /// Nothing could be evaluated; no writes were made
    Skipped {
        reason: String,
        retry_after: Option<Duration>,
    },
    Failed { reason: String },
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Unchanged => "unchanged",
            ReconcileOutcome::InProgress { .. } => "in_progress",
            ReconcileOutcome::Completed => "completed",
            ReconcileOutcome::Deferred { .. } => "deferred",
            ReconcileOutcome::Skipped { .. } => "skipped",
            ReconcileOutcome::Failed { .. } => "failed",
        }
    }

    /// Controller action for this outcome.
    ///
    /// Status patches retrigger the watch, so terminal outcomes wait for the
    /// next change instead of resyncing.
    pub fn action(&self) -> Action {
        match self {
            ReconcileOutcome::InProgress { retry_after }
            | ReconcileOutcome::Deferred { retry_after } => Action::requeue(*retry_after),
            ReconcileOutcome::Skipped {
                retry_after: Some(delay),
                ..
            } => Action::requeue(*delay),
            _ => Action::await_change(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("TrafficStat is missing {0}")]
    MissingField(&'static str),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ReconcileError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconcileError::Api(e) if e.is_transient())
    }
}

/// Reconcile the `TrafficStat` `namespace/name` as of `now`
pub async fn reconcile_request(
    ctx: &Context,
    namespace: &str,
    name: &str,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let started = Instant::now();
    let result = run(ctx, namespace, name, now).await;
    let elapsed = started.elapsed().as_secs_f64();

    match &result {
        Ok(outcome) => {
            ctx.metrics.observe_reconcile(outcome.label(), elapsed);
            ctx.health.set_healthy(components::CLUSTER_API).await;
        }
        Err(e) => {
            ctx.metrics.observe_reconcile("error", elapsed);
            if e.is_transient() {
                ctx.health
                    .set_degraded(components::CLUSTER_API, e.to_string())
                    .await;
            }
        }
    }
    result
}

async fn run(
    ctx: &Context,
    namespace: &str,
    name: &str,
    now: DateTime<Utc>,
) -> Result<ReconcileOutcome, ReconcileError> {
    let api = ctx.api.as_ref();
    let backoff = &ctx.config().backoff;

    let request = match with_backoff(backoff, "get_scaling_request", move || {
        api.get_scaling_request(namespace, name)
    })
    .await
    {
        Ok(request) => request,
        Err(e) if e.is_not_found() => {
            debug!(namespace = %namespace, name = %name, "TrafficStat deleted");
            return Ok(ReconcileOutcome::Skipped {
                reason: e.to_string(),
                retry_after: None,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let scaling = match request.scaling_request() {
        Ok(scaling) => scaling,
        Err(e) => {
            warn!(namespace = %namespace, name = %name, error = %e, "Ignoring malformed TrafficStat");
            return Ok(ReconcileOutcome::Skipped {
                reason: e.to_string(),
                retry_after: None,
            });
        }
    };

    let lock_key = ServiceLocks::key(namespace, &scaling.service_name);
    let _guard = match ctx.locks.try_lock(&lock_key) {
        Some(guard) => guard,
        None => {
            debug!(service = %lock_key, "Service busy, deferring");
            return Ok(ReconcileOutcome::Deferred {
                retry_after: ctx.config().poll_interval,
            });
        }
    };

    let mut cycle = Cycle {
        ctx,
        namespace,
        name,
        service: scaling.service_name,
        traffic_volume: scaling.traffic_volume,
        generation: request.metadata.generation,
        status: request.current_status(),
        chosen: None,
        now,
    };

    let result = cycle.drive().await;
    match result {
        Err(ReconcileError::Api(e)) if e.is_transient() => {
            cycle.record_message(&e).await;
            Err(e.into())
        }
        other => other,
    }
}

/// One reconciliation of one request
struct Cycle<'a> {
    ctx: &'a Context,
    namespace: &'a str,
    name: &'a str,
    service: String,
    traffic_volume: f64,
    generation: Option<i64>,
    /// Status as last written
    status: TrafficStatStatus,
    chosen: Option<ChosenProfileStatus>,
    now: DateTime<Utc>,
}

impl Cycle<'_> {
    async fn drive(&mut self) -> Result<ReconcileOutcome, ReconcileError> {
        let state = RolloverState::from_status(&self.status);

        if state.in_flight() {
            return self.advance(state).await;
        }
        if let RolloverState::Failed { reason } = &state {
            if self.status.observed_generation == self.generation {
                return Ok(ReconcileOutcome::Failed {
                    reason: reason.clone(),
                });
            }
        }

        self.evaluate().await
    }

    async fn evaluate(&mut self) -> Result<ReconcileOutcome, ReconcileError> {
        let ctx = self.ctx;
        let api = ctx.api.as_ref();
        let backoff = &ctx.config().backoff;
        let (namespace, service) = (self.namespace, self.service.as_str());

        let data = match with_backoff(backoff, "get_profile_catalog", move || {
            api.get_profile_catalog(namespace, service)
        })
        .await
        {
            Ok(data) => data,
            Err(e) if e.is_not_found() => return Ok(self.missing(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        let catalog = match ProfileCatalog::from_config_map_data(&data) {
            Ok(catalog) => catalog,
            Err(e) => return Ok(self.missing(e.to_string())),
        };
        let chosen = match catalog.select(self.traffic_volume) {
            Ok(chosen) => chosen,
            Err(e) => return Ok(self.missing(e.to_string())),
        };

        let resource_type = catalog.resource_type();
        let chosen_status = ChosenProfileStatus::new(&chosen, resource_type);
        if self.status.chosen_profile.as_ref() != Some(&chosen_status) {
            ctx.logger.log_profile_chosen(
                namespace,
                service,
                resource_type.resource_name(),
                chosen.profile.resource_level,
                chosen.profile.concurrency_target,
                chosen.pod_count,
                chosen.total_cost,
            );
        }
        ctx.metrics
            .set_chosen_profile(namespace, service, chosen.pod_count, chosen.total_cost);
        self.chosen = Some(chosen_status);

        let knative_service = match with_backoff(backoff, "get_service", move || {
            api.get_service(namespace, service)
        })
        .await
        {
            Ok(svc) => svc,
            Err(e) if e.is_not_found() => return Ok(self.missing(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        if let Some(owner) = knative_service.rollover_owner().map(str::to_string) {
            if owner != self.name && self.owner_in_flight(&owner).await? {
                debug!(
                    namespace = %namespace,
                    service = %service,
                    owner = %owner,
                    "Service rollover owned by another request, deferring"
                );
                return Ok(ReconcileOutcome::Deferred {
                    retry_after: ctx.config().poll_interval,
                });
            }
        }

        let current = match read_current_deployment(&knative_service, resource_type) {
            Ok(current) => current,
            Err(e) => return Ok(self.missing(e.to_string())),
        };

        if chosen.profile.matches(&current, resource_type) {
            self.persist(&RolloverState::Done {
                revision: current.revision_id,
            })
            .await?;
            return Ok(ReconcileOutcome::Unchanged);
        }

        match ctx
            .orchestrator
            .publish(knative_service, &chosen, &catalog.metadata, self.name)
            .await
        {
            Ok(Publication::AlreadyApplied { revision }) => {
                self.persist(&RolloverState::Done { revision }).await?;
                Ok(ReconcileOutcome::Unchanged)
            }
            Ok(Publication::Published { previous, target }) => {
                ctx.metrics.inc_rollovers_started();
                let state = RolloverState::AwaitingReady {
                    previous,
                    target,
                    since: self.now,
                };
                self.persist(&state).await?;
                self.advance(state).await
            }
            Err(RolloverError::Read(e)) => Ok(self.missing(e.to_string())),
            Err(e @ RolloverError::ConflictsExhausted { .. }) => self.fail(e.to_string()).await,
            Err(RolloverError::Api(e)) => Err(e.into()),
        }
    }

    /// Whether `owner` still has a rollover of this service published and unfinished
    async fn owner_in_flight(&self, owner: &str) -> Result<bool, ApiError> {
        let api = self.ctx.api.as_ref();
        let namespace = self.namespace;
        let fetched = with_backoff(&self.ctx.config().backoff, "get_scaling_request", move || {
            api.get_scaling_request(namespace, owner)
        })
        .await;
        match fetched {
            Ok(request) => Ok(request.spec.service_name.trim() == self.service
                && RolloverState::from_status(&request.current_status()).in_flight()),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn advance(&mut self, mut state: RolloverState) -> Result<ReconcileOutcome, ReconcileError> {
        let ctx = self.ctx;
        loop {
            let transition = ctx
                .orchestrator
                .advance(self.namespace, &self.service, &state, self.now)
                .await?;

            match transition {
                Transition::Continue(next) => {
                    self.persist(&next).await?;
                    state = next;
                }
                Transition::Wait(next, retry_after) => {
                    self.persist(&next).await?;
                    return Ok(ReconcileOutcome::InProgress { retry_after });
                }
                Transition::Finished(RolloverState::Failed { reason }) => {
                    return self.fail(reason).await;
                }
                Transition::Finished(next) => {
                    self.persist(&next).await?;
                    ctx.metrics.inc_rollovers_completed();
                    info!(
                        namespace = %self.namespace,
                        service = %self.service,
                        phase = next.phase().as_str(),
                        "Rollover complete"
                    );
                    return Ok(ReconcileOutcome::Completed);
                }
            }
        }
    }

    async fn fail(&mut self, reason: String) -> Result<ReconcileOutcome, ReconcileError> {
        self.persist(&RolloverState::Failed {
            reason: reason.clone(),
        })
        .await?;
        self.ctx.metrics.inc_rollovers_failed();
        self.ctx
            .logger
            .log_rollover_failed(self.namespace, &self.service, &reason);
        Ok(ReconcileOutcome::Failed { reason })
    }

    /// A dependency is absent or unusable; nothing is written
    fn missing(&self, reason: String) -> ReconcileOutcome {
        warn!(
            namespace = %self.namespace,
            service = %self.service,
            reason = %reason,
            "Skipping evaluation"
        );
        ReconcileOutcome::Skipped {
            reason,
            retry_after: Some(self.ctx.config().missing_dependency_requeue),
        }
    }

    /// Write `state` to status when it differs from what is stored
    async fn persist(&mut self, state: &RolloverState) -> Result<(), ApiError> {
        let mut next = self.status.clone();
        state.apply_to(&mut next);
        if let Some(chosen) = &self.chosen {
            next.chosen_profile = Some(chosen.clone());
        }
        next.observed_generation = self.generation;

        if next == self.status {
            return Ok(());
        }

        self.write_status(next).await
    }

    async fn write_status(&mut self, status: TrafficStatStatus) -> Result<(), ApiError> {
        let api = self.ctx.api.as_ref();
        let (namespace, name) = (self.namespace, self.name);
        let pending = &status;
        with_backoff(&self.ctx.config().backoff, "patch_scaling_status", move || {
            api.patch_scaling_status(namespace, name, pending)
        })
        .await?;
        debug!(
            namespace = %namespace,
            name = %name,
            phase = status.phase.as_str(),
            "Status updated"
        );
        self.status = status;
        Ok(())
    }

    /// Leave a note on status after retries ran out; the error itself goes to the error policy
    async fn record_message(&mut self, error: &ApiError) {
        let mut status = self.status.clone();
        status.message = Some(error.to_string());
        if status == self.status {
            return;
        }
        let api = self.ctx.api.as_ref();
        if let Err(e) = api
            .patch_scaling_status(self.namespace, self.name, &status)
            .await
        {
            warn!(
                namespace = %self.namespace,
                name = %self.name,
                error = %e,
                "Could not record API failure on status"
            );
        }
    }
}
