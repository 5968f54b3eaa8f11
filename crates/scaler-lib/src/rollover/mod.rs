//! Rollover orchestration
//!
//! Moves a Knative service to a chosen profile without blocking:
//!
//! 1. publish a new service descriptor, re-reading and retrying on conflicts
//! 2. poll the new revision until it reports Ready (or the timeout passes)
//! 3. wait for the settle delay, delete the previous revision, then its pods
//!
//! Each step returns a [`Transition`]; the caller persists the new state and
//! either continues immediately or requeues after the returned delay.

mod descriptor;
mod revision;
mod state;


pub use descriptor::{build_update, stamp_owner};
pub use revision::{next_revision_name, resolve_new_revision};
pub use state::RolloverState;

use crate::catalog::CatalogMetadata;
use crate::cluster::{ApiError, ClusterApi};
use crate::deployment::{read_current_deployment, ReadError};
use crate::models::RevisionReadiness;
use crate::observability::{ScalerMetrics, StructuredLogger};
use crate::optimizer::ChosenProfile;
use crate::retry::{with_backoff, BackoffPolicy};
use crate::resources::KnativeService;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Pods are removed immediately; the new revision is already serving
const POD_GRACE_PERIOD_SECONDS: u32 = 0;

/// Timing and retry knobs for rollovers
#[derive(Debug, Clone, PartialEq)]
pub struct RolloverConfig {
    /// Delay between readiness polls
    pub poll_interval: Duration,
    /// Grace time between readiness and draining the previous revision
    pub settle_delay: Duration,
    /// How long a new revision may take to become ready
    pub readiness_timeout: Duration,
    /// Re-read and retry limit for conflicting service updates
    pub conflict_retries: u32,
    /// Per-call retry schedule for transient API failures
    pub backoff: BackoffPolicy,
    /// Requeue delay when the catalog or service does not exist (yet)
    pub missing_dependency_requeue: Duration,
}

impl Default for RolloverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(5),
            readiness_timeout: Duration::from_secs(300),
            conflict_retries: 3,
            backoff: BackoffPolicy::default(),
            missing_dependency_requeue: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RolloverError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("cannot read deployed profile: {0}")]
    Read(#[from] ReadError),
    #[error("service '{service}' kept changing underneath us, gave up after {attempts} conflicting updates")]
    ConflictsExhausted { service: String, attempts: u32 },
}

/// Result of the publish step
#[derive(Debug, Clone, PartialEq)]
pub enum Publication {
    /// A re-read showed the profile already deployed
    AlreadyApplied { revision: Option<String> },
    Published {
        previous: Option<String>,
        target: String,
    },
}

/// Next move of the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Persist the state and keep going in this invocation
    Continue(RolloverState),
    /// Persist the state and come back after the delay
    Wait(RolloverState, Duration),
    /// Persist the terminal state
    Finished(RolloverState),
}

#[derive(Clone)]
pub struct Orchestrator {
    api: Arc<dyn ClusterApi>,
    config: RolloverConfig,
    metrics: ScalerMetrics,
    logger: StructuredLogger,
}

impl Orchestrator {
    pub fn new(
        api: Arc<dyn ClusterApi>,
        config: RolloverConfig,
        metrics: ScalerMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            api,
            config,
            metrics,
            logger,
        }
    }

    pub fn config(&self) -> &RolloverConfig {
        &self.config
    }

    /// Publish `chosen` on `service`.
    ///
    /// The update is stamped with `owner`, the TrafficStat driving this
    /// rollover. On a conflicting write the service is re-read, the equality
    /// check is repeated and the write retried, up to `conflict_retries` times.
    pub async fn publish(
        &self,
        service: KnativeService,
        chosen: &ChosenProfile,
        metadata: &CatalogMetadata,
        owner: &str,
    ) -> Result<Publication, RolloverError> {
        let api = self.api.as_ref();
        let namespace = service.metadata.namespace.clone().unwrap_or_default();
        let name = service.metadata.name.clone().unwrap_or_default();
        let mut service = service;
        let mut conflicts = 0;

        loop {
            let current = read_current_deployment(&service, metadata.resource_type)?;
            if chosen.profile.matches(&current, metadata.resource_type) {
                return Ok(Publication::AlreadyApplied {
                    revision: current.revision_id,
                });
            }

            let mut update = build_update(&service, chosen, metadata)?;
            stamp_owner(&mut update, owner);
            let descriptor = &update;
            let published = with_backoff(&self.config.backoff, "update_service", move || {
                api.update_service(descriptor)
            })
            .await;
            match published {
                Ok(response) => {
                    let last_created = service
                        .latest_created_revision()
                        .or(current.revision_id.as_deref());
                    let target =
                        resolve_new_revision(&name, last_created, response.latest_created_revision());
                    self.logger.log_rollover_published(
                        &namespace,
                        &name,
                        current.revision_id.as_deref(),
                        &target,
                    );
                    return Ok(Publication::Published {
                        previous: current.revision_id,
                        target,
                    });
                }
                Err(e) if e.is_conflict() => {
                    conflicts += 1;
                    self.metrics.inc_conflicts();
                    if conflicts > self.config.conflict_retries {
                        return Err(RolloverError::ConflictsExhausted {
                            service: name,
                            attempts: conflicts,
                        });
                    }
                    warn!(
                        namespace = %namespace,
                        service = %name,
                        attempt = conflicts,
                        "Conflicting service update, re-reading"
                    );
                    let (ns, svc) = (namespace.as_str(), name.as_str());
                    service = with_backoff(&self.config.backoff, "get_service", move || {
                        api.get_service(ns, svc)
                    })
                    .await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Advance an in-flight rollover by one step
    pub async fn advance(
        &self,
        namespace: &str,
        service: &str,
        state: &RolloverState,
        now: DateTime<Utc>,
    ) -> Result<Transition, ApiError> {
        match state {
            RolloverState::AwaitingReady {
                previous,
                target,
                since,
            } => {
                let waited = elapsed(*since, now);
                let readiness = self.revision_readiness(namespace, target).await?;

                if readiness.ready {
                    self.logger
                        .log_revision_ready(namespace, service, target, waited.as_secs_f64());
                    return Ok(match previous {
                        Some(previous) if previous != target => Transition::Continue(
                            RolloverState::Draining {
                                previous: previous.clone(),
                                target: target.clone(),
                                ready_at: now,
                                revision_deleted: false,
                            },
                        ),
                        _ => Transition::Finished(RolloverState::Done {
                            revision: Some(target.clone()),
                        }),
                    });
                }

                if waited >= self.config.readiness_timeout {
                    let reason = format!(
                        "revision {} not ready after {}s: {}",
                        target,
                        waited.as_secs(),
                        readiness.reason.unwrap_or_else(|| "no reason reported".to_string())
                    );
                    return Ok(Transition::Finished(RolloverState::Failed { reason }));
                }

                debug!(
                    namespace = %namespace,
                    revision = %target,
                    reason = ?readiness.reason,
                    "Revision not ready yet"
                );
                Ok(Transition::Wait(state.clone(), self.config.poll_interval))
            }
            RolloverState::Draining {
                previous,
                target,
                ready_at,
                revision_deleted,
            } => {
                let settled = elapsed(*ready_at, now);
                if settled < self.config.settle_delay {
                    return Ok(Transition::Wait(
                        state.clone(),
                        self.config.settle_delay - settled,
                    ));
                }

                if !revision_deleted {
                    let deleted = self.retire_revision(namespace, previous).await?;
                    self.logger.log_revision_retired(namespace, service, previous, deleted);
                    return Ok(Transition::Continue(RolloverState::Draining {
                        previous: previous.clone(),
                        target: target.clone(),
                        ready_at: *ready_at,
                        revision_deleted: true,
                    }));
                }

                let pods = self.reclaim_pods(namespace, previous).await?;
                self.metrics.add_pods_reclaimed(pods.len() as u64);
                self.logger
                    .log_revision_drained(namespace, service, previous, pods.len());
                Ok(Transition::Finished(RolloverState::Done {
                    revision: Some(target.clone()),
                }))
            }
            other => Ok(Transition::Finished(other.clone())),
        }
    }

    /// A revision that does not exist yet is not ready
    async fn revision_readiness(
        &self,
        namespace: &str,
        revision: &str,
    ) -> Result<RevisionReadiness, ApiError> {
        let api = self.api.as_ref();
        match with_backoff(&self.config.backoff, "get_revision", move || {
            api.get_revision(namespace, revision)
        })
        .await
        {
            Ok(readiness) => Ok(readiness),
            Err(e) if e.is_not_found() => Ok(RevisionReadiness {
                ready: false,
                reason: Some("revision not created yet".to_string()),
            }),
            Err(e) => Err(e),
        }
    }

    /// Delete the previous revision. `false` when it was already gone.
    pub async fn retire_revision(&self, namespace: &str, previous: &str) -> Result<bool, ApiError> {
        let api = self.api.as_ref();
        let deleted = with_backoff(&self.config.backoff, "delete_revision", move || {
            api.delete_revision(namespace, previous)
        })
        .await;
        match deleted {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => {
                debug!(namespace = %namespace, revision = %previous, "Revision already gone");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the pods `previous` left behind, matched on the `<previous>-`
    /// name prefix. Pods that are already gone are skipped.
    pub async fn reclaim_pods(
        &self,
        namespace: &str,
        previous: &str,
    ) -> Result<Vec<String>, ApiError> {
        let api = self.api.as_ref();
        let backoff = &self.config.backoff;
        let prefix = format!("{}-", previous);

        let pods = with_backoff(backoff, "list_pods", move || api.list_pods(namespace)).await?;
        let mut reclaimed = Vec::new();

        for pod in pods.into_iter().filter(|pod| pod.name.starts_with(&prefix)) {
            let pod_name = pod.name.as_str();
            let deleted = with_backoff(backoff, "delete_pod", move || {
                api.delete_pod(namespace, pod_name, POD_GRACE_PERIOD_SECONDS)
            })
            .await;
            match deleted {
                Ok(()) => {
                    info!(namespace = %namespace, pod = %pod.name, "Deleted pod of previous revision");
                    reclaimed.push(pod.name);
                }
                Err(e) if e.is_not_found() => {
                    debug!(namespace = %namespace, pod = %pod.name, "Pod already gone")
                }
                Err(e) => return Err(e),
            }
        }

        Ok(reclaimed)
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}
