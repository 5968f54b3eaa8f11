//! Persisted rollover state machine

use crate::resources::{RolloverPhase, TrafficStatStatus};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Where a service is in its rollover to the chosen profile.
///
/// The state lives on the `TrafficStat` status so that a rollover survives
/// controller restarts and never blocks a reconciliation while waiting.
#[derive(Debug, Clone, PartialEq)]
pub enum RolloverState {
    Idle,
    /// New revision published, waiting for its Ready condition
    AwaitingReady {
        previous: Option<String>,
        target: String,
        since: DateTime<Utc>,
    },
    /// New revision is ready; the previous one is removed once the settle delay passes
    Draining {
        previous: String,
        target: String,
        ready_at: DateTime<Utc>,
        /// The previous revision delete went through; only its pods remain
        revision_deleted: bool,
    },
    Done {
        revision: Option<String>,
    },
    Failed {
        reason: String,
    },
}

impl RolloverState {
    pub fn from_status(status: &TrafficStatStatus) -> Self {
        match status.phase {
            RolloverPhase::Idle => RolloverState::Idle,
            RolloverPhase::AwaitingReady => {
                match (status.target_revision.clone(), status.phase_started_at) {
                    (Some(target), Some(since)) => RolloverState::AwaitingReady {
                        previous: status.previous_revision.clone(),
                        target,
                        since,
                    },
                    _ => {
                        warn!("AwaitingReady status without target revision or start time, restarting");
                        RolloverState::Idle
                    }
                }
            }
            RolloverPhase::Draining => match (
                status.previous_revision.clone(),
                status.target_revision.clone(),
                status.ready_at,
            ) {
                (Some(previous), Some(target), Some(ready_at)) => RolloverState::Draining {
                    previous,
                    target,
                    ready_at,
                    revision_deleted: status.previous_revision_deleted,
                },
                _ => {
                    warn!("Draining status without revisions or ready time, restarting");
                    RolloverState::Idle
                }
            },
            RolloverPhase::Done => RolloverState::Done {
                revision: status.active_revision.clone(),
            },
            RolloverPhase::Failed => RolloverState::Failed {
                reason: status
                    .message
                    .clone()
                    .unwrap_or_else(|| "rollover failed".to_string()),
            },
        }
    }

    pub fn phase(&self) -> RolloverPhase {
        match self {
            RolloverState::Idle => RolloverPhase::Idle,
            RolloverState::AwaitingReady { .. } => RolloverPhase::AwaitingReady,
            RolloverState::Draining { .. } => RolloverPhase::Draining,
            RolloverState::Done { .. } => RolloverPhase::Done,
            RolloverState::Failed { .. } => RolloverPhase::Failed,
        }
    }

    /// A rollover has been published and not yet finished
    pub fn in_flight(&self) -> bool {
        matches!(
            self,
            RolloverState::AwaitingReady { .. } | RolloverState::Draining { .. }
        )
    }

    /// Write this state onto `status`, leaving unrelated fields alone
    pub fn apply_to(&self, status: &mut TrafficStatStatus) {
        status.phase = self.phase();
        match self {
            RolloverState::Idle => {
                status.previous_revision = None;
                status.target_revision = None;
                status.phase_started_at = None;
                status.ready_at = None;
                status.previous_revision_deleted = false;
                status.message = None;
            }
            RolloverState::AwaitingReady {
                previous,
                target,
                since,
            } => {
                status.previous_revision = previous.clone();
                status.target_revision = Some(target.clone());
                status.phase_started_at = Some(*since);
                status.ready_at = None;
                status.previous_revision_deleted = false;
                status.message = None;
            }
            RolloverState::Draining {
                previous,
                target,
                ready_at,
                revision_deleted,
            } => {
                status.previous_revision = Some(previous.clone());
                status.target_revision = Some(target.clone());
                status.phase_started_at = Some(*ready_at);
                status.ready_at = Some(*ready_at);
                status.previous_revision_deleted = *revision_deleted;
                status.message = None;
            }
            RolloverState::Done { revision } => {
                status.active_revision = revision.clone();
                status.previous_revision = None;
                status.target_revision = None;
                status.phase_started_at = None;
                status.ready_at = None;
                status.previous_revision_deleted = false;
                status.message = None;
            }
            RolloverState::Failed { reason } => {
                status.message = Some(reason.clone());
            }
        }
    }
}
