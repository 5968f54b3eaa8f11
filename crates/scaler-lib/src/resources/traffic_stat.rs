//! `TrafficStat` custom resource
//!
//! Users declare the traffic a Knative service should be sized for; the
//! controller records the chosen profile and rollover progress in status.

use crate::models::ScalingRequest;
use crate::optimizer::ChosenProfile;
use crate::quantity::ResourceType;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const API_GROUP: &str = "hybridscaling.knativescaling.dcn.ssu.ac.kr";

#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[kube(
    group = "hybridscaling.knativescaling.dcn.ssu.ac.kr",
    version = "v1",
    kind = "TrafficStat",
    plural = "trafficstats",
    shortname = "ts",
    status = "TrafficStatStatus",
    namespaced,
    derive = "PartialEq",
    printcolumn = r#"{"name":"Service","type":"string","jsonPath":".spec.servicename"}"#,
    printcolumn = r#"{"name":"Traffic","type":"string","jsonPath":".spec.scalinginputtraffic"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Revision","type":"string","jsonPath":".status.activeRevision"}"#
)]
pub struct TrafficStatSpec {
    /// Knative service to size
    #[serde(default, rename = "servicename")]
    pub service_name: String,
    /// Expected concurrent requests, as a decimal string
    #[serde(default, rename = "scalinginputtraffic")]
    pub scaling_input_traffic: String,
}

/// Rollover phase recorded on the resource
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
pub enum RolloverPhase {
    #[default]
    Idle,
    AwaitingReady,
    Draining,
    Done,
    Failed,
}

impl RolloverPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RolloverPhase::Idle => "Idle",
            RolloverPhase::AwaitingReady => "AwaitingReady",
            RolloverPhase::Draining => "Draining",
            RolloverPhase::Done => "Done",
            RolloverPhase::Failed => "Failed",
        }
    }
}

/// Chosen profile as shown on the resource
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChosenProfileStatus {
    pub resource_type: ResourceType,
    pub resource_level: f64,
    pub concurrency_target: f64,
    pub pod_count: u64,
    pub total_cost: f64,
}

impl ChosenProfileStatus {
    pub fn new(chosen: &ChosenProfile, resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            resource_level: chosen.profile.resource_level,
            concurrency_target: chosen.profile.concurrency_target,
            pod_count: chosen.pod_count,
            total_cost: chosen.total_cost,
        }
    }
}

/// Observed state. `None` fields serialize as `null` so a merge patch clears them.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficStatStatus {
    #[serde(default)]
    pub phase: RolloverPhase,
    #[serde(default)]
    pub chosen_profile: Option<ChosenProfileStatus>,
    /// Revision currently serving the chosen profile
    #[serde(default)]
    pub active_revision: Option<String>,
    /// Revision being decommissioned by the current rollover
    #[serde(default)]
    pub previous_revision: Option<String>,
    /// Revision published by the current rollover
    #[serde(default)]
    pub target_revision: Option<String>,
    #[serde(default)]
    pub phase_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ready_at: Option<DateTime<Utc>>,
    /// Set once the previous revision is deleted while draining
    #[serde(default)]
    pub previous_revision_deleted: bool,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("spec.servicename is empty")]
    MissingServiceName,
    #[error("spec.scalinginputtraffic '{0}' is not a number greater than zero")]
    InvalidTraffic(String),
}

impl TrafficStat {
    /// Typed scaling request carried by this resource
    pub fn scaling_request(&self) -> Result<ScalingRequest, RequestError> {
        let service_name = self.spec.service_name.trim();
        if service_name.is_empty() {
            return Err(RequestError::MissingServiceName);
        }

        let raw = self.spec.scaling_input_traffic.trim();
        let traffic_volume: f64 = raw
            .parse()
            .map_err(|_| RequestError::InvalidTraffic(raw.to_string()))?;
        if !traffic_volume.is_finite() || traffic_volume <= 0.0 {
            return Err(RequestError::InvalidTraffic(raw.to_string()));
        }

        Ok(ScalingRequest {
            service_name: service_name.to_string(),
            traffic_volume,
        })
    }

    /// Current status, or the default when none has been written yet
    pub fn current_status(&self) -> TrafficStatStatus {
        self.status.clone().unwrap_or_default()
    }
}
