//! Typed Knative Serving resources
//!
//! Only the parts of `serving.knative.dev/v1` the scaler reads or writes are
//! modelled; the revision template reuses the core `PodSpec`.

use crate::models::RevisionReadiness;
use k8s_openapi::api::core::v1::{Container, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-revision soft concurrency target annotation
pub const TARGET_ANNOTATION: &str = "autoscaling.knative.dev/target";

/// Service annotation naming the TrafficStat that published the latest profile
pub const ROLLOVER_OWNER_ANNOTATION: &str =
    "hybridscaling.knativescaling.dcn.ssu.ac.kr/rollover-owner";

/// Condition type signalling overall readiness
pub const READY_CONDITION: &str = "Ready";

#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[kube(
    group = "serving.knative.dev",
    version = "v1",
    kind = "Service",
    root = "KnativeService",
    status = "KnativeServiceStatus",
    namespaced,
    derive = "PartialEq",
    schema = "disabled"
)]
pub struct KnativeServiceSpec {
    pub template: RevisionTemplateSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic: Option<Vec<serde_json::Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct RevisionTemplateSpec {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: RevisionSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSpec {
    #[serde(flatten)]
    pub pod: PodSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_concurrency: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnativeServiceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_created_revision_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_ready_revision_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<KnativeCondition>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnativeCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[kube(
    group = "serving.knative.dev",
    version = "v1",
    kind = "Revision",
    root = "KnativeRevision",
    status = "KnativeRevisionStatus",
    namespaced,
    derive = "PartialEq",
    schema = "disabled"
)]
pub struct KnativeRevisionSpec {
    #[serde(flatten)]
    pub template: RevisionSpec,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnativeRevisionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<KnativeCondition>,
}

impl KnativeService {
    /// Annotations of the revision template
    pub fn template_annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.spec.template.metadata.annotations.as_ref()
    }

    /// First container of the revision template
    pub fn primary_container(&self) -> Option<&Container> {
        self.spec.template.spec.pod.containers.first()
    }

    /// TrafficStat whose rollover last touched this service
    pub fn rollover_owner(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(ROLLOVER_OWNER_ANNOTATION))
            .map(String::as_str)
    }

    pub fn latest_ready_revision(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.latest_ready_revision_name.as_deref())
    }

    pub fn latest_created_revision(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.latest_created_revision_name.as_deref())
    }
}

impl KnativeRevision {
    /// Readiness from the `Ready` condition; a missing condition is not ready
    pub fn readiness(&self) -> RevisionReadiness {
        let condition = self
            .status
            .as_ref()
            .and_then(|s| s.conditions.iter().find(|c| c.type_ == READY_CONDITION));

        match condition {
            Some(c) => RevisionReadiness {
                ready: c.status == "True",
                reason: c.reason.clone().or_else(|| c.message.clone()),
            },
            None => RevisionReadiness {
                ready: false,
                reason: Some("Ready condition not reported yet".to_string()),
            },
        }
    }
}
