//! kube-rs backed implementation of the orchestration API

use super::{async_trait, ApiError, ClusterApi};
use crate::models::{PodSummary, RevisionReadiness};
use crate::resources::{KnativeRevision, KnativeService, TrafficStat, TrafficStatStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Pod};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

/// Orchestration API backed by a shared kube client.
///
/// The client is built once at startup and injected here.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
    field_manager: String,
}

impl KubeClusterApi {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map a kube error onto the scaler's error classes
pub(crate) fn classify(err: kube::Error, kind: &'static str, name: &str) -> ApiError {
    match err {
        kube::Error::Api(response) => match response.code {
            404 => ApiError::not_found(kind, name),
            409 => ApiError::Conflict {
                kind,
                name: name.to_string(),
                message: response.message,
            },
            400 | 422 => ApiError::Invalid {
                kind,
                name: name.to_string(),
                message: response.message,
            },
            429 | 500..=599 => ApiError::Transient(format!(
                "{} {} on {} '{}': {}",
                response.code, response.reason, kind, name, response.message
            )),
            code => ApiError::Other(format!(
                "{} {} on {} '{}': {}",
                code, response.reason, kind, name, response.message
            )),
        },
        kube::Error::HyperError(e) => ApiError::Transient(format!("{} '{}': {}", kind, name, e)),
        kube::Error::Service(e) => ApiError::Transient(format!("{} '{}': {}", kind, name, e)),
        other => ApiError::Other(format!("{} '{}': {}", kind, name, other)),
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, ApiError> {
    value.ok_or_else(|| ApiError::Invalid {
        kind: "Service",
        name: String::new(),
        message: format!("descriptor has no {}", field),
    })
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get_scaling_request(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TrafficStat, ApiError> {
        self.namespaced::<TrafficStat>(namespace)
            .get(name)
            .await
            .map_err(|e| classify(e, "TrafficStat", name))
    }

    async fn patch_scaling_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TrafficStatStatus,
    ) -> Result<(), ApiError> {
        let patch = json!({ "status": status });
        self.namespaced::<TrafficStat>(namespace)
            .patch_status(name, &PatchParams::apply(&self.field_manager), &Patch::Merge(&patch))
            .await
            .map_err(|e| classify(e, "TrafficStat", name))?;
        Ok(())
    }

    async fn get_profile_catalog(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<BTreeMap<String, String>, ApiError> {
        let config_map = self
            .namespaced::<ConfigMap>(namespace)
            .get(service)
            .await
            .map_err(|e| classify(e, "ConfigMap", service))?;
        Ok(config_map.data.unwrap_or_default())
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<KnativeService, ApiError> {
        self.namespaced::<KnativeService>(namespace)
            .get(name)
            .await
            .map_err(|e| classify(e, "Service", name))
    }

    async fn update_service(&self, service: &KnativeService) -> Result<KnativeService, ApiError> {
        let name = required(service.metadata.name.as_deref(), "metadata.name")?;
        let namespace = required(service.metadata.namespace.as_deref(), "metadata.namespace")?;

        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..Default::default()
        };
        self.namespaced::<KnativeService>(namespace)
            .replace(name, &params, service)
            .await
            .map_err(|e| classify(e, "Service", name))
    }

    async fn get_revision(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<RevisionReadiness, ApiError> {
        let revision = self
            .namespaced::<KnativeRevision>(namespace)
            .get(name)
            .await
            .map_err(|e| classify(e, "Revision", name))?;
        Ok(revision.readiness())
    }

    async fn delete_revision(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        self.namespaced::<KnativeRevision>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| classify(e, "Revision", name))?;
        debug!(namespace = %namespace, revision = %name, "Revision delete accepted");
        Ok(())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>, ApiError> {
        let pods = self
            .namespaced::<Pod>(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| classify(e, "Pod", namespace))?;

        Ok(pods
            .items
            .iter()
            .map(|pod| PodSummary {
                name: pod.name_any(),
                phase: pod.status.as_ref().and_then(|s| s.phase.clone()),
            })
            .collect())
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: u32,
    ) -> Result<(), ApiError> {
        let params = DeleteParams {
            grace_period_seconds: Some(grace_period_seconds),
            ..Default::default()
        };
        self.namespaced::<Pod>(namespace)
            .delete(name, &params)
            .await
            .map_err(|e| classify(e, "Pod", name))?;
        Ok(())
    }
}
