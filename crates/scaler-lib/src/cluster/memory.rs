//! In-memory orchestration API
//!
//! Behaves like a tiny Knative control plane: updates are guarded by a
//! resource version, publishing a service creates the next revision, and
//! every mutating call is recorded so tests can assert on it.

use super::{async_trait, ApiError, ClusterApi};
use crate::models::{PodSummary, RevisionReadiness};
use crate::resources::{KnativeService, KnativeServiceStatus, TrafficStat, TrafficStatStatus};
use crate::rollover::next_revision_name;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Default)]
struct State {
    requests: BTreeMap<Key, TrafficStat>,
    catalogs: BTreeMap<Key, BTreeMap<String, String>>,
    services: BTreeMap<Key, KnativeService>,
    revisions: BTreeMap<Key, RevisionReadiness>,
    pods: BTreeMap<Key, PodSummary>,
    next_resource_version: u64,
    ready_on_publish: bool,
    hide_new_revision: bool,
    pending_conflicts: u32,
    pending_failures: HashMap<&'static str, u32>,
    service_updates: Vec<KnativeService>,
    status_patches: Vec<TrafficStatStatus>,
    revision_deletes: Vec<String>,
    pod_deletes: Vec<(String, u32)>,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }

    fn take_failure(&mut self, operation: &'static str) -> Result<(), ApiError> {
        match self.pending_failures.get_mut(operation) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(ApiError::Transient(format!("injected failure in {}", operation)))
            }
            _ => Ok(()),
        }
    }
}

/// Deterministic in-memory cluster
#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<State>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_scaling_request(&self, request: TrafficStat) {
        let namespace = request.metadata.namespace.clone().unwrap_or_default();
        let name = request.metadata.name.clone().unwrap_or_default();
        self.lock().requests.insert(key(&namespace, &name), request);
    }

    pub fn insert_catalog(&self, namespace: &str, service: &str, data: BTreeMap<String, String>) {
        self.lock().catalogs.insert(key(namespace, service), data);
    }

    /// Store a service, assigning a fresh resource version
    pub fn insert_service(&self, mut service: KnativeService) {
        let mut state = self.lock();
        service.metadata.resource_version = Some(state.bump_version());
        let namespace = service.metadata.namespace.clone().unwrap_or_default();
        let name = service.metadata.name.clone().unwrap_or_default();
        state.services.insert(key(&namespace, &name), service);
    }

    pub fn insert_revision(&self, namespace: &str, name: &str, ready: bool) {
        self.lock().revisions.insert(
            key(namespace, name),
            RevisionReadiness {
                ready,
                reason: None,
            },
        );
    }

    /// Mark a revision ready, promoting it on any service that created it
    pub fn set_revision_ready(&self, namespace: &str, name: &str) {
        let mut state = self.lock();
        state.revisions.insert(
            key(namespace, name),
            RevisionReadiness {
                ready: true,
                reason: None,
            },
        );
        for ((ns, _), service) in state.services.iter_mut() {
            if ns != namespace {
                continue;
            }
            if let Some(status) = service.status.as_mut() {
                if status.latest_created_revision_name.as_deref() == Some(name) {
                    status.latest_ready_revision_name = Some(name.to_string());
                }
            }
        }
    }

    pub fn insert_pod(&self, namespace: &str, name: &str, phase: &str) {
        self.lock().pods.insert(
            key(namespace, name),
            PodSummary {
                name: name.to_string(),
                phase: Some(phase.to_string()),
            },
        );
    }

    /// New revisions become ready as soon as they are published
    pub fn set_ready_on_publish(&self, ready: bool) {
        self.lock().ready_on_publish = ready;
    }

    /// Update responses omit the new revision name
    pub fn set_hide_new_revision(&self, hide: bool) {
        self.lock().hide_new_revision = hide;
    }

    /// The next `count` service updates lose a race with another writer
    pub fn inject_conflicts(&self, count: u32) {
        self.lock().pending_conflicts = count;
    }

    /// The next `count` calls of `operation` fail transiently
    pub fn inject_transient_failures(&self, operation: &'static str, count: u32) {
        self.lock().pending_failures.insert(operation, count);
    }

    pub fn service(&self, namespace: &str, name: &str) -> Option<KnativeService> {
        self.lock().services.get(&key(namespace, name)).cloned()
    }

    pub fn scaling_status(&self, namespace: &str, name: &str) -> Option<TrafficStatStatus> {
        self.lock()
            .requests
            .get(&key(namespace, name))
            .and_then(|r| r.status.clone())
    }

    pub fn has_revision(&self, namespace: &str, name: &str) -> bool {
        self.lock().revisions.contains_key(&key(namespace, name))
    }

    pub fn pod_names(&self, namespace: &str) -> Vec<String> {
        self.lock()
            .pods
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn service_updates(&self) -> Vec<KnativeService> {
        self.lock().service_updates.clone()
    }

    pub fn status_patches(&self) -> Vec<TrafficStatStatus> {
        self.lock().status_patches.clone()
    }

    pub fn revision_deletes(&self) -> Vec<String> {
        self.lock().revision_deletes.clone()
    }

    pub fn pod_deletes(&self) -> Vec<(String, u32)> {
        self.lock().pod_deletes.clone()
    }
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn get_scaling_request(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<TrafficStat, ApiError> {
        let mut state = self.lock();
        state.take_failure("get_scaling_request")?;
        state
            .requests
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ApiError::not_found("TrafficStat", name))
    }

    async fn patch_scaling_status(
        &self,
        namespace: &str,
        name: &str,
        status: &TrafficStatStatus,
    ) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.take_failure("patch_scaling_status")?;
        let request = state
            .requests
            .get_mut(&key(namespace, name))
            .ok_or_else(|| ApiError::not_found("TrafficStat", name))?;
        request.status = Some(status.clone());
        state.status_patches.push(status.clone());
        Ok(())
    }

    async fn get_profile_catalog(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<BTreeMap<String, String>, ApiError> {
        let mut state = self.lock();
        state.take_failure("get_profile_catalog")?;
        state
            .catalogs
            .get(&key(namespace, service))
            .cloned()
            .ok_or_else(|| ApiError::not_found("ConfigMap", service))
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<KnativeService, ApiError> {
        let mut state = self.lock();
        state.take_failure("get_service")?;
        state
            .services
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ApiError::not_found("Service", name))
    }

    async fn update_service(&self, service: &KnativeService) -> Result<KnativeService, ApiError> {
        let mut state = self.lock();
        state.take_failure("update_service")?;

        let namespace = service.metadata.namespace.clone().unwrap_or_default();
        let name = service.metadata.name.clone().unwrap_or_default();
        let service_key = key(&namespace, &name);

        let stored = state
            .services
            .get(&service_key)
            .cloned()
            .ok_or_else(|| ApiError::not_found("Service", name.as_str()))?;

        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            // Another writer got there first
            let version = state.bump_version();
            if let Some(existing) = state.services.get_mut(&service_key) {
                existing.metadata.resource_version = Some(version);
            }
            return Err(ApiError::Conflict {
                kind: "Service",
                name,
                message: "the object has been modified".to_string(),
            });
        }

        if service.metadata.resource_version != stored.metadata.resource_version {
            return Err(ApiError::Conflict {
                kind: "Service",
                name,
                message: "stale resourceVersion".to_string(),
            });
        }

        let previous_status = stored.status.clone().unwrap_or_default();
        let revision = next_revision_name(&name, previous_status.latest_created_revision_name.as_deref());
        let ready = state.ready_on_publish;

        let mut updated = service.clone();
        updated.metadata.resource_version = Some(state.bump_version());
        updated.status = Some(KnativeServiceStatus {
            latest_created_revision_name: Some(revision.clone()),
            latest_ready_revision_name: if ready {
                Some(revision.clone())
            } else {
                previous_status.latest_ready_revision_name.clone()
            },
            ..previous_status.clone()
        });

        state.revisions.insert(
            key(&namespace, &revision),
            RevisionReadiness {
                ready,
                reason: None,
            },
        );
        state.services.insert(service_key, updated.clone());
        state.service_updates.push(service.clone());

        if state.hide_new_revision {
            updated.status = Some(previous_status);
        }
        Ok(updated)
    }

    async fn get_revision(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<RevisionReadiness, ApiError> {
        let mut state = self.lock();
        state.take_failure("get_revision")?;
        state
            .revisions
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ApiError::not_found("Revision", name))
    }

    async fn delete_revision(&self, namespace: &str, name: &str) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.take_failure("delete_revision")?;
        state.revision_deletes.push(name.to_string());
        state
            .revisions
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found("Revision", name))
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSummary>, ApiError> {
        let mut state = self.lock();
        state.take_failure("list_pods")?;
        Ok(state
            .pods
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_seconds: u32,
    ) -> Result<(), ApiError> {
        let mut state = self.lock();
        state.take_failure("delete_pod")?;
        state.pod_deletes.push((name.to_string(), grace_period_seconds));
        state
            .pods
            .remove(&key(namespace, name))
            .map(|_| ())
            .ok_or_else(|| ApiError::not_found("Pod", name))
    }
}
