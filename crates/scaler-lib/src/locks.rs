//! Per-service mutual exclusion
//!
//! Two reconciliations for different `TrafficStat` objects can target the same
//! Knative service. Only one of them may drive that service at a time.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct ServiceLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl ServiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for a service within a namespace
    pub fn key(namespace: &str, service: &str) -> String {
        format!("{}/{}", namespace, service)
    }

    /// Take the lock without waiting; `None` when another holder has it
    pub fn try_lock(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = self
            .inner
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.try_lock_owned().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
