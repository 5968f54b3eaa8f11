//! Shared test fixtures

use crate::cluster::InMemoryCluster;
use crate::resources::{KnativeService, TrafficStat, TrafficStatSpec};
use crate::rollover::RolloverConfig;
use crate::retry::BackoffPolicy;
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;

pub const NAMESPACE: &str = "default";
pub const SERVICE: &str = "hello";

/// Knative service running `target` concurrency and `cpu` limit on `revision`
pub fn service(target: &str, cpu: &str, revision: &str) -> KnativeService {
    serde_json::from_value(json!({
        "apiVersion": "serving.knative.dev/v1",
        "kind": "Service",
        "metadata": {
            "name": SERVICE,
            "namespace": NAMESPACE,
            "labels": { "app": SERVICE }
        },
        "spec": {
            "template": {
                "metadata": { "annotations": { "autoscaling.knative.dev/target": target } },
                "spec": {
                    "containers": [{
                        "name": SERVICE,
                        "image": "example/test-app:v5",
                        "resources": { "limits": { "cpu": cpu, "memory": "128Mi" } }
                    }]
                }
            },
            "traffic": [{ "latestRevision": true, "percent": 100 }]
        },
        "status": {
            "latestCreatedRevisionName": revision,
            "latestReadyRevisionName": revision
        }
    }))
    .expect("valid service fixture")
}

/// CPU catalog with the two profiles used throughout the tests
pub fn cpu_catalog() -> BTreeMap<String, String> {
    [
        ("resources-intensive-type", "cpu"),
        ("required-resources", "128"),
        ("100", "50"),
        ("200", "100"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

pub fn scaling_request(name: &str, traffic: &str) -> TrafficStat {
    let mut request = TrafficStat::new(
        name,
        TrafficStatSpec {
            service_name: SERVICE.to_string(),
            scaling_input_traffic: traffic.to_string(),
        },
    );
    request.metadata.namespace = Some(NAMESPACE.to_string());
    request.metadata.generation = Some(1);
    request
}

/// Config that never sleeps for long
pub fn fast_config() -> RolloverConfig {
    RolloverConfig {
        poll_interval: Duration::from_secs(1),
        settle_delay: Duration::from_secs(5),
        readiness_timeout: Duration::from_secs(300),
        conflict_retries: 3,
        backoff: BackoffPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        },
        missing_dependency_requeue: Duration::from_secs(30),
    }
}

/// Cluster holding the service at `hello-00001` (target 10, 500m) and its pods
pub fn cluster_with_service() -> InMemoryCluster {
    let cluster = InMemoryCluster::new();
    cluster.insert_service(service("10", "500m", "hello-00001"));
    cluster.insert_revision(NAMESPACE, "hello-00001", true);
    cluster.insert_catalog(NAMESPACE, SERVICE, cpu_catalog());
    for pod in ["hello-00001-deployment-5d8f-abcde", "hello-00001-deployment-5d8f-fghij"] {
        cluster.insert_pod(NAMESPACE, pod, "Running");
    }
    cluster.insert_pod(NAMESPACE, "other-00001-deployment-77c9-zzzzz", "Running");
    cluster
}
