//! Tests for the reconciler driver

use super::*;
use crate::cluster::InMemoryCluster;
use crate::fixtures::{self, NAMESPACE, SERVICE};
use crate::health::ComponentStatus;
use crate::resources::RolloverPhase;
use chrono::TimeZone;

const REQUEST: &str = "hello-traffic";

fn setup(traffic: &str) -> (Arc<InMemoryCluster>, Context) {
    let cluster = Arc::new(fixtures::cluster_with_service());
    cluster.insert_scaling_request(fixtures::scaling_request(REQUEST, traffic));
    let ctx = Context::new(
        cluster.clone(),
        fixtures::fast_config(),
        HealthRegistry::new(),
    );
    (cluster, ctx)
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn at(seconds: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::seconds(seconds)
}

async fn reconcile(ctx: &Context, now: DateTime<Utc>) -> ReconcileOutcome {
    reconcile_request(ctx, NAMESPACE, REQUEST, now).await.unwrap()
}

fn status(cluster: &InMemoryCluster) -> TrafficStatStatus {
    cluster.scaling_status(NAMESPACE, REQUEST).unwrap()
}

#[tokio::test]
async fn test_full_rollover_with_requeues() {
    let (cluster, ctx) = setup("250");
    cluster.set_ready_on_publish(true);

    let outcome = reconcile(&ctx, t0()).await;
    assert_eq!(
        outcome,
        ReconcileOutcome::InProgress {
            retry_after: Duration::from_secs(5)
        }
    );
    assert_eq!(cluster.service_updates().len(), 1);

    let current = status(&cluster);
    assert_eq!(current.phase, RolloverPhase::Draining);
    assert_eq!(current.previous_revision.as_deref(), Some("hello-00001"));
    assert_eq!(current.target_revision.as_deref(), Some("hello-00002"));
    let chosen = current.chosen_profile.unwrap();
    assert_eq!(chosen.resource_level, 100.0);
    assert_eq!(chosen.concurrency_target, 50.0);
    assert_eq!(chosen.pod_count, 5);
    assert_eq!(chosen.total_cost, 500.0);
    assert!(cluster.revision_deletes().is_empty());

    let outcome = reconcile(&ctx, at(5)).await;
    assert_eq!(outcome, ReconcileOutcome::Completed);
    assert_eq!(cluster.revision_deletes(), vec!["hello-00001".to_string()]);
    assert_eq!(cluster.pod_deletes().len(), 2);
    assert!(!cluster.has_revision(NAMESPACE, "hello-00001"));

    let done = status(&cluster);
    assert_eq!(done.phase, RolloverPhase::Done);
    assert_eq!(done.active_revision.as_deref(), Some("hello-00002"));
    assert_eq!(done.previous_revision, None);
    assert_eq!(done.observed_generation, Some(1));
}

#[tokio::test]
async fn test_second_reconcile_writes_nothing() {
    let (cluster, ctx) = setup("250");
    cluster.set_ready_on_publish(true);
    reconcile(&ctx, t0()).await;
    reconcile(&ctx, at(5)).await;

    let updates = cluster.service_updates().len();
    let patches = cluster.status_patches().len();

    let outcome = reconcile(&ctx, at(10)).await;
    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(cluster.service_updates().len(), updates);
    assert_eq!(cluster.status_patches().len(), patches);
    assert_eq!(cluster.revision_deletes().len(), 1);
}

#[tokio::test]
async fn test_matching_profile_is_left_alone() {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.insert_service(fixtures::service("50", "100m", "hello-00003"));
    cluster.insert_catalog(NAMESPACE, SERVICE, fixtures::cpu_catalog());
    cluster.insert_scaling_request(fixtures::scaling_request(REQUEST, "100"));
    let ctx = Context::new(cluster.clone(), fixtures::fast_config(), HealthRegistry::new());

    // 100 requests tie at cost 200; the lower resource level wins
    assert_eq!(reconcile(&ctx, t0()).await, ReconcileOutcome::Unchanged);
    assert!(cluster.service_updates().is_empty());
    assert_eq!(cluster.status_patches().len(), 1);
    assert_eq!(status(&cluster).active_revision.as_deref(), Some("hello-00003"));

    assert_eq!(reconcile(&ctx, at(1)).await, ReconcileOutcome::Unchanged);
    assert_eq!(cluster.status_patches().len(), 1);
}

#[tokio::test]
async fn test_missing_catalog_skips_without_writes() {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.insert_service(fixtures::service("10", "500m", "hello-00001"));
    cluster.insert_scaling_request(fixtures::scaling_request(REQUEST, "250"));
    let ctx = Context::new(cluster.clone(), fixtures::fast_config(), HealthRegistry::new());

    let outcome = reconcile(&ctx, t0()).await;
    assert!(matches!(
        outcome,
        ReconcileOutcome::Skipped { retry_after: Some(d), .. } if d == Duration::from_secs(30)
    ));
    assert!(cluster.service_updates().is_empty());
    assert!(cluster.status_patches().is_empty());
}

#[tokio::test]
async fn test_all_malformed_catalog_skips_without_writes() {
    let (cluster, ctx) = setup("250");
    let catalog = [
        ("resources-intensive-type", "cpu"),
        ("required-resources", "128"),
        ("abc", "50"),
        ("100", "-3"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    cluster.insert_catalog(NAMESPACE, SERVICE, catalog);

    let outcome = reconcile(&ctx, t0()).await;
    match outcome {
        ReconcileOutcome::Skipped { reason, .. } => assert!(reason.contains("no eligible profile")),
        other => panic!("expected skip, got {:?}", other),
    }
    assert!(cluster.service_updates().is_empty());
    assert!(cluster.status_patches().is_empty());
}

#[tokio::test]
async fn test_missing_service_skips() {
    let cluster = Arc::new(InMemoryCluster::new());
    cluster.insert_catalog(NAMESPACE, SERVICE, fixtures::cpu_catalog());
    cluster.insert_scaling_request(fixtures::scaling_request(REQUEST, "250"));
    let ctx = Context::new(cluster.clone(), fixtures::fast_config(), HealthRegistry::new());

    assert!(matches!(
        reconcile(&ctx, t0()).await,
        ReconcileOutcome::Skipped { .. }
    ));
    assert!(cluster.status_patches().is_empty());
}

#[tokio::test]
async fn test_malformed_traffic_skips() {
    let (cluster, ctx) = setup("a lot");

    let outcome = reconcile(&ctx, t0()).await;
    assert!(matches!(
        outcome,
        ReconcileOutcome::Skipped {
            retry_after: None,
            ..
        }
    ));
    assert!(cluster.service_updates().is_empty());
    assert!(cluster.status_patches().is_empty());
}

#[tokio::test]
async fn test_deleted_request_is_skipped() {
    let cluster = Arc::new(InMemoryCluster::new());
    let ctx = Context::new(cluster.clone(), fixtures::fast_config(), HealthRegistry::new());

    let outcome = reconcile(&ctx, t0()).await;
    assert_eq!(outcome.action(), Action::await_change());
    assert_eq!(outcome.label(), "skipped");
}

#[tokio::test]
async fn test_busy_service_is_deferred() {
    let (cluster, ctx) = setup("250");
    let _held = ctx
        .locks
        .try_lock(&ServiceLocks::key(NAMESPACE, SERVICE))
        .unwrap();

    let outcome = reconcile(&ctx, t0()).await;
    assert_eq!(
        outcome,
        ReconcileOutcome::Deferred {
            retry_after: Duration::from_secs(1)
        }
    );
    assert!(cluster.service_updates().is_empty());
}

#[tokio::test]
async fn test_conflict_exhaustion_fails_until_spec_changes() {
    let (cluster, ctx) = setup("250");
    cluster.inject_conflicts(10);

    let outcome = reconcile(&ctx, t0()).await;
    assert!(matches!(outcome, ReconcileOutcome::Failed { .. }));
    assert!(cluster.service_updates().is_empty());
    let failed = status(&cluster);
    assert_eq!(failed.phase, RolloverPhase::Failed);
    assert!(failed.message.unwrap().contains("conflicting updates"));

    let patches = cluster.status_patches().len();
    assert!(matches!(
        reconcile(&ctx, at(1)).await,
        ReconcileOutcome::Failed { .. }
    ));
    assert_eq!(cluster.status_patches().len(), patches);

    // A spec edit bumps the generation and retries
    cluster.inject_conflicts(0);
    let mut request = cluster.get_scaling_request(NAMESPACE, REQUEST).await.unwrap();
    request.metadata.generation = Some(2);
    cluster.insert_scaling_request(request);

    assert!(matches!(
        reconcile(&ctx, at(2)).await,
        ReconcileOutcome::InProgress { .. }
    ));
    assert_eq!(cluster.service_updates().len(), 1);
}

#[tokio::test]
async fn test_readiness_timeout_fails_without_drain() {
    let (cluster, ctx) = setup("250");

    let outcome = reconcile(&ctx, t0()).await;
    assert_eq!(
        outcome,
        ReconcileOutcome::InProgress {
            retry_after: Duration::from_secs(1)
        }
    );
    assert_eq!(status(&cluster).phase, RolloverPhase::AwaitingReady);

    assert!(matches!(
        reconcile(&ctx, at(60)).await,
        ReconcileOutcome::InProgress { .. }
    ));

    let outcome = reconcile(&ctx, at(301)).await;
    assert!(matches!(outcome, ReconcileOutcome::Failed { .. }));
    assert_eq!(status(&cluster).phase, RolloverPhase::Failed);
    assert!(cluster.revision_deletes().is_empty());
    assert!(cluster.pod_deletes().is_empty());
    assert!(cluster.has_revision(NAMESPACE, "hello-00001"));
}

#[tokio::test]
async fn test_transient_exhaustion_is_returned_and_recorded() {
    let (cluster, ctx) = setup("250");
    cluster.inject_transient_failures("get_service", 10);

    let err = reconcile_request(&ctx, NAMESPACE, REQUEST, t0())
        .await
        .unwrap_err();
    assert!(err.is_transient());

    let message = status(&cluster).message.unwrap();
    assert!(message.contains("injected failure"));

    let health = ctx.health.health().await;
    assert_eq!(
        health.components[components::CLUSTER_API].status,
        ComponentStatus::Degraded
    );
    assert!(cluster.service_updates().is_empty());
}

#[tokio::test]
async fn test_second_request_waits_for_owner_rollover() {
    let (cluster, ctx) = setup("250");
    let mut catalog = fixtures::cpu_catalog();
    catalog.insert("1000".to_string(), "5000".to_string());
    cluster.insert_catalog(NAMESPACE, SERVICE, catalog);
    cluster.insert_scaling_request(fixtures::scaling_request("other-traffic", "100000"));

    assert_eq!(
        reconcile(&ctx, t0()).await,
        ReconcileOutcome::InProgress {
            retry_after: Duration::from_secs(1)
        }
    );
    let stored = cluster.service(NAMESPACE, SERVICE).unwrap();
    assert_eq!(stored.rollover_owner(), Some(REQUEST));

    // The lock is free between requeues; the owner annotation holds the service
    let outcome = reconcile_request(&ctx, NAMESPACE, "other-traffic", at(1))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Deferred {
            retry_after: Duration::from_secs(1)
        }
    );
    assert_eq!(cluster.service_updates().len(), 1);
    assert_eq!(cluster.scaling_status(NAMESPACE, "other-traffic"), None);

    cluster.set_revision_ready(NAMESPACE, "hello-00002");
    assert_eq!(
        reconcile(&ctx, at(2)).await,
        ReconcileOutcome::InProgress {
            retry_after: Duration::from_secs(5)
        }
    );
    assert_eq!(
        reconcile_request(&ctx, NAMESPACE, "other-traffic", at(3))
            .await
            .unwrap(),
        ReconcileOutcome::Deferred {
            retry_after: Duration::from_secs(1)
        }
    );
    assert_eq!(reconcile(&ctx, at(7)).await, ReconcileOutcome::Completed);
    assert_eq!(status(&cluster).active_revision.as_deref(), Some("hello-00002"));

    // 1000m x 20 pods beats every smaller level at this volume
    let outcome = reconcile_request(&ctx, NAMESPACE, "other-traffic", at(8))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::InProgress {
            retry_after: Duration::from_secs(1)
        }
    );
    assert_eq!(cluster.service_updates().len(), 2);

    let other = cluster.scaling_status(NAMESPACE, "other-traffic").unwrap();
    assert_eq!(other.phase, RolloverPhase::AwaitingReady);
    assert_eq!(other.previous_revision.as_deref(), Some("hello-00002"));
    assert_eq!(other.target_revision.as_deref(), Some("hello-00003"));
    assert_eq!(other.chosen_profile.unwrap().pod_count, 20);

    let stored = cluster.service(NAMESPACE, SERVICE).unwrap();
    assert_eq!(stored.rollover_owner(), Some("other-traffic"));
}

#[tokio::test]
async fn test_owner_that_failed_releases_the_service() {
    let (cluster, ctx) = setup("250");
    cluster.insert_scaling_request(fixtures::scaling_request("other-traffic", "400"));

    reconcile(&ctx, t0()).await;
    assert!(matches!(
        reconcile(&ctx, at(301)).await,
        ReconcileOutcome::Failed { .. }
    ));

    // 400 requests tie at cost 800 and pick 100m, which the failed publish already wrote
    let outcome = reconcile_request(&ctx, NAMESPACE, "other-traffic", at(302))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Unchanged);
    assert_eq!(cluster.service_updates().len(), 1);
    assert_eq!(
        cluster.scaling_status(NAMESPACE, "other-traffic").unwrap().phase,
        RolloverPhase::Done
    );
}

#[tokio::test]
async fn test_pod_failure_after_revision_delete_does_not_repeat_it() {
    let (cluster, ctx) = setup("250");
    cluster.set_ready_on_publish(true);
    reconcile(&ctx, t0()).await;
    cluster.inject_transient_failures("delete_pod", 3);

    let err = reconcile_request(&ctx, NAMESPACE, REQUEST, at(5))
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(cluster.revision_deletes(), vec!["hello-00001".to_string()]);

    let draining = status(&cluster);
    assert_eq!(draining.phase, RolloverPhase::Draining);
    assert!(draining.previous_revision_deleted);

    assert_eq!(reconcile(&ctx, at(6)).await, ReconcileOutcome::Completed);
    assert_eq!(cluster.revision_deletes(), vec!["hello-00001".to_string()]);
    assert_eq!(cluster.pod_deletes().len(), 2);

    let done = status(&cluster);
    assert_eq!(done.phase, RolloverPhase::Done);
    assert!(!done.previous_revision_deleted);
}

#[test]
fn test_outcome_actions() {
    let delay = Duration::from_secs(5);
    assert_eq!(
        ReconcileOutcome::InProgress { retry_after: delay }.action(),
        Action::requeue(delay)
    );
    assert_eq!(
        ReconcileOutcome::Deferred { retry_after: delay }.action(),
        Action::requeue(delay)
    );
    assert_eq!(
        ReconcileOutcome::Skipped {
            reason: "catalog missing".to_string(),
            retry_after: Some(delay)
        }
        .action(),
        Action::requeue(delay)
    );
    assert_eq!(ReconcileOutcome::Unchanged.action(), Action::await_change());
    assert_eq!(ReconcileOutcome::Completed.action(), Action::await_change());
    assert_eq!(
        ReconcileOutcome::Failed {
            reason: "timeout".to_string()
        }
        .action(),
        Action::await_change()
    );
}
