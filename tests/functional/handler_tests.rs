//! Full passes through the handler: conditions, events and metrics.

use std::sync::Arc;
use std::time::Duration;

use redis_sentinel_operator::controller::engine::{EngineConfig, ReconciliationEngine};
use redis_sentinel_operator::controller::error::Error;
use redis_sentinel_operator::controller::events::ClusterEvent;
use redis_sentinel_operator::controller::handler::{ClusterHandler, PassOutcome, RECREATE_MESSAGE};
use redis_sentinel_operator::controller::meta_cache::{ClusterMetaCache, TransitionPhase};
use redis_sentinel_operator::controller::topology::AuthConfig;
use redis_sentinel_operator::crd::{
    ConditionType, RedisSentinel, RedisSentinelSpec, RedisSentinelStatus,
};

use crate::mock_state::{
    HealCall, RecordingMetrics, RecordingResources, RecordingSink, SimRole, SimulatedCluster, key,
    redis_addr, sentinel_addr, spec,
};

const RETRY_DELAY: Duration = Duration::from_secs(20);

struct Harness {
    cluster: SimulatedCluster,
    handler: ClusterHandler<SimulatedCluster, SimulatedCluster>,
    resources: Arc<RecordingResources>,
    metrics: Arc<RecordingMetrics>,
    status: RedisSentinelStatus,
}

impl Harness {
    fn new(cluster: SimulatedCluster) -> Self {
        let resources = Arc::new(RecordingResources::default());
        let metrics = Arc::new(RecordingMetrics::default());
        let handler = ClusterHandler::new(
            ReconciliationEngine::new(cluster.clone(), cluster.clone(), EngineConfig::default()),
            Arc::new(ClusterMetaCache::new()),
            resources.clone(),
            Some(metrics.clone()),
            RETRY_DELAY,
        );
        Self {
            cluster,
            handler,
            resources,
            metrics,
            status: RedisSentinelStatus::default(),
        }
    }

    async fn pass(&mut self, spec: &RedisSentinelSpec) -> (PassOutcome, RecordingSink) {
        let sink = RecordingSink::default();
        let outcome = self
            .handler
            .handle(&resource(spec), AuthConfig::default(), &mut self.status, &sink)
            .await;
        (outcome, sink)
    }
}

fn resource(spec: &RedisSentinelSpec) -> RedisSentinel {
    let mut obj = RedisSentinel::new("cache", spec.clone());
    obj.metadata.namespace = Some("default".to_string());
    obj
}

#[tokio::test]
async fn test_first_pass_creates_then_reports_healthy() {
    let spec = spec(3, 3);
    let mut harness = Harness::new(SimulatedCluster::fresh(3, 3));

    let (outcome, sink) = harness.pass(&spec).await;

    assert!(matches!(
        outcome,
        PassOutcome::Converged {
            sentinels_pending: false
        }
    ));
    assert!(harness.status.latest_is(ConditionType::Healthy));
    assert_eq!(
        harness.status.current(ConditionType::Creating).unwrap().message,
        "Bootstrap redis cluster"
    );
    assert_eq!(harness.status.master_ip.as_deref(), Some(redis_addr(0).as_str()));
    assert_eq!(
        harness.status.sentinel_ip.as_deref(),
        Some(sentinel_addr(0).as_str())
    );

    let events = sink.events();
    assert_eq!(
        events[0],
        ClusterEvent::Creating("Bootstrap redis cluster".to_string())
    );
    assert_eq!(events[1], ClusterEvent::Ensuring);
    assert_eq!(events[2], ClusterEvent::Checking);
    assert_eq!(events.last(), Some(&ClusterEvent::Healthy));
    assert_eq!(harness.metrics.last(), Some(true));
    assert_eq!(harness.resources.calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_steady_state_pass_is_quiet() {
    let spec = spec(3, 3);
    let mut harness = Harness::new(SimulatedCluster::healthy(&spec));
    harness.pass(&spec).await;
    harness.cluster.clear_calls();

    let (outcome, sink) = harness.pass(&spec).await;

    assert!(matches!(outcome, PassOutcome::Converged { .. }));
    assert!(harness.cluster.heal_calls().is_empty());
    assert_eq!(
        sink.events(),
        vec![ClusterEvent::Ensuring, ClusterEvent::Checking, ClusterEvent::Healthy]
    );
    assert_eq!(
        harness.handler.meta_cache().get(&key()).unwrap().phase,
        TransitionPhase::Check
    );
}

#[tokio::test]
async fn test_undercount_retries_without_failed_condition() {
    let spec = spec(3, 3);
    let mut harness = Harness::new(SimulatedCluster::fresh(2, 3));

    let (outcome, _) = harness.pass(&spec).await;

    assert!(matches!(outcome, PassOutcome::Retry(d) if d == RETRY_DELAY));
    assert!(harness.status.current(ConditionType::Failed).is_none());
    assert!(harness.status.latest_is(ConditionType::Creating));
    assert_eq!(harness.metrics.last(), Some(false));
}

#[tokio::test]
async fn test_missing_pods_after_healthy_flips_to_creating() {
    let spec = spec(3, 3);
    let mut harness = Harness::new(SimulatedCluster::healthy(&spec));
    harness.pass(&spec).await;
    assert!(harness.status.latest_is(ConditionType::Healthy));

    harness.cluster.state().redis_ready = 2;
    let (outcome, sink) = harness.pass(&spec).await;

    assert!(matches!(outcome, PassOutcome::Retry(_)));
    assert!(harness.status.latest_is(ConditionType::Creating));
    assert_eq!(
        harness.status.current(ConditionType::Creating).unwrap().message,
        RECREATE_MESSAGE
    );
    assert!(sink.contains(&ClusterEvent::Creating(RECREATE_MESSAGE.to_string())));
    assert!(harness.status.current(ConditionType::Failed).is_none());
}

#[tokio::test]
async fn test_multiple_masters_marks_failed() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    cluster
        .state()
        .nodes
        .get_mut(&redis_addr(2))
        .unwrap()
        .role = SimRole::Master;
    let mut harness = Harness::new(cluster);

    let (outcome, sink) = harness.pass(&spec).await;

    match outcome {
        PassOutcome::Fatal(Error::MultipleMasters { count }) => assert_eq!(count, 2),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let failed = harness.status.current(ConditionType::Failed).unwrap();
    assert!(failed.message.contains("fix manually"));
    assert!(harness.status.latest_is(ConditionType::Failed));
    assert!(sink
        .events()
        .iter()
        .any(|e| matches!(e, ClusterEvent::Failed(m) if m.contains("fix manually"))));
    assert_eq!(harness.metrics.last(), Some(false));
}

#[tokio::test]
async fn test_ensure_failure_is_fatal_before_checks() {
    let spec = spec(3, 3);
    let mut harness = Harness::new(SimulatedCluster::fresh(3, 3));
    *harness.resources.fail.lock().unwrap() = true;

    let (outcome, sink) = harness.pass(&spec).await;

    assert!(matches!(outcome, PassOutcome::Fatal(Error::EnsureResources(_))));
    assert!(harness.cluster.heal_calls().is_empty());
    assert!(!sink.contains(&ClusterEvent::Checking));
    assert!(harness.status.latest_is(ConditionType::Failed));
}

#[tokio::test]
async fn test_scale_up_reports_scaling_and_waits() {
    let initial = spec(3, 3);
    let mut harness = Harness::new(SimulatedCluster::healthy(&initial));
    harness.pass(&initial).await;

    let scaled = spec(5, 3);
    let (outcome, sink) = harness.pass(&scaled).await;

    assert!(matches!(outcome, PassOutcome::Retry(_)));
    let scaling = harness.status.current(ConditionType::Scaling).unwrap();
    assert_eq!(scaling.reason, "Scaling up");
    assert!(sink.contains(&ClusterEvent::ScalingUp(
        "Scaling up redis from 3 to 5".to_string()
    )));
}

#[tokio::test]
async fn test_sentinel_undercount_converges_with_pending_flag() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    cluster.state().sentinel_ready = 2;
    let mut harness = Harness::new(cluster);

    let (outcome, _) = harness.pass(&spec).await;

    assert!(matches!(
        outcome,
        PassOutcome::Converged {
            sentinels_pending: true
        }
    ));
    assert!(harness.status.latest_is(ConditionType::Healthy));
}

#[tokio::test(start_paused = true)]
async fn test_restore_timeout_marks_failed() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    {
        let mut state = cluster.state();
        let sentinel = state.sentinels.get_mut(&sentinel_addr(1)).unwrap();
        sentinel.slaves = 4;
        sentinel.restore_after_polls = None;
    }
    let mut harness = Harness::new(cluster);

    let (outcome, _) = harness.pass(&spec).await;

    assert!(matches!(
        outcome,
        PassOutcome::Fatal(Error::SentinelRestoreTimeout { .. })
    ));
    assert!(harness.status.latest_is(ConditionType::Failed));
    assert_eq!(
        harness.cluster.heal_calls().last(),
        Some(&HealCall::ResetSentinel(sentinel_addr(1)))
    );
}

#[tokio::test]
async fn test_new_cluster_sentinels_run_custom_config() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::fresh(3, 3);
    cluster.state().redis_ready = 2;
    let mut harness = Harness::new(cluster);

    let (first, _) = harness.pass(&spec).await;
    assert!(matches!(first, PassOutcome::Retry(_)));

    harness.cluster.state().redis_ready = 3;
    let (second, _) = harness.pass(&spec).await;
    assert!(matches!(second, PassOutcome::Converged { .. }));

    // The second pass is a Check pass, so the directives come from the
    // monitor step, not from the sentinel config step.
    assert!(!harness
        .cluster
        .heal_calls()
        .iter()
        .any(|c| matches!(c, HealCall::ApplySentinelConfig(_))));
    for sentinel in harness.cluster.state().sentinels.values() {
        assert_eq!(sentinel.custom_config, spec.sentinel.custom_config);
    }
}

#[tokio::test]
async fn test_unreachable_replica_retries_without_failing() {
    let spec = spec(3, 3);
    let mut harness = Harness::new(SimulatedCluster::healthy(&spec));
    harness.pass(&spec).await;
    assert!(harness.status.latest_is(ConditionType::Healthy));

    harness
        .cluster
        .state()
        .nodes
        .get_mut(&redis_addr(1))
        .unwrap()
        .reachable = false;
    let (outcome, sink) = harness.pass(&spec).await;

    assert!(matches!(outcome, PassOutcome::Retry(d) if d == RETRY_DELAY));
    assert!(harness.status.current(ConditionType::Failed).is_none());
    assert!(harness.status.latest_is(ConditionType::Healthy));
    assert!(!sink.events().iter().any(|e| matches!(
        e,
        ClusterEvent::Failed(_) | ClusterEvent::Creating(_)
    )));
    assert_eq!(harness.metrics.last(), Some(false));
}

#[tokio::test]
async fn test_failed_pod_listing_retries_without_failing() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::fresh(3, 3);
    cluster.state().fail_listing = true;
    let mut harness = Harness::new(cluster);

    let (outcome, _) = harness.pass(&spec).await;

    assert!(matches!(outcome, PassOutcome::Retry(_)));
    assert!(harness.status.current(ConditionType::Failed).is_none());
    assert!(harness.status.latest_is(ConditionType::Creating));
    assert!(harness.cluster.heal_calls().is_empty());
}
