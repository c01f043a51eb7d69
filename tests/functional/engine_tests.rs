//! Check-and-heal passes against a simulated cluster.

use std::time::Duration;

use redis_sentinel_operator::controller::engine::EngineConfig;
use redis_sentinel_operator::controller::error::Error;
use redis_sentinel_operator::controller::events::ClusterEvent;
use redis_sentinel_operator::controller::meta_cache::TransitionPhase;

use crate::mock_state::{
    HealCall, RecordingSink, SimRole, SimulatedCluster, engine, engine_with, meta, redis_addr,
    sentinel_addr, sentinels_in, spec, t0,
};

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_healthy_cluster_needs_no_healing() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    let sink = RecordingSink::default();

    let report = engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap();

    assert!(report.sentinels_ready);
    assert!(cluster.heal_calls().is_empty());
}

#[tokio::test]
async fn test_non_check_phase_reapplies_sentinel_config_only() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    let sink = RecordingSink::default();

    engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Update), &sink)
        .await
        .unwrap();

    let calls = cluster.heal_calls();
    assert_eq!(calls.len(), 3);
    assert!(calls
        .iter()
        .all(|c| matches!(c, HealCall::ApplySentinelConfig(_))));
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_redis_undercount_requeues_without_healing() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::fresh(2, 3);
    let sink = RecordingSink::default();

    let err = engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Create), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NeedRequeue(_)));
    assert!(err.is_retry_signal());
    assert!(cluster.heal_calls().is_empty());
    assert!(sink.contains(&ClusterEvent::Updating(
        "wait for all redis server start".to_string()
    )));
}

#[tokio::test]
async fn test_sentinel_undercount_does_not_block_healing() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    cluster.state().sentinel_ready = 2;
    cluster
        .state()
        .nodes
        .get_mut(&redis_addr(2))
        .unwrap()
        .role = SimRole::Unknown;
    let sink = RecordingSink::default();

    let report = engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap();

    assert!(!report.sentinels_ready);
    assert!(sink.contains(&ClusterEvent::Failed("number of sentinel mismatch".to_string())));
    assert_eq!(cluster.heal_calls(), vec![HealCall::Rewire(redis_addr(0))]);
}

// ============================================================================
// Master election
// ============================================================================

#[tokio::test]
async fn test_multiple_masters_is_fatal_and_untouched() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    cluster
        .state()
        .nodes
        .get_mut(&redis_addr(1))
        .unwrap()
        .role = SimRole::Master;
    let sink = RecordingSink::default();

    let err = engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MultipleMasters { count: 2 }));
    assert!(!err.is_retry_signal());
    assert!(!cluster
        .heal_calls()
        .iter()
        .any(HealCall::is_promotion_or_rewire));
    assert_eq!(cluster.masters().len(), 2);
}

#[tokio::test]
async fn test_single_node_promoted_without_age_lookup() {
    let spec = spec(1, 3);
    let cluster = SimulatedCluster::fresh(1, 3);
    let sink = RecordingSink::default();

    engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Create), &sink)
        .await
        .unwrap();

    assert_eq!(cluster.heal_calls()[0], HealCall::PromoteToMaster(redis_addr(0)));
    assert_eq!(cluster.state().age_reads, 0);
    assert_eq!(cluster.masters(), vec![redis_addr(0)]);
}

#[tokio::test]
async fn test_oldest_node_is_promoted() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::fresh(3, 3);
    {
        let mut state = cluster.state();
        state.nodes.get_mut(&redis_addr(0)).unwrap().created_at =
            t0() + jiff::SignedDuration::from_secs(30);
        state.nodes.get_mut(&redis_addr(2)).unwrap().created_at =
            t0() - jiff::SignedDuration::from_secs(30);
    }
    let sink = RecordingSink::default();

    engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Create), &sink)
        .await
        .unwrap();

    assert_eq!(cluster.heal_calls()[0], HealCall::PromoteOldest(redis_addr(2)));
    assert_eq!(cluster.state().age_reads, 1);
    assert_eq!(cluster.role_of(&redis_addr(0)), SimRole::Slave(redis_addr(2)));
    assert_eq!(cluster.role_of(&redis_addr(1)), SimRole::Slave(redis_addr(2)));
}

#[tokio::test]
async fn test_oldest_tie_broken_by_address() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::fresh(3, 3);
    {
        let mut state = cluster.state();
        for node in state.nodes.values_mut() {
            node.created_at = t0();
        }
    }
    let sink = RecordingSink::default();

    engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Create), &sink)
        .await
        .unwrap();

    assert_eq!(cluster.heal_calls()[0], HealCall::PromoteOldest(redis_addr(0)));
}

#[tokio::test]
async fn test_fresh_cluster_converges() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::fresh(3, 3);
    let sink = RecordingSink::default();
    let engine = engine(&cluster);

    engine
        .check_and_heal(&meta(spec.clone(), TransitionPhase::Create), &sink)
        .await
        .unwrap();

    let master = redis_addr(0);
    assert_eq!(cluster.masters(), vec![master.clone()]);
    assert_eq!(cluster.role_of(&redis_addr(1)), SimRole::Slave(master.clone()));
    assert_eq!(cluster.role_of(&redis_addr(2)), SimRole::Slave(master.clone()));
    let monitors = sentinels_in(&cluster.heal_calls(), |c| match c {
        HealCall::SetSentinelMonitor { sentinel, .. } => Some(sentinel),
        _ => None,
    });
    assert_eq!(monitors.len(), 3);

    cluster.clear_calls();
    engine
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap();
    assert!(cluster.heal_calls().is_empty());
}

// ============================================================================
// Replication and config
// ============================================================================

#[tokio::test]
async fn test_stray_replica_is_rewired() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    cluster
        .state()
        .nodes
        .get_mut(&redis_addr(2))
        .unwrap()
        .role = SimRole::Slave("10.9.9.9".to_string());
    let sink = RecordingSink::default();

    engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap();

    assert_eq!(cluster.heal_calls(), vec![HealCall::Rewire(redis_addr(0))]);
    assert_eq!(cluster.role_of(&redis_addr(2)), SimRole::Slave(redis_addr(0)));
}

#[tokio::test]
async fn test_config_drift_fixed_on_drifted_node_only() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    cluster
        .state()
        .nodes
        .get_mut(&redis_addr(1))
        .unwrap()
        .config
        .insert("maxmemory-policy".to_string(), "noeviction".to_string());
    let sink = RecordingSink::default();

    engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap();

    assert_eq!(
        cluster.heal_calls(),
        vec![HealCall::ApplyRedisConfig(redis_addr(1))]
    );
    assert!(sink.contains(&ClusterEvent::Updating(
        "set custom config for redis server".to_string()
    )));
}

#[tokio::test]
async fn test_sentinel_with_wrong_master_is_repointed() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    cluster
        .state()
        .sentinels
        .get_mut(&sentinel_addr(1))
        .unwrap()
        .monitored = Some("10.9.9.9".to_string());
    let sink = RecordingSink::default();

    engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap();

    assert_eq!(
        cluster.heal_calls(),
        vec![HealCall::SetSentinelMonitor {
            sentinel: sentinel_addr(1),
            master: redis_addr(0),
        }]
    );
}

#[tokio::test]
async fn test_repointed_sentinel_keeps_custom_config_in_check_phase() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    {
        let mut state = cluster.state();
        let sentinel = state.sentinels.get_mut(&sentinel_addr(2)).unwrap();
        sentinel.monitored = Some("10.9.9.9".to_string());
        sentinel.custom_config.clear();
    }
    let sink = RecordingSink::default();

    engine(&cluster)
        .check_and_heal(&meta(spec.clone(), TransitionPhase::Check), &sink)
        .await
        .unwrap();

    let calls = cluster.heal_calls();
    assert!(!calls.iter().any(|c| matches!(c, HealCall::ApplySentinelConfig(_))));
    assert_eq!(
        cluster.state().sentinels[&sentinel_addr(2)].custom_config,
        spec.sentinel.custom_config
    );
}

// ============================================================================
// Sentinel restore
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_stale_sentinel_restored_within_timeout() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    {
        let mut state = cluster.state();
        let sentinel = state.sentinels.get_mut(&sentinel_addr(0)).unwrap();
        sentinel.slaves = 1;
        sentinel.restore_after_polls = Some(2);
    }
    let sink = RecordingSink::default();
    let started = tokio::time::Instant::now();

    engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap();

    assert_eq!(
        cluster.heal_calls(),
        vec![HealCall::ResetSentinel(sentinel_addr(0))]
    );
    assert_eq!(cluster.state().sentinels[&sentinel_addr(0)].slaves, 2);
    assert!(started.elapsed() >= Duration::from_secs(10));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_stale_sentinel_timeout_is_fatal() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    {
        let mut state = cluster.state();
        let sentinel = state.sentinels.get_mut(&sentinel_addr(2)).unwrap();
        sentinel.slaves = 1;
        sentinel.restore_after_polls = None;
    }
    let sink = RecordingSink::default();

    let err = engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap_err();

    assert!(!err.is_retry_signal());
    match err {
        Error::SentinelRestoreTimeout { sentinel, waited } => {
            assert_eq!(sentinel, sentinel_addr(2));
            assert!(waited >= Duration::from_secs(30));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_restore_timing_is_configurable() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    {
        let mut state = cluster.state();
        let sentinel = state.sentinels.get_mut(&sentinel_addr(0)).unwrap();
        sentinel.slaves = 0;
        sentinel.restore_after_polls = None;
    }
    let config = EngineConfig {
        restore_poll_interval: Duration::from_millis(10),
        restore_timeout: Duration::from_millis(50),
    };
    let sink = RecordingSink::default();
    let started = tokio::time::Instant::now();

    let err = engine_with(&cluster, config)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SentinelRestoreTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_outer_deadline_cancels_restore_wait() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    {
        let mut state = cluster.state();
        let sentinel = state.sentinels.get_mut(&sentinel_addr(0)).unwrap();
        sentinel.slaves = 1;
        sentinel.restore_after_polls = None;
    }
    let sink = RecordingSink::default();
    let engine = engine(&cluster);
    let meta = meta(spec, TransitionPhase::Check);

    let result =
        tokio::time::timeout(Duration::from_secs(12), engine.check_and_heal(&meta, &sink)).await;

    assert!(result.is_err());
    assert_eq!(
        cluster.heal_calls(),
        vec![HealCall::ResetSentinel(sentinel_addr(0))]
    );
}

#[tokio::test]
async fn test_peer_count_reset_is_not_verified() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    {
        let mut state = cluster.state();
        let sentinel = state.sentinels.get_mut(&sentinel_addr(1)).unwrap();
        sentinel.peers = 1;
        sentinel.restore_after_polls = None;
    }
    let sink = RecordingSink::default();

    engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap();

    assert_eq!(
        cluster.heal_calls(),
        vec![HealCall::ResetSentinel(sentinel_addr(1))]
    );
}

// ============================================================================
// Healer failures
// ============================================================================

#[tokio::test]
async fn test_failed_promotion_is_fatal() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::fresh(3, 3);
    cluster.state().fail_heals = true;
    let sink = RecordingSink::default();

    let err = engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Create), &sink)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Heal {
            action: "promote oldest as master",
            ..
        }
    ));
    assert!(!err.is_retry_signal());
    assert!(cluster.masters().is_empty());
}

// ============================================================================
// Unreachable nodes and failed reads
// ============================================================================

#[tokio::test]
async fn test_unreachable_master_is_not_counted() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    {
        let mut state = cluster.state();
        let node = state.nodes.get_mut(&redis_addr(2)).unwrap();
        node.role = SimRole::Master;
        node.reachable = false;
    }
    let sink = RecordingSink::default();

    let err = engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap_err();

    // One reachable master, so no split-brain verdict; the unreachable
    // replica then fails the replication read.
    assert!(matches!(err, Error::Probe(_)), "got {err:?}");
    assert!(err.is_retry_signal());
    assert!(cluster.heal_calls().is_empty());
    assert_eq!(cluster.role_of(&redis_addr(2)), SimRole::Master);
}

#[tokio::test]
async fn test_failed_listing_is_a_retry_signal() {
    let spec = spec(3, 3);
    let cluster = SimulatedCluster::healthy(&spec);
    cluster.state().fail_listing = true;
    let sink = RecordingSink::default();

    let err = engine(&cluster)
        .check_and_heal(&meta(spec, TransitionPhase::Check), &sink)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Probe(_)), "got {err:?}");
    assert!(err.is_retry_signal());
    assert!(cluster.heal_calls().is_empty());
}
