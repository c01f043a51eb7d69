// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for redis-sentinel-operator.
//!
//! Uses proptest to generate random inputs and verify invariants.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use proptest::prelude::*;

use redis_sentinel_operator::controller::engine::{EngineConfig, ReconciliationEngine};
use redis_sentinel_operator::controller::error::ProbeError;
use redis_sentinel_operator::controller::events::{ClusterEvent, EventSink};
use redis_sentinel_operator::controller::healer::TopologyHealer;
use redis_sentinel_operator::controller::meta_cache::{
    ClusterKey, Meta, TransitionPhase, infer_phase,
};
use redis_sentinel_operator::controller::observer::TopologyObserver;
use redis_sentinel_operator::controller::status::REASON_HEALTHY;
use redis_sentinel_operator::controller::topology::{
    AuthConfig, RedisPod, ReplicaCounts, TopologySnapshot, select_oldest,
};
use redis_sentinel_operator::controller::validation::{apply_defaults, validate_spec};
use redis_sentinel_operator::crd::{
    ConditionStatus, ConditionType, RedisSentinelSpec, RedisSentinelStatus,
};

/// Strategy for generating pods with colliding creation times.
fn any_pods() -> impl Strategy<Value = Vec<RedisPod>> {
    prop::collection::vec((0..20u8, 0..5i64), 1..12).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(host, secs)| RedisPod {
                address: format!("10.0.0.{host}"),
                created_at: jiff::Timestamp::from_second(1_700_000_000 + secs).unwrap(),
            })
            .collect()
    })
}

/// Strategy for generating specs with random sizes and config.
fn any_spec() -> impl Strategy<Value = RedisSentinelSpec> {
    (
        0..8i32,
        0..8i32,
        any::<bool>(),
        prop::collection::btree_map("[a-z-]{1,12}", "[a-z0-9]{0,8}", 0..4),
    )
        .prop_map(|(size, sentinels, disable_persistence, config)| {
            let mut spec = RedisSentinelSpec {
                size,
                disable_persistence,
                config,
                ..Default::default()
            };
            spec.sentinel.replicas = sentinels;
            spec
        })
}

/// A converged cluster of any size: every check passes.
struct Converged {
    size: usize,
    sentinels: usize,
}

#[async_trait]
impl TopologyObserver for Converged {
    async fn replica_counts_match(
        &self,
        _cluster: &ClusterKey,
        _spec: &RedisSentinelSpec,
    ) -> Result<ReplicaCounts, ProbeError> {
        Ok(ReplicaCounts {
            redis_ok: true,
            sentinel_ok: true,
        })
    }

    async fn count_masters(&self, _nodes: &[String], _auth: &AuthConfig) -> Result<usize, ProbeError> {
        Ok(1)
    }

    async fn list_redis_addresses(&self, _cluster: &ClusterKey) -> Result<Vec<String>, ProbeError> {
        Ok((0..self.size).map(|i| format!("10.0.0.{i}")).collect())
    }

    async fn list_sentinel_addresses(&self, _cluster: &ClusterKey) -> Result<Vec<String>, ProbeError> {
        Ok((0..self.sentinels).map(|i| format!("10.0.1.{i}")).collect())
    }

    async fn oldest_redis_creation_age(&self, _cluster: &ClusterKey) -> Result<Duration, ProbeError> {
        Ok(Duration::from_secs(60))
    }

    async fn resolve_master_address(
        &self,
        _cluster: &ClusterKey,
        _auth: &AuthConfig,
    ) -> Result<String, ProbeError> {
        Ok("10.0.0.0".to_string())
    }

    async fn all_slaves_replicate_from(
        &self,
        _cluster: &ClusterKey,
        _master: &str,
        _auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        Ok(true)
    }

    async fn redis_config_compliant(
        &self,
        _node: &str,
        _spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        Ok(true)
    }

    async fn sentinel_monitors_correct_master(
        &self,
        _sentinel: &str,
        _master: &str,
        _auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        Ok(true)
    }

    async fn sentinel_slave_count_correct(
        &self,
        _sentinel: &str,
        _spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        Ok(true)
    }

    async fn sentinel_peer_count_correct(
        &self,
        _sentinel: &str,
        _spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        Ok(true)
    }

    async fn snapshot(
        &self,
        _cluster: &ClusterKey,
        _spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<TopologySnapshot, ProbeError> {
        Ok(TopologySnapshot::default())
    }
}

/// Healer counting sentinel config pushes apart from every other write.
#[derive(Default)]
struct CountingHealer {
    sentinel_config: AtomicUsize,
    other: AtomicUsize,
}

impl CountingHealer {
    fn write(&self) -> Result<(), ProbeError> {
        self.other.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TopologyHealer for CountingHealer {
    async fn promote_to_master(&self, _node: &str, _auth: &AuthConfig) -> Result<(), ProbeError> {
        self.write()
    }

    async fn promote_oldest_as_master(
        &self,
        _cluster: &ClusterKey,
        _auth: &AuthConfig,
    ) -> Result<String, ProbeError> {
        self.write().map(|_| String::new())
    }

    async fn rewire_all_to_master(
        &self,
        _cluster: &ClusterKey,
        _master: &str,
        _auth: &AuthConfig,
    ) -> Result<(), ProbeError> {
        self.write()
    }

    async fn apply_redis_config(
        &self,
        _node: &str,
        _spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<(), ProbeError> {
        self.write()
    }

    async fn apply_sentinel_config(
        &self,
        _sentinel: &str,
        _spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<(), ProbeError> {
        self.sentinel_config.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_sentinel_monitor(
        &self,
        _sentinel: &str,
        _master: &str,
        _spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<(), ProbeError> {
        self.write()
    }

    async fn reset_sentinel_memory(&self, _sentinel: &str, _auth: &AuthConfig) -> Result<(), ProbeError> {
        self.write()
    }
}

struct NoEvents;

#[async_trait]
impl EventSink for NoEvents {
    async fn publish(&self, _event: ClusterEvent) {}
}

fn any_phase() -> impl Strategy<Value = TransitionPhase> {
    prop_oneof![
        Just(TransitionPhase::Create),
        Just(TransitionPhase::ScaleUp),
        Just(TransitionPhase::ScaleDown),
        Just(TransitionPhase::Upgrade),
        Just(TransitionPhase::Update),
        Just(TransitionPhase::Check),
    ]
}

proptest! {
    /// Property: The elected pod is the minimum by (creation time, address).
    #[test]
    fn test_oldest_is_minimum(pods in any_pods()) {
        let oldest = select_oldest(&pods).unwrap();
        for pod in &pods {
            prop_assert!((oldest.created_at, &oldest.address) <= (pod.created_at, &pod.address));
        }
    }

    /// Property: Election does not depend on listing order.
    #[test]
    fn test_oldest_ignores_order(pods in any_pods()) {
        let mut reversed = pods.clone();
        reversed.reverse();
        prop_assert_eq!(select_oldest(&pods), select_oldest(&reversed));
    }

    /// Property: Defaulting twice gives the same spec as defaulting once.
    #[test]
    fn test_defaults_idempotent(spec in any_spec()) {
        let mut once = spec.clone();
        apply_defaults(&mut once);
        let mut twice = once.clone();
        apply_defaults(&mut twice);
        prop_assert_eq!(once, twice);
    }

    /// Property: Defaulting always pins the managed replication keys.
    #[test]
    fn test_defaults_pin_managed_keys(spec in any_spec()) {
        let mut spec = spec;
        apply_defaults(&mut spec);
        prop_assert_eq!(spec.config.get("slave-priority").map(String::as_str), Some("1"));
        if spec.disable_persistence {
            prop_assert_eq!(spec.config.get("appendonly").map(String::as_str), Some("no"));
            prop_assert_eq!(spec.config.get("save").map(String::as_str), Some(""));
        }
    }

    /// Property: Validation accepts exactly the sizes at or above the minimum.
    #[test]
    fn test_validation_thresholds(spec in any_spec()) {
        let mut spec = spec;
        apply_defaults(&mut spec);
        let valid = spec.size >= 3 && spec.sentinel.replicas >= 3;
        prop_assert_eq!(validate_spec(&spec).is_ok(), valid);
    }

    /// Property: An unchanged spec is always a Check.
    #[test]
    fn test_unchanged_is_check(spec in any_spec()) {
        let (phase, _) = infer_phase(&spec, &spec.clone());
        prop_assert_eq!(phase, TransitionPhase::Check);
    }

    /// Property: Any size change is a scale in the direction of the change.
    #[test]
    fn test_size_change_is_scale(old in any_spec(), new in any_spec()) {
        let (phase, _) = infer_phase(&old, &new);
        if new.size > old.size {
            prop_assert_eq!(phase, TransitionPhase::ScaleUp);
        } else if new.size < old.size {
            prop_assert_eq!(phase, TransitionPhase::ScaleDown);
        } else {
            prop_assert!(phase != TransitionPhase::ScaleUp && phase != TransitionPhase::ScaleDown);
        }
    }

    /// Property: Re-setting a condition keeps one record per type and only
    /// moves the transition time when the content changes.
    #[test]
    fn test_condition_history(messages in prop::collection::vec("[ab]", 1..10)) {
        let mut status = RedisSentinelStatus::default();
        let mut transition = None;
        let mut previous: Option<String> = None;

        for (i, message) in messages.iter().enumerate() {
            let now = jiff::Timestamp::from_second(1_700_000_000 + i as i64).unwrap();
            status.set_condition_at(
                ConditionType::Healthy,
                ConditionStatus::True,
                REASON_HEALTHY,
                message,
                now,
            );
            if previous.as_deref() != Some(message.as_str()) {
                transition = Some(now.to_string());
            }
            previous = Some(message.clone());

            prop_assert_eq!(status.conditions.len(), 1);
            prop_assert_eq!(
                Some(&status.conditions[0].last_transition_time),
                transition.as_ref()
            );
            prop_assert_eq!(&status.conditions[0].last_update_time, &now.to_string());
        }
    }

    /// Property: A converged cluster gets no corrective writes; only
    /// non-Check passes push the sentinel config, once per sentinel.
    #[test]
    fn test_converged_cluster_needs_no_healing(
        size in 1..10usize,
        sentinels in 1..7usize,
        phase in any_phase()
    ) {
        let engine = ReconciliationEngine::new(
            Converged { size, sentinels },
            CountingHealer::default(),
            EngineConfig::default(),
        );
        let meta = Meta {
            key: ClusterKey::new("default", "cache"),
            spec: RedisSentinelSpec::default(),
            auth: AuthConfig::default(),
            phase,
            message: String::new(),
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let report = runtime.block_on(engine.check_and_heal(&meta, &NoEvents)).unwrap();

        prop_assert!(report.sentinels_ready);
        prop_assert_eq!(engine.healer().other.load(Ordering::SeqCst), 0);
        let expected = if phase == TransitionPhase::Check { 0 } else { sentinels };
        prop_assert_eq!(engine.healer().sentinel_config.load(Ordering::SeqCst), expected);
    }
}
