//! One reconciliation pass for a cluster, from desired spec to outcome.
//!
//! Caches the spec, reports the inferred transition, ensures workload
//! resources, runs check-and-heal and turns the result into status
//! conditions, events, metrics and a [`PassOutcome`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::controller::engine::ReconciliationEngine;
use crate::controller::error::Error;
use crate::controller::events::{ClusterEvent, EventSink};
use crate::controller::healer::TopologyHealer;
use crate::controller::meta_cache::{ClusterKey, ClusterMetaCache, Meta, TransitionPhase};
use crate::controller::observer::TopologyObserver;
use crate::controller::topology::AuthConfig;
use crate::crd::{ConditionType, RedisSentinel, RedisSentinelStatus};
use crate::health::ClusterMetrics;
use crate::resources::{WorkloadResources, cluster_labels, owner_reference};

/// Message on the Creating condition when resources vanished from a
/// previously healthy cluster.
pub const RECREATE_MESSAGE: &str = "redis server or sentinel server be removed by user, restart";

/// How a pass ended.
#[derive(Debug)]
pub enum PassOutcome {
    /// Every check passed. `sentinels_pending` is set when the Sentinel
    /// replica count did not match yet.
    Converged { sentinels_pending: bool },
    /// Nothing is wrong that waiting will not fix; run again after the delay.
    Retry(Duration),
    /// The pass failed and the cluster is marked Failed.
    Fatal(Error),
}

pub struct ClusterHandler<O, H> {
    engine: ReconciliationEngine<O, H>,
    meta_cache: Arc<ClusterMetaCache>,
    resources: Arc<dyn WorkloadResources>,
    metrics: Option<Arc<dyn ClusterMetrics>>,
    retry_delay: Duration,
}

impl<O, H> ClusterHandler<O, H>
where
    O: TopologyObserver,
    H: TopologyHealer,
{
    pub fn new(
        engine: ReconciliationEngine<O, H>,
        meta_cache: Arc<ClusterMetaCache>,
        resources: Arc<dyn WorkloadResources>,
        metrics: Option<Arc<dyn ClusterMetrics>>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            engine,
            meta_cache,
            resources,
            metrics,
            retry_delay,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine<O, H> {
        &self.engine
    }

    pub fn meta_cache(&self) -> &Arc<ClusterMetaCache> {
        &self.meta_cache
    }

    /// Run a pass for `obj` and record its outcome in `status`.
    ///
    /// `obj.spec` must already be defaulted and validated.
    pub async fn handle(
        &self,
        obj: &RedisSentinel,
        auth: AuthConfig,
        status: &mut RedisSentinelStatus,
        events: &dyn EventSink,
    ) -> PassOutcome {
        let Some(key) = ClusterKey::for_resource(obj) else {
            return PassOutcome::Fatal(Error::MissingField(
                "metadata.namespace or metadata.name".to_string(),
            ));
        };

        let meta = self.meta_cache.cache(key, obj.spec.clone(), auth);
        debug!(cluster = %meta.key, phase = ?meta.phase, "Inferred transition");
        self.report_transition(&meta, status, events).await;

        events.publish(ClusterEvent::Ensuring).await;
        let labels = cluster_labels(obj);
        let owner_refs = [owner_reference(obj)];
        if let Err(e) = self.resources.ensure_resources(obj, &labels, &owner_refs).await {
            let err = Error::EnsureResources(e.to_string());
            return self.fail(&meta.key, err, status, events).await;
        }

        events.publish(ClusterEvent::Checking).await;
        match self.engine.check_and_heal(&meta, events).await {
            Ok(report) => {
                status.set_healthy("Cluster ok");
                events.publish(ClusterEvent::Healthy).await;
                self.set_ok(&meta.key);
                self.publish_addresses(&meta, status).await;
                PassOutcome::Converged {
                    sentinels_pending: !report.sentinels_ready,
                }
            }
            Err(e) if e.is_retry_signal() => {
                info!(cluster = %meta.key, error = %e, "Pass not finished, rescheduling");
                self.set_error(&meta.key);
                if matches!(e, Error::NeedRequeue(_)) && status.latest_is(ConditionType::Healthy) {
                    status.set_creating(RECREATE_MESSAGE);
                    events
                        .publish(ClusterEvent::Creating(RECREATE_MESSAGE.to_string()))
                        .await;
                }
                PassOutcome::Retry(self.retry_delay)
            }
            Err(e) => self.fail(&meta.key, e, status, events).await,
        }
    }

    async fn report_transition(
        &self,
        meta: &Meta,
        status: &mut RedisSentinelStatus,
        events: &dyn EventSink,
    ) {
        let message = meta.message.clone();
        let event = match meta.phase {
            TransitionPhase::Check => return,
            TransitionPhase::Create => {
                status.set_creating(&message);
                ClusterEvent::Creating(message)
            }
            TransitionPhase::ScaleUp => {
                status.set_scaling_up(&message);
                ClusterEvent::ScalingUp(message)
            }
            TransitionPhase::ScaleDown => {
                status.set_scaling_down(&message);
                ClusterEvent::ScalingDown(message)
            }
            TransitionPhase::Upgrade => {
                status.set_upgrading(&message);
                ClusterEvent::Upgrading(message)
            }
            TransitionPhase::Update => {
                status.set_updating(&message);
                ClusterEvent::Updating(message)
            }
        };
        events.publish(event).await;
    }

    async fn fail(
        &self,
        key: &ClusterKey,
        err: Error,
        status: &mut RedisSentinelStatus,
        events: &dyn EventSink,
    ) -> PassOutcome {
        warn!(cluster = %key, error = %err, "Reconciliation pass failed");
        let message = err.to_string();
        status.set_failed(&message);
        events.publish(ClusterEvent::Failed(message)).await;
        self.set_error(key);
        PassOutcome::Fatal(err)
    }

    /// Publish master and sentinel addresses; failures here never change the
    /// outcome of the pass.
    async fn publish_addresses(&self, meta: &Meta, status: &mut RedisSentinelStatus) {
        match self
            .engine
            .observer()
            .snapshot(&meta.key, &meta.spec, &meta.auth)
            .await
        {
            Ok(snapshot) => {
                debug!(
                    cluster = %meta.key,
                    masters = snapshot.master_count(),
                    replicas = snapshot.replicas().count(),
                    sentinels = snapshot.sentinels().len(),
                    "Topology after pass"
                );
                if let Some(master) = snapshot.master() {
                    status.master_ip = Some(master.to_string());
                }
                if let Some(sentinel) = snapshot.sentinel_entry_point() {
                    status.sentinel_ip = Some(sentinel.to_string());
                }
            }
            Err(e) => warn!(cluster = %meta.key, error = %e, "Could not read topology for status"),
        }
    }

    fn set_ok(&self, key: &ClusterKey) {
        if let Some(metrics) = &self.metrics {
            metrics.set_cluster_ok(&key.namespace, &key.name);
        }
    }

    fn set_error(&self, key: &ClusterKey) {
        if let Some(metrics) = &self.metrics {
            metrics.set_cluster_error(&key.namespace, &key.name);
        }
    }
}
