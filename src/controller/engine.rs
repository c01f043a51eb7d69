//! The check-and-heal pass over one cluster.
//!
//! Steps run strictly in order; all node-level calls of a step complete
//! before the next step starts. Within a step, calls against distinct nodes
//! run concurrently.
//!
//! 1. Redis and Sentinel replica counts
//! 2. Master count (elect one when there is none, refuse when there are many)
//! 3. Every replica attached to the master
//! 4. Redis config overlay on every node
//! 5. Sentinel custom config (skipped in the Check phase)
//! 6. Every sentinel monitors the master
//! 7. Sentinel replica count, reset and wait for rediscovery
//! 8. Sentinel peer count, single reset without waiting

use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::controller::error::{Error, Result};
use crate::controller::events::{ClusterEvent, EventSink};
use crate::controller::healer::TopologyHealer;
use crate::controller::meta_cache::{Meta, TransitionPhase};
use crate::controller::observer::TopologyObserver;
use crate::controller::topology::AuthConfig;
use crate::crd::RedisSentinelSpec;

/// Timing of the sentinel restore wait in step 7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between replica-count polls after a sentinel reset.
    pub restore_poll_interval: Duration,
    /// How long a reset sentinel gets to rediscover its replicas.
    pub restore_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            restore_poll_interval: Duration::from_secs(5),
            restore_timeout: Duration::from_secs(30),
        }
    }
}

/// Outcome of a pass that converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckReport {
    /// Whether the Sentinel replica count matched the desired count.
    pub sentinels_ready: bool,
}

pub struct ReconciliationEngine<O, H> {
    observer: O,
    healer: H,
    config: EngineConfig,
}

impl<O, H> ReconciliationEngine<O, H>
where
    O: TopologyObserver,
    H: TopologyHealer,
{
    pub fn new(observer: O, healer: H, config: EngineConfig) -> Self {
        Self {
            observer,
            healer,
            config,
        }
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn healer(&self) -> &H {
        &self.healer
    }

    /// Run one check-and-heal pass.
    ///
    /// Returns [`Error::NeedRequeue`] while Redis replicas are missing and
    /// [`Error::Probe`] when a read fails; both only reschedule the pass.
    /// Every other error is fatal for the pass.
    pub async fn check_and_heal(&self, meta: &Meta, events: &dyn EventSink) -> Result<CheckReport> {
        let cluster = &meta.key;
        let spec = &meta.spec;
        let auth = &meta.auth;

        // 1. membership
        let counts = self.observer.replica_counts_match(cluster, spec).await?;
        if !counts.redis_ok {
            let msg = "wait for all redis server start";
            info!(namespace = %cluster.namespace, name = %cluster.name, "{msg}");
            events.publish(ClusterEvent::Updating(msg.to_string())).await;
            return Err(Error::NeedRequeue(msg.to_string()));
        }
        if !counts.sentinel_ok {
            let msg = "number of sentinel mismatch";
            warn!(namespace = %cluster.namespace, name = %cluster.name, "{msg}");
            events.publish(ClusterEvent::Failed(msg.to_string())).await;
        }

        // 2. master count
        let nodes = self.observer.list_redis_addresses(cluster).await?;
        if nodes.is_empty() {
            return Err(Error::NeedRequeue("no running redis pods".to_string()));
        }
        match self.observer.count_masters(&nodes, auth).await? {
            0 => self.elect_master(meta, &nodes).await?,
            1 => {}
            count => {
                warn!(namespace = %cluster.namespace, name = %cluster.name, count, "More than one master");
                return Err(Error::MultipleMasters { count });
            }
        }

        // 3. replication
        let master = self.observer.resolve_master_address(cluster, auth).await?;
        if !self
            .observer
            .all_slaves_replicate_from(cluster, &master, auth)
            .await?
        {
            self.healer
                .rewire_all_to_master(cluster, &master, auth)
                .await
                .map_err(|e| Error::heal("attach replicas to master", e))?;
        }

        // 4. redis config
        self.heal_redis_config(&nodes, spec, auth, events).await?;

        let sentinels = self.observer.list_sentinel_addresses(cluster).await?;

        // 5. sentinel config
        if meta.phase != TransitionPhase::Check {
            try_join_all(
                sentinels
                    .iter()
                    .map(|s| self.healer.apply_sentinel_config(s, spec, auth)),
            )
            .await
            .map_err(|e| Error::heal("apply sentinel config", e))?;
        }

        // 6. sentinel monitor
        let monitoring = try_join_all(
            sentinels
                .iter()
                .map(|s| self.observer.sentinel_monitors_correct_master(s, &master, auth)),
        )
        .await?;
        try_join_all(
            sentinels
                .iter()
                .zip(monitoring)
                .filter(|(_, ok)| !ok)
                .map(|(s, _)| self.healer.set_sentinel_monitor(s, &master, spec, auth)),
        )
        .await
        .map_err(|e| Error::heal("set sentinel monitor", e))?;

        // 7. sentinel replica count, verified
        let slaves_ok = try_join_all(
            sentinels
                .iter()
                .map(|s| self.observer.sentinel_slave_count_correct(s, spec, auth)),
        )
        .await?;
        try_join_all(
            sentinels
                .iter()
                .zip(slaves_ok)
                .filter(|(_, ok)| !ok)
                .map(|(s, _)| self.restore_sentinel(s, spec, auth)),
        )
        .await?;

        // 8. sentinel peer count, best effort
        let peers_ok = try_join_all(
            sentinels
                .iter()
                .map(|s| self.observer.sentinel_peer_count_correct(s, spec, auth)),
        )
        .await?;
        try_join_all(
            sentinels
                .iter()
                .zip(peers_ok)
                .filter(|(_, ok)| !ok)
                .map(|(s, _)| self.healer.reset_sentinel_memory(s, auth)),
        )
        .await
        .map_err(|e| Error::heal("reset sentinel", e))?;

        Ok(CheckReport {
            sentinels_ready: counts.sentinel_ok,
        })
    }

    async fn elect_master(&self, meta: &Meta, nodes: &[String]) -> Result<()> {
        let cluster = &meta.key;
        if let [only] = nodes {
            info!(namespace = %cluster.namespace, name = %cluster.name, node = %only, "No master, promoting the only node");
            return self
                .healer
                .promote_to_master(only, &meta.auth)
                .await
                .map_err(|e| Error::heal("promote master", e));
        }

        match self.observer.oldest_redis_creation_age(cluster).await {
            Ok(age) => info!(
                namespace = %cluster.namespace,
                name = %cluster.name,
                oldest_age_secs = age.as_secs(),
                "No master, promoting the oldest node"
            ),
            Err(e) => debug!(error = %e, "Could not compute oldest node age"),
        }

        let promoted = self
            .healer
            .promote_oldest_as_master(cluster, &meta.auth)
            .await
            .map_err(|e| Error::heal("promote oldest as master", e))?;
        info!(namespace = %cluster.namespace, name = %cluster.name, master = %promoted, "Master elected");
        Ok(())
    }

    async fn heal_redis_config(
        &self,
        nodes: &[String],
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
        events: &dyn EventSink,
    ) -> Result<()> {
        let compliant = try_join_all(
            nodes
                .iter()
                .map(|n| self.observer.redis_config_compliant(n, spec, auth)),
        )
        .await?;

        let drifted: Vec<&String> = nodes
            .iter()
            .zip(compliant)
            .filter(|(_, ok)| !ok)
            .map(|(n, _)| n)
            .collect();
        if drifted.is_empty() {
            return Ok(());
        }

        events
            .publish(ClusterEvent::Updating(
                "set custom config for redis server".to_string(),
            ))
            .await;
        try_join_all(
            drifted
                .into_iter()
                .map(|n| self.healer.apply_redis_config(n, spec, auth)),
        )
        .await
        .map_err(|e| Error::heal("apply redis config", e))?;
        Ok(())
    }

    /// Reset `sentinel` and wait until it reports the right replica count.
    async fn restore_sentinel(
        &self,
        sentinel: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<()> {
        info!(sentinel = %sentinel, "Sentinel replica count wrong, resetting");
        self.healer
            .reset_sentinel_memory(sentinel, auth)
            .await
            .map_err(|e| Error::heal("reset sentinel", e))?;

        let started = tokio::time::Instant::now();
        let deadline = started + self.config.restore_timeout;
        loop {
            tokio::time::sleep(self.config.restore_poll_interval).await;
            match self
                .observer
                .sentinel_slave_count_correct(sentinel, spec, auth)
                .await
            {
                Ok(true) => {
                    debug!(sentinel = %sentinel, "Sentinel restored");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => debug!(sentinel = %sentinel, error = %e, "Sentinel not answering yet"),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::SentinelRestoreTimeout {
                    sentinel: sentinel.to_string(),
                    waited: started.elapsed(),
                });
            }
        }
    }
}
