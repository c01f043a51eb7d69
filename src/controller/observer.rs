//! Read-only view of a cluster's topology.
//!
//! [`TopologyObserver`] is what the reconciliation engine reads through.
//! [`LiveObserver`] answers from the Kubernetes API and from the Redis and
//! Sentinel processes themselves.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::client::{RedisClient, RedisClientConfig, ReplicationInfo, ReplicationRole, SentinelMasterInfo};
use crate::controller::error::ProbeError;
use crate::controller::meta_cache::ClusterKey;
use crate::controller::topology::{
    AuthConfig, NodeRole, RedisNode, RedisPod, ReplicaCounts, SentinelView, TopologySnapshot, select_oldest,
};
use crate::controller::workload::WorkloadReader;
use crate::crd::{MONITORED_MASTER_NAME, REDIS_PORT, RedisSentinelSpec, SENTINEL_PORT};

/// Read capability over one cluster's platform and process state.
#[async_trait]
pub trait TopologyObserver: Send + Sync {
    /// Compare live Redis and Sentinel replica counts with the desired ones.
    async fn replica_counts_match(
        &self,
        cluster: &ClusterKey,
        spec: &RedisSentinelSpec,
    ) -> Result<ReplicaCounts, ProbeError>;

    /// Number of `nodes` reporting the master role. Unreachable nodes are
    /// not counted.
    async fn count_masters(&self, nodes: &[String], auth: &AuthConfig) -> Result<usize, ProbeError>;

    async fn list_redis_addresses(&self, cluster: &ClusterKey) -> Result<Vec<String>, ProbeError>;

    async fn list_sentinel_addresses(&self, cluster: &ClusterKey) -> Result<Vec<String>, ProbeError>;

    /// Time since the earliest Redis replica was created.
    async fn oldest_redis_creation_age(&self, cluster: &ClusterKey) -> Result<Duration, ProbeError>;

    /// Address of the node reporting the master role.
    async fn resolve_master_address(
        &self,
        cluster: &ClusterKey,
        auth: &AuthConfig,
    ) -> Result<String, ProbeError>;

    /// Whether every non-master node replicates from `master`.
    async fn all_slaves_replicate_from(
        &self,
        cluster: &ClusterKey,
        master: &str,
        auth: &AuthConfig,
    ) -> Result<bool, ProbeError>;

    /// Whether `node` runs with every key of the desired config overlay.
    async fn redis_config_compliant(
        &self,
        node: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<bool, ProbeError>;

    async fn sentinel_monitors_correct_master(
        &self,
        sentinel: &str,
        master: &str,
        auth: &AuthConfig,
    ) -> Result<bool, ProbeError>;

    /// Whether the sentinel believes in exactly `size - 1` replicas.
    async fn sentinel_slave_count_correct(
        &self,
        sentinel: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<bool, ProbeError>;

    /// Whether the sentinel knows exactly `sentinel.replicas` sentinels.
    async fn sentinel_peer_count_correct(
        &self,
        sentinel: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<bool, ProbeError>;

    /// Full read of the cluster for status reporting.
    async fn snapshot(
        &self,
        cluster: &ClusterKey,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<TopologySnapshot, ProbeError>;
}

/// Observer backed by the Kubernetes API and live Redis/Sentinel connections.
#[derive(Clone)]
pub struct LiveObserver {
    workloads: WorkloadReader,
    redis: RedisClientConfig,
}

impl LiveObserver {
    pub fn new(workloads: WorkloadReader, redis: RedisClientConfig) -> Self {
        Self { workloads, redis }
    }

    async fn replication(&self, node: &str, auth: &AuthConfig) -> Result<ReplicationInfo, ProbeError> {
        let client = RedisClient::connect(node, REDIS_PORT, auth.password(), self.redis)
            .await
            .map_err(|e| ProbeError::redis(node, e))?;
        let result = client.info_replication().await;
        client
            .finish(result)
            .await
            .map_err(|e| ProbeError::redis(node, e))
    }

    /// Role of `node`, `Unknown` when it cannot be probed.
    async fn role(&self, node: &str, auth: &AuthConfig) -> NodeRole {
        match self.replication(node, auth).await {
            Ok(info) => match info.role {
                ReplicationRole::Master => NodeRole::Master,
                ReplicationRole::Slave => NodeRole::Slave,
            },
            Err(e) => {
                debug!(node = %node, error = %e, "Node unreachable, role unknown");
                NodeRole::Unknown
            }
        }
    }

    /// The sentinel's view of the monitored master, if it monitors one.
    async fn monitored(&self, sentinel: &str) -> Result<Option<SentinelMasterInfo>, ProbeError> {
        let client = RedisClient::connect(sentinel, SENTINEL_PORT, None, self.redis)
            .await
            .map_err(|e| ProbeError::redis(sentinel, e))?;
        let result = client.sentinel_masters().await;
        let masters = client
            .finish(result)
            .await
            .map_err(|e| ProbeError::redis(sentinel, e))?;
        Ok(masters.into_iter().find(|m| m.name == MONITORED_MASTER_NAME))
    }

    async fn config_compliant(
        &self,
        node: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        let client = RedisClient::connect(node, REDIS_PORT, auth.password(), self.redis)
            .await
            .map_err(|e| ProbeError::redis(node, e))?;

        let mut result = Ok(true);
        for (key, want) in &spec.config {
            match client.config_get(key).await {
                Ok(Some(have)) if have == *want => {}
                Ok(have) => {
                    debug!(node = %node, key = %key, want = %want, have = ?have, "Config drift");
                    result = Ok(false);
                    break;
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        client
            .finish(result)
            .await
            .map_err(|e| ProbeError::redis(node, e))
    }
}

fn addresses(pods: Vec<RedisPod>) -> Vec<String> {
    let mut addresses: Vec<String> = pods.into_iter().map(|p| p.address).collect();
    addresses.sort();
    addresses
}

#[async_trait]
impl TopologyObserver for LiveObserver {
    async fn replica_counts_match(
        &self,
        cluster: &ClusterKey,
        spec: &RedisSentinelSpec,
    ) -> Result<ReplicaCounts, ProbeError> {
        let (redis, sentinel) = futures::try_join!(
            self.workloads.redis_ready_replicas(cluster),
            self.workloads.sentinel_ready_replicas(cluster),
        )?;
        Ok(ReplicaCounts {
            redis_ok: redis == spec.size,
            sentinel_ok: sentinel == spec.sentinel.replicas,
        })
    }

    async fn count_masters(&self, nodes: &[String], auth: &AuthConfig) -> Result<usize, ProbeError> {
        let roles = join_all(nodes.iter().map(|n| self.role(n, auth))).await;
        Ok(roles.into_iter().filter(|r| *r == NodeRole::Master).count())
    }

    async fn list_redis_addresses(&self, cluster: &ClusterKey) -> Result<Vec<String>, ProbeError> {
        Ok(addresses(self.workloads.redis_pods(cluster).await?))
    }

    async fn list_sentinel_addresses(&self, cluster: &ClusterKey) -> Result<Vec<String>, ProbeError> {
        Ok(addresses(self.workloads.sentinel_pods(cluster).await?))
    }

    async fn oldest_redis_creation_age(&self, cluster: &ClusterKey) -> Result<Duration, ProbeError> {
        let pods = self.workloads.redis_pods(cluster).await?;
        let oldest = select_oldest(&pods)
            .ok_or_else(|| ProbeError::Workload("no running redis pods".to_string()))?;
        Ok(jiff::Timestamp::now()
            .duration_since(oldest.created_at)
            .unsigned_abs())
    }

    async fn resolve_master_address(
        &self,
        cluster: &ClusterKey,
        auth: &AuthConfig,
    ) -> Result<String, ProbeError> {
        let nodes = self.list_redis_addresses(cluster).await?;
        let roles = join_all(nodes.iter().map(|n| self.role(n, auth))).await;
        nodes
            .into_iter()
            .zip(roles)
            .find(|(_, role)| *role == NodeRole::Master)
            .map(|(node, _)| node)
            .ok_or(ProbeError::NoMaster)
    }

    async fn all_slaves_replicate_from(
        &self,
        cluster: &ClusterKey,
        master: &str,
        auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        let nodes = self.list_redis_addresses(cluster).await?;
        let replicas: Vec<&String> = nodes.iter().filter(|n| n.as_str() != master).collect();
        let infos = join_all(replicas.iter().map(|n| self.replication(n, auth))).await;

        for (node, info) in replicas.into_iter().zip(infos) {
            if !info?.replicates_from(master) {
                debug!(node = %node, master = %master, "Replica not attached to master");
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn redis_config_compliant(
        &self,
        node: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        self.config_compliant(node, spec, auth).await
    }

    async fn sentinel_monitors_correct_master(
        &self,
        sentinel: &str,
        master: &str,
        _auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        Ok(self
            .monitored(sentinel)
            .await?
            .is_some_and(|m| m.ip == master))
    }

    async fn sentinel_slave_count_correct(
        &self,
        sentinel: &str,
        spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        let expected = u32::try_from(spec.size.saturating_sub(1)).unwrap_or(0);
        Ok(self
            .monitored(sentinel)
            .await?
            .is_some_and(|m| m.slaves == expected))
    }

    async fn sentinel_peer_count_correct(
        &self,
        sentinel: &str,
        spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<bool, ProbeError> {
        let expected = u32::try_from(spec.sentinel.replicas).unwrap_or(0);
        Ok(self
            .monitored(sentinel)
            .await?
            .is_some_and(|m| m.sentinels == expected))
    }

    async fn snapshot(
        &self,
        cluster: &ClusterKey,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<TopologySnapshot, ProbeError> {
        let (redis, sentinels) = futures::try_join!(
            self.list_redis_addresses(cluster),
            self.list_sentinel_addresses(cluster),
        )?;

        let nodes = join_all(redis.into_iter().map(|address| async move {
            let role = self.role(&address, auth).await;
            let config_compliant = match self.config_compliant(&address, spec, auth).await {
                Ok(compliant) => compliant,
                Err(e) => {
                    warn!(node = %address, error = %e, "Config check failed");
                    false
                }
            };
            RedisNode {
                address,
                role,
                config_compliant,
            }
        }))
        .await;

        let views = join_all(sentinels.into_iter().map(|address| async move {
            let monitored = match self.monitored(&address).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(sentinel = %address, error = %e, "Sentinel unreachable");
                    None
                }
            };
            SentinelView {
                address,
                monitored_master: monitored.as_ref().map(|m| m.ip.clone()),
                known_slaves: monitored.as_ref().map(|m| m.slaves),
                known_sentinels: monitored.as_ref().map(|m| m.sentinels),
            }
        }))
        .await;

        Ok(TopologySnapshot::new(nodes, views))
    }
}
