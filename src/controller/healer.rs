//! Corrective writes against single Redis and Sentinel processes.
//!
//! Every action is idempotent: repeating it against a node that is already
//! correct leaves the node as it was.

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::{debug, info};

use crate::client::{RedisClient, RedisClientConfig, RedisError};
use crate::controller::error::ProbeError;
use crate::controller::meta_cache::ClusterKey;
use crate::controller::topology::{AuthConfig, select_oldest};
use crate::controller::workload::WorkloadReader;
use crate::crd::{MONITORED_MASTER_NAME, REDIS_PORT, RedisSentinelSpec, SENTINEL_PORT};

/// Write capability over one cluster's processes.
#[async_trait]
pub trait TopologyHealer: Send + Sync {
    /// Detach `node` from any master and make it a master.
    async fn promote_to_master(&self, node: &str, auth: &AuthConfig) -> Result<(), ProbeError>;

    /// Promote the earliest-created Redis node and attach every other node
    /// to it. Returns the promoted address.
    async fn promote_oldest_as_master(
        &self,
        cluster: &ClusterKey,
        auth: &AuthConfig,
    ) -> Result<String, ProbeError>;

    /// Point every non-master node at `master`.
    async fn rewire_all_to_master(
        &self,
        cluster: &ClusterKey,
        master: &str,
        auth: &AuthConfig,
    ) -> Result<(), ProbeError>;

    async fn apply_redis_config(
        &self,
        node: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<(), ProbeError>;

    async fn apply_sentinel_config(
        &self,
        sentinel: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<(), ProbeError>;

    /// (Re)register `master` as the monitored master with the desired quorum
    /// and custom directives.
    async fn set_sentinel_monitor(
        &self,
        sentinel: &str,
        master: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<(), ProbeError>;

    /// Drop the sentinel's in-memory view so it rediscovers the topology.
    async fn reset_sentinel_memory(&self, sentinel: &str, auth: &AuthConfig) -> Result<(), ProbeError>;
}

/// Issue `SENTINEL SET` for every custom directive, stopping at the first
/// failure.
async fn set_directives(client: &RedisClient, spec: &RedisSentinelSpec) -> Result<(), RedisError> {
    for (option, value) in spec.sentinel.directives() {
        debug!(sentinel = %client.address(), option = %option, "SENTINEL SET");
        client.sentinel_set(MONITORED_MASTER_NAME, option, value).await?;
    }
    Ok(())
}

/// Healer issuing commands to live Redis and Sentinel processes.
#[derive(Clone)]
pub struct LiveHealer {
    workloads: WorkloadReader,
    redis: RedisClientConfig,
}

impl LiveHealer {
    pub fn new(workloads: WorkloadReader, redis: RedisClientConfig) -> Self {
        Self { workloads, redis }
    }

    async fn redis_client(&self, node: &str, auth: &AuthConfig) -> Result<RedisClient, ProbeError> {
        RedisClient::connect(node, REDIS_PORT, auth.password(), self.redis)
            .await
            .map_err(|e| ProbeError::redis(node, e))
    }

    async fn sentinel_client(&self, sentinel: &str) -> Result<RedisClient, ProbeError> {
        RedisClient::connect(sentinel, SENTINEL_PORT, None, self.redis)
            .await
            .map_err(|e| ProbeError::redis(sentinel, e))
    }

    async fn replicate_from(&self, node: &str, master: &str, auth: &AuthConfig) -> Result<(), ProbeError> {
        let client = self.redis_client(node, auth).await?;
        let result = client.replicaof(master, REDIS_PORT).await;
        client
            .finish(result)
            .await
            .map_err(|e| ProbeError::redis(node, e))
    }

    async fn attach_all(
        &self,
        nodes: &[String],
        master: &str,
        auth: &AuthConfig,
    ) -> Result<(), ProbeError> {
        try_join_all(
            nodes
                .iter()
                .filter(|n| n.as_str() != master)
                .map(|n| self.replicate_from(n, master, auth)),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TopologyHealer for LiveHealer {
    async fn promote_to_master(&self, node: &str, auth: &AuthConfig) -> Result<(), ProbeError> {
        info!(node = %node, "Promoting to master");
        let client = self.redis_client(node, auth).await?;
        let result = client.replicaof_no_one().await;
        client
            .finish(result)
            .await
            .map_err(|e| ProbeError::redis(node, e))
    }

    async fn promote_oldest_as_master(
        &self,
        cluster: &ClusterKey,
        auth: &AuthConfig,
    ) -> Result<String, ProbeError> {
        let pods = self.workloads.redis_pods(cluster).await?;
        let oldest = select_oldest(&pods)
            .ok_or_else(|| ProbeError::Workload("no running redis pods".to_string()))?
            .address
            .clone();

        self.promote_to_master(&oldest, auth).await?;

        let nodes: Vec<String> = pods.into_iter().map(|p| p.address).collect();
        self.attach_all(&nodes, &oldest, auth).await?;
        Ok(oldest)
    }

    async fn rewire_all_to_master(
        &self,
        cluster: &ClusterKey,
        master: &str,
        auth: &AuthConfig,
    ) -> Result<(), ProbeError> {
        info!(master = %master, "Attaching replicas to master");
        let pods = self.workloads.redis_pods(cluster).await?;
        let nodes: Vec<String> = pods.into_iter().map(|p| p.address).collect();
        self.attach_all(&nodes, master, auth).await
    }

    async fn apply_redis_config(
        &self,
        node: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<(), ProbeError> {
        let client = self.redis_client(node, auth).await?;
        let mut result = Ok(());
        for (key, value) in &spec.config {
            debug!(node = %node, key = %key, "CONFIG SET");
            if let Err(e) = client.config_set(key, value).await {
                result = Err(e);
                break;
            }
        }
        client
            .finish(result)
            .await
            .map_err(|e| ProbeError::redis(node, e))
    }

    async fn apply_sentinel_config(
        &self,
        sentinel: &str,
        spec: &RedisSentinelSpec,
        _auth: &AuthConfig,
    ) -> Result<(), ProbeError> {
        let client = self.sentinel_client(sentinel).await?;
        let result = set_directives(&client, spec).await;
        client
            .finish(result)
            .await
            .map_err(|e| ProbeError::redis(sentinel, e))
    }

    async fn set_sentinel_monitor(
        &self,
        sentinel: &str,
        master: &str,
        spec: &RedisSentinelSpec,
        auth: &AuthConfig,
    ) -> Result<(), ProbeError> {
        info!(sentinel = %sentinel, master = %master, "Setting sentinel monitor");
        let client = self.sentinel_client(sentinel).await?;

        if let Err(e) = client.sentinel_remove(MONITORED_MASTER_NAME).await {
            debug!(sentinel = %sentinel, error = %e, "No previous monitor to remove");
        }

        let mut result = client
            .sentinel_monitor(MONITORED_MASTER_NAME, master, REDIS_PORT, spec.sentinel.quorum())
            .await;
        if result.is_ok()
            && let Some(password) = auth.password()
        {
            result = client
                .sentinel_set(MONITORED_MASTER_NAME, "auth-pass", password)
                .await;
        }
        // REMOVE dropped every directive set on the old monitor.
        if result.is_ok() {
            result = set_directives(&client, spec).await;
        }

        client
            .finish(result)
            .await
            .map_err(|e| ProbeError::redis(sentinel, e))
    }

    async fn reset_sentinel_memory(&self, sentinel: &str, _auth: &AuthConfig) -> Result<(), ProbeError> {
        info!(sentinel = %sentinel, "Resetting sentinel");
        let client = self.sentinel_client(sentinel).await?;
        let result = client.sentinel_reset("*").await;
        client
            .finish(result)
            .await
            .map_err(|e| ProbeError::redis(sentinel, e))
    }
}
