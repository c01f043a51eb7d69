//! Reads of the platform state backing a cluster: pods and ready replicas.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ListParams;
use kube::{Api, Client};

use crate::controller::meta_cache::ClusterKey;
use crate::controller::topology::RedisPod;
use crate::resources::common::{Component, label_selector, redis_name, sentinel_name};

/// Kubernetes reads for one operator instance.
#[derive(Clone)]
pub struct WorkloadReader {
    client: Client,
}

impl WorkloadReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Running Redis pods with an address.
    pub async fn redis_pods(&self, cluster: &ClusterKey) -> Result<Vec<RedisPod>, kube::Error> {
        self.pods(cluster, Component::Redis).await
    }

    /// Running Sentinel pods with an address.
    pub async fn sentinel_pods(&self, cluster: &ClusterKey) -> Result<Vec<RedisPod>, kube::Error> {
        self.pods(cluster, Component::Sentinel).await
    }

    async fn pods(
        &self,
        cluster: &ClusterKey,
        component: Component,
    ) -> Result<Vec<RedisPod>, kube::Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &cluster.namespace);
        let params = ListParams::default().labels(&label_selector(&cluster.name, component));
        let pods = api.list(&params).await?;
        Ok(running_pods(pods.items))
    }

    /// `readyReplicas` of the Redis StatefulSet; zero when it does not exist.
    pub async fn redis_ready_replicas(&self, cluster: &ClusterKey) -> Result<i32, kube::Error> {
        let api: Api<StatefulSet> = Api::namespaced(self.client.clone(), &cluster.namespace);
        let sts = api.get_opt(&redis_name(&cluster.name)).await?;
        Ok(sts
            .and_then(|s| s.status)
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0))
    }

    /// `readyReplicas` of the Sentinel Deployment; zero when it does not exist.
    pub async fn sentinel_ready_replicas(&self, cluster: &ClusterKey) -> Result<i32, kube::Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &cluster.namespace);
        let deploy = api.get_opt(&sentinel_name(&cluster.name)).await?;
        Ok(deploy
            .and_then(|d| d.status)
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0))
    }
}

/// Keep pods that are Running, have an IP and are not being deleted.
pub fn running_pods(pods: Vec<Pod>) -> Vec<RedisPod> {
    pods.into_iter()
        .filter(|p| p.metadata.deletion_timestamp.is_none())
        .filter_map(|p| {
            let status = p.status?;
            if status.phase.as_deref() != Some("Running") {
                return None;
            }
            let address = status.pod_ip.filter(|ip| !ip.is_empty())?;
            let created_at = p
                .metadata
                .creation_timestamp
                .and_then(|t| jiff::Timestamp::from_second(t.0.timestamp()).ok())
                .unwrap_or(jiff::Timestamp::UNIX_EPOCH);
            Some(RedisPod {
                address,
                created_at,
            })
        })
        .collect()
}
