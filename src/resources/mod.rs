//! Workload resources owned by a RedisSentinel.
//!
//! ## Resources Generated
//!
//! | Resource | Purpose |
//! |----------|---------|
//! | StatefulSet | Redis replicas with stable identity |
//! | Headless Service | DNS for the Redis pods |
//! | ConfigMap | Bootstrap `sentinel.conf` |
//! | Deployment | Sentinel processes |
//! | Service | Sentinel entry point |

pub mod common;
pub mod configmaps;
pub mod redis_statefulset;
pub mod sentinel_deployment;
pub mod services;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::RedisSentinel;

pub use common::{FIELD_MANAGER, cluster_labels, owner_reference};

/// Creates or updates the platform objects backing a cluster.
#[async_trait]
pub trait WorkloadResources: Send + Sync {
    async fn ensure_resources(
        &self,
        resource: &RedisSentinel,
        labels: &BTreeMap<String, String>,
        owner_refs: &[OwnerReference],
    ) -> Result<()>;
}

/// Server-side applies every managed object.
#[derive(Clone)]
pub struct KubeWorkloads {
    client: Client,
}

impl KubeWorkloads {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadResources for KubeWorkloads {
    async fn ensure_resources(
        &self,
        resource: &RedisSentinel,
        labels: &BTreeMap<String, String>,
        owner_refs: &[OwnerReference],
    ) -> Result<()> {
        let namespace = resource
            .namespace()
            .ok_or_else(|| Error::MissingField("metadata.namespace".to_string()))?;
        let params = PatchParams::apply(FIELD_MANAGER).force();

        let redis_svc = services::generate_redis_service(resource, labels, owner_refs);
        let sts = redis_statefulset::generate_redis_statefulset(resource, labels, owner_refs);
        let cm = configmaps::generate_sentinel_configmap(resource, labels, owner_refs);
        let deploy = sentinel_deployment::generate_sentinel_deployment(resource, labels, owner_refs);
        let sentinel_svc = services::generate_sentinel_service(resource, labels, owner_refs);

        let services: Api<Service> = Api::namespaced(self.client.clone(), &namespace);
        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), &namespace);
        let configmaps: Api<ConfigMap> = Api::namespaced(self.client.clone(), &namespace);
        let deployments: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);

        services
            .patch(&redis_svc.name_any(), &params, &Patch::Apply(&redis_svc))
            .await?;
        statefulsets
            .patch(&sts.name_any(), &params, &Patch::Apply(&sts))
            .await?;
        configmaps
            .patch(&cm.name_any(), &params, &Patch::Apply(&cm))
            .await?;
        deployments
            .patch(&deploy.name_any(), &params, &Patch::Apply(&deploy))
            .await?;
        services
            .patch(&sentinel_svc.name_any(), &params, &Patch::Apply(&sentinel_svc))
            .await?;

        debug!(name = %resource.name_any(), namespace = %namespace, "Applied workload resources");
        Ok(())
    }
}
