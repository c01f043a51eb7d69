//! Names, labels and owner references shared by every managed resource.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{LocalObjectReference, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;

use crate::crd::{RedisSentinel, ResourceRequirementsSpec};

/// Field manager name used for server-side apply.
pub const FIELD_MANAGER: &str = "redis-sentinel-operator";

const APP_NAME: &str = "redis-sentinel";

/// Which half of the cluster a resource belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Redis,
    Sentinel,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::Redis => "redis",
            Component::Sentinel => "sentinel",
        }
    }
}

/// Name of the Redis StatefulSet and its headless Service.
pub fn redis_name(cluster: &str) -> String {
    format!("{cluster}-redis")
}

/// Name of the Sentinel Deployment, Service and ConfigMap.
pub fn sentinel_name(cluster: &str) -> String {
    format!("{cluster}-sentinel")
}

/// Labels that select the pods of one component.
pub fn selector_labels(cluster: &str, component: Component) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/name".to_string(), APP_NAME.to_string()),
        ("app.kubernetes.io/instance".to_string(), cluster.to_string()),
        (
            "app.kubernetes.io/component".to_string(),
            component.as_str().to_string(),
        ),
    ])
}

/// Label selector string for listing the pods of one component.
pub fn label_selector(cluster: &str, component: Component) -> String {
    selector_labels(cluster, component)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Labels shared by every resource of a cluster: user labels first, the
/// operator's own labels on top.
pub fn cluster_labels(resource: &RedisSentinel) -> BTreeMap<String, String> {
    let mut labels = resource.spec.labels.clone();
    labels.insert("app.kubernetes.io/name".to_string(), APP_NAME.to_string());
    labels.insert("app.kubernetes.io/instance".to_string(), resource.name_any());
    labels.insert(
        "app.kubernetes.io/managed-by".to_string(),
        FIELD_MANAGER.to_string(),
    );
    labels
}

/// Cluster labels plus the component label.
pub fn component_labels(
    base: &BTreeMap<String, String>,
    component: Component,
) -> BTreeMap<String, String> {
    let mut labels = base.clone();
    labels.insert(
        "app.kubernetes.io/component".to_string(),
        component.as_str().to_string(),
    );
    labels
}

/// Controller owner reference pointing at the RedisSentinel.
pub fn owner_reference(resource: &RedisSentinel) -> OwnerReference {
    OwnerReference {
        api_version: "redisoperator.dev/v1".to_string(),
        kind: "RedisSentinel".to_string(),
        name: resource.name_any(),
        uid: resource.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Object metadata for a managed resource.
pub fn object_meta(
    name: String,
    namespace: Option<String>,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
    owner_refs: &[OwnerReference],
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace,
        labels: Some(labels.clone()),
        annotations: if annotations.is_empty() {
            None
        } else {
            Some(annotations.clone())
        },
        owner_references: Some(owner_refs.to_vec()),
        ..Default::default()
    }
}

/// Container resources from the CRD's string maps; `None` when both are empty.
pub fn resource_requirements(spec: &ResourceRequirementsSpec) -> Option<ResourceRequirements> {
    let quantities = |m: &BTreeMap<String, String>| {
        if m.is_empty() {
            None
        } else {
            Some(
                m.iter()
                    .map(|(k, v)| (k.clone(), Quantity(v.clone())))
                    .collect(),
            )
        }
    };

    if spec.requests.is_empty() && spec.limits.is_empty() {
        return None;
    }
    Some(ResourceRequirements {
        requests: quantities(&spec.requests),
        limits: quantities(&spec.limits),
        ..Default::default()
    })
}

/// Image pull secrets as object references.
pub fn pull_secrets(names: &[String]) -> Option<Vec<LocalObjectReference>> {
    if names.is_empty() {
        return None;
    }
    Some(
        names
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() })
            .collect(),
    )
}
