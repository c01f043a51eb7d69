//! Bootstrap configuration for Sentinel.
//!
//! Sentinels start out monitoring a placeholder master; the operator points
//! them at the elected master once the Redis pods are up.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;

use crate::crd::{MONITORED_MASTER_NAME, RedisSentinel, SENTINEL_PORT};
use crate::resources::common::{Component, component_labels, object_meta, sentinel_name};

/// Key of the Sentinel config file in the ConfigMap.
pub const SENTINEL_CONF_KEY: &str = "sentinel.conf";

/// Render the bootstrap `sentinel.conf`.
///
/// The custom directives go in here too, so sentinels run with them from
/// their first start.
pub fn sentinel_conf(resource: &RedisSentinel) -> String {
    let sentinel = &resource.spec.sentinel;
    let mut lines = vec![
        format!("port {SENTINEL_PORT}"),
        format!(
            "sentinel monitor {MONITORED_MASTER_NAME} 127.0.0.1 6379 {}",
            sentinel.quorum()
        ),
        format!("sentinel parallel-syncs {MONITORED_MASTER_NAME} 2"),
    ];
    lines.extend(
        sentinel
            .directives()
            .map(|(option, value)| format!("sentinel {option} {MONITORED_MASTER_NAME} {value}")),
    );
    lines.join("\n") + "\n"
}

/// Generate the Sentinel ConfigMap.
pub fn generate_sentinel_configmap(
    resource: &RedisSentinel,
    labels: &BTreeMap<String, String>,
    owner_refs: &[OwnerReference],
) -> ConfigMap {
    let labels = component_labels(labels, Component::Sentinel);
    ConfigMap {
        metadata: object_meta(
            sentinel_name(&resource.name_any()),
            resource.namespace(),
            &labels,
            &resource.spec.annotations,
            owner_refs,
        ),
        data: Some(BTreeMap::from([(
            SENTINEL_CONF_KEY.to_string(),
            sentinel_conf(resource),
        )])),
        ..Default::default()
    }
}
