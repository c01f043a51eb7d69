//! Services in front of Redis and Sentinel.
//!
//! - **Redis headless Service**: stable DNS for the StatefulSet pods
//! - **Sentinel Service**: entry point clients use to discover the master

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::{REDIS_PORT, RedisSentinel, SENTINEL_PORT};
use crate::resources::common::{
    Component, component_labels, object_meta, redis_name, selector_labels, sentinel_name,
};

/// Generate the headless Service governing the Redis StatefulSet.
pub fn generate_redis_service(
    resource: &RedisSentinel,
    labels: &BTreeMap<String, String>,
    owner_refs: &[OwnerReference],
) -> Service {
    let labels = component_labels(labels, Component::Redis);
    Service {
        metadata: object_meta(
            redis_name(&resource.name_any()),
            resource.namespace(),
            &labels,
            &resource.spec.annotations,
            owner_refs,
        ),
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(selector_labels(&resource.name_any(), Component::Redis)),
            ports: Some(vec![port("redis", REDIS_PORT)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the ClusterIP Service for the Sentinels.
pub fn generate_sentinel_service(
    resource: &RedisSentinel,
    labels: &BTreeMap<String, String>,
    owner_refs: &[OwnerReference],
) -> Service {
    let labels = component_labels(labels, Component::Sentinel);
    Service {
        metadata: object_meta(
            sentinel_name(&resource.name_any()),
            resource.namespace(),
            &labels,
            &resource.spec.annotations,
            owner_refs,
        ),
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(selector_labels(&resource.name_any(), Component::Sentinel)),
            ports: Some(vec![port("sentinel", SENTINEL_PORT)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn port(name: &str, number: u16) -> ServicePort {
    ServicePort {
        port: i32::from(number),
        target_port: Some(IntOrString::String(name.to_string())),
        name: Some(name.to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}
