//! Deployment running the Sentinel processes.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, ExecAction, PodSpec,
    PodTemplateSpec, Probe, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::ResourceExt;

use crate::crd::{RedisSentinel, SENTINEL_PORT};
use crate::resources::common::{
    Component, component_labels, object_meta, pull_secrets, resource_requirements,
    selector_labels, sentinel_name,
};
use crate::resources::configmaps::SENTINEL_CONF_KEY;

const CONFIG_VOLUME: &str = "sentinel-config";
const WRITABLE_VOLUME: &str = "sentinel-config-writable";
const CONFIG_PATH: &str = "/redis";
const WRITABLE_PATH: &str = "/redis-writable";

/// Generate the Sentinel Deployment.
///
/// Sentinel rewrites its config file at runtime, so an init container copies
/// the ConfigMap contents into a writable emptyDir first.
pub fn generate_sentinel_deployment(
    resource: &RedisSentinel,
    labels: &BTreeMap<String, String>,
    owner_refs: &[OwnerReference],
) -> Deployment {
    let name = sentinel_name(&resource.name_any());
    let labels = component_labels(labels, Component::Sentinel);
    let spec = &resource.spec;
    let image = spec.sentinel.image.reference();

    Deployment {
        metadata: object_meta(
            name.clone(),
            resource.namespace(),
            &labels,
            &spec.annotations,
            owner_refs,
        ),
        spec: Some(DeploymentSpec {
            replicas: Some(spec.sentinel.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&resource.name_any(), Component::Sentinel)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers: Some(vec![Container {
                        name: "sentinel-config-copy".to_string(),
                        image: Some(image.clone()),
                        image_pull_policy: Some(spec.sentinel.image.pull_policy.clone()),
                        command: Some(vec![
                            "cp".to_string(),
                            format!("{CONFIG_PATH}/{SENTINEL_CONF_KEY}"),
                            format!("{WRITABLE_PATH}/{SENTINEL_CONF_KEY}"),
                        ]),
                        volume_mounts: Some(vec![
                            mount(CONFIG_VOLUME, CONFIG_PATH),
                            mount(WRITABLE_VOLUME, WRITABLE_PATH),
                        ]),
                        ..Default::default()
                    }]),
                    containers: vec![Container {
                        name: "sentinel".to_string(),
                        image: Some(image),
                        image_pull_policy: Some(spec.sentinel.image.pull_policy.clone()),
                        command: Some(sentinel_command(resource)),
                        ports: Some(vec![ContainerPort {
                            container_port: i32::from(SENTINEL_PORT),
                            name: Some("sentinel".to_string()),
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        resources: resource_requirements(&spec.sentinel.resources),
                        volume_mounts: Some(vec![mount(WRITABLE_VOLUME, CONFIG_PATH)]),
                        readiness_probe: Some(ping_probe(5)),
                        liveness_probe: Some(ping_probe(30)),
                        ..Default::default()
                    }],
                    image_pull_secrets: pull_secrets(&spec.sentinel.image.pull_secrets),
                    volumes: Some(vec![
                        Volume {
                            name: CONFIG_VOLUME.to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: name.clone(),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: WRITABLE_VOLUME.to_string(),
                            empty_dir: Some(EmptyDirVolumeSource::default()),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn sentinel_command(resource: &RedisSentinel) -> Vec<String> {
    if !resource.spec.sentinel.command.is_empty() {
        return resource.spec.sentinel.command.clone();
    }
    vec![
        "redis-server".to_string(),
        format!("{CONFIG_PATH}/{SENTINEL_CONF_KEY}"),
        "--sentinel".to_string(),
    ]
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

fn ping_probe(initial_delay: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "redis-cli".to_string(),
                "-h".to_string(),
                "127.0.0.1".to_string(),
                "-p".to_string(),
                SENTINEL_PORT.to_string(),
                "ping".to_string(),
            ]),
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        failure_threshold: Some(3),
        ..Default::default()
    }
}
