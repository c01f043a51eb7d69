//! StatefulSet running the Redis replicas.
//!
//! Pods start as independent masters; the operator elects one of them and
//! attaches the rest after they become ready.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource, ExecAction,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe,
    SecretKeySelector, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::ResourceExt;

use crate::crd::{REDIS_PORT, RedisSentinel};
use crate::resources::common::{
    Component, component_labels, object_meta, pull_secrets, redis_name, resource_requirements,
    selector_labels,
};

const DATA_VOLUME: &str = "redis-data";
const DATA_PATH: &str = "/data";

/// Generate the Redis StatefulSet.
pub fn generate_redis_statefulset(
    resource: &RedisSentinel,
    labels: &BTreeMap<String, String>,
    owner_refs: &[OwnerReference],
) -> StatefulSet {
    let name = redis_name(&resource.name_any());
    let labels = component_labels(labels, Component::Redis);
    let spec = &resource.spec;

    StatefulSet {
        metadata: object_meta(
            name.clone(),
            resource.namespace(),
            &labels,
            &spec.annotations,
            owner_refs,
        ),
        spec: Some(StatefulSetSpec {
            replicas: Some(spec.size),
            service_name: Some(name),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&resource.name_any(), Component::Redis)),
                ..Default::default()
            },
            pod_management_policy: Some("Parallel".to_string()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    annotations: if spec.annotations.is_empty() {
                        None
                    } else {
                        Some(spec.annotations.clone())
                    },
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![redis_container(resource)],
                    image_pull_secrets: pull_secrets(&spec.image.pull_secrets),
                    volumes: if uses_pvc(resource) {
                        None
                    } else {
                        Some(vec![Volume {
                            name: DATA_VOLUME.to_string(),
                            empty_dir: Some(EmptyDirVolumeSource::default()),
                            ..Default::default()
                        }])
                    },
                    ..Default::default()
                }),
            },
            volume_claim_templates: if uses_pvc(resource) {
                Some(vec![pvc_template(resource)])
            } else {
                None
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Persistent volumes are used only when persistence is on and a size is set.
fn uses_pvc(resource: &RedisSentinel) -> bool {
    !resource.spec.disable_persistence && resource.spec.storage.size.is_some()
}

fn pvc_template(resource: &RedisSentinel) -> PersistentVolumeClaim {
    let size = resource.spec.storage.size.clone().unwrap_or_default();
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            labels: Some(selector_labels(&resource.name_any(), Component::Redis)),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: resource.spec.storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([("storage".to_string(), Quantity(size))])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn redis_container(resource: &RedisSentinel) -> Container {
    let spec = &resource.spec;
    let command = if spec.command.is_empty() {
        None
    } else {
        Some(spec.command.clone())
    };

    Container {
        name: "redis".to_string(),
        image: Some(spec.image.reference()),
        image_pull_policy: Some(spec.image.pull_policy.clone()),
        command,
        args: if spec.command.is_empty() {
            Some(redis_args(resource))
        } else {
            None
        },
        ports: Some(vec![ContainerPort {
            container_port: i32::from(REDIS_PORT),
            name: Some("redis".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: password_env(resource),
        resources: resource_requirements(&spec.resources),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_PATH.to_string(),
            ..Default::default()
        }]),
        readiness_probe: Some(ping_probe(5)),
        liveness_probe: Some(ping_probe(30)),
        ..Default::default()
    }
}

/// Arguments for the default `redis-server` entrypoint.
pub fn redis_args(resource: &RedisSentinel) -> Vec<String> {
    let mut args = vec![
        "--port".to_string(),
        REDIS_PORT.to_string(),
        "--protected-mode".to_string(),
        "no".to_string(),
        "--dir".to_string(),
        DATA_PATH.to_string(),
    ];
    if resource.spec.auth.is_some() {
        args.extend([
            "--requirepass".to_string(),
            "$(REDIS_PASSWORD)".to_string(),
            "--masterauth".to_string(),
            "$(REDIS_PASSWORD)".to_string(),
        ]);
    }
    args
}

/// Password from the auth Secret, for the server and for `redis-cli` probes.
fn password_env(resource: &RedisSentinel) -> Option<Vec<EnvVar>> {
    let auth = resource.spec.auth.as_ref()?;
    let from_secret = || {
        Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: auth.secret_ref.name.clone(),
                key: auth.secret_ref.key.clone(),
                optional: Some(false),
            }),
            ..Default::default()
        })
    };
    Some(vec![
        EnvVar {
            name: "REDIS_PASSWORD".to_string(),
            value_from: from_secret(),
            ..Default::default()
        },
        EnvVar {
            name: "REDISCLI_AUTH".to_string(),
            value_from: from_secret(),
            ..Default::default()
        },
    ])
}

fn ping_probe(initial_delay: i32) -> Probe {
    Probe {
        exec: Some(ExecAction {
            command: Some(vec![
                "redis-cli".to_string(),
                "-h".to_string(),
                "127.0.0.1".to_string(),
                "-p".to_string(),
                REDIS_PORT.to_string(),
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
