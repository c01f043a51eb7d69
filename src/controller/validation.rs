//! Defaulting and validation for RedisSentinel specs.
//!
//! Every pass works on a defaulted copy of the spec:
//! - Zero sizes and empty images get defaults
//! - The Redis config overlay gets the replication and persistence keys
//! - The result is checked against the minimum topology

use crate::controller::error::{Error, Result};
use crate::crd::{ImageSpec, RedisSentinel, RedisSentinelSpec};

/// Maximum length of a RedisSentinel name. Derived object names add suffixes
/// and must stay within the 63-character label limit.
pub const MAX_NAME_LENGTH: usize = 48;

/// Minimum number of Redis replicas.
pub const MIN_SIZE: i32 = 3;

/// Minimum number of Sentinels.
pub const MIN_SENTINELS: i32 = 3;

pub const DEFAULT_SIZE: i32 = 3;
pub const DEFAULT_SENTINELS: i32 = 3;
pub const DEFAULT_IMAGE_REPOSITORY: &str = "redis";
pub const DEFAULT_IMAGE_TAG: &str = "7.2-alpine";
pub const DEFAULT_PULL_POLICY: &str = "IfNotPresent";

/// Sentinel directives used when none are configured.
pub const DEFAULT_SENTINEL_CONFIG: [&str; 2] =
    ["down-after-milliseconds 5000", "failover-timeout 10000"];

/// Config keys added when persistence is enabled, unless already set.
const PERSISTENCE_CONFIG: [(&str, &str); 8] = [
    ("appendonly", "yes"),
    ("auto-aof-rewrite-min-size", "536870912"),
    ("auto-aof-rewrite-percentage", "100"),
    ("repl-backlog-size", "62914560"),
    ("repl-diskless-sync", "yes"),
    ("aof-load-truncated", "yes"),
    ("stop-writes-on-bgsave-error", "no"),
    ("save", "900 1 300 10"),
];

/// Fill unset fields and overlay the managed Redis config keys.
pub fn apply_defaults(spec: &mut RedisSentinelSpec) {
    if spec.size == 0 {
        spec.size = DEFAULT_SIZE;
    }
    if spec.sentinel.replicas == 0 {
        spec.sentinel.replicas = DEFAULT_SENTINELS;
    }
    default_image(&mut spec.image);
    default_image(&mut spec.sentinel.image);
    if spec.sentinel.custom_config.is_empty() {
        spec.sentinel.custom_config = DEFAULT_SENTINEL_CONFIG.iter().map(|s| s.to_string()).collect();
    }

    let config = &mut spec.config;
    config.insert("slave-priority".to_string(), "1".to_string());
    if spec.disable_persistence {
        config.insert("appendonly".to_string(), "no".to_string());
        config.insert("save".to_string(), String::new());
    } else {
        for (key, value) in PERSISTENCE_CONFIG {
            config
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
    }
}

fn default_image(image: &mut ImageSpec) {
    if image.repository.is_empty() {
        image.repository = DEFAULT_IMAGE_REPOSITORY.to_string();
    }
    if image.tag.is_empty() {
        image.tag = DEFAULT_IMAGE_TAG.to_string();
    }
    if image.pull_policy.is_empty() {
        image.pull_policy = DEFAULT_PULL_POLICY.to_string();
    }
}

/// Validate a defaulted resource.
pub fn validate(resource: &RedisSentinel) -> Result<()> {
    validate_name(resource)?;
    validate_spec(&resource.spec)
}

fn validate_name(resource: &RedisSentinel) -> Result<()> {
    let name = resource
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| Error::MissingField("metadata.name".to_string()))?;
    if name.len() > MAX_NAME_LENGTH {
        return Err(Error::Validation(format!(
            "name length can't be higher than {MAX_NAME_LENGTH}"
        )));
    }
    Ok(())
}

/// Validate the topology sizes of a defaulted spec.
pub fn validate_spec(spec: &RedisSentinelSpec) -> Result<()> {
    if spec.size < MIN_SIZE {
        return Err(Error::Validation(format!(
            "number of redis replicas must be at least {MIN_SIZE}, got {}",
            spec.size
        )));
    }
    if spec.sentinel.replicas < MIN_SENTINELS {
        return Err(Error::Validation(format!(
            "number of sentinels must be at least {MIN_SENTINELS}, got {}",
            spec.sentinel.replicas
        )));
    }
    for directive in &spec.sentinel.custom_config {
        if directive.split_whitespace().count() < 2 {
            return Err(Error::Validation(format!(
                "sentinel config '{directive}' must be '<option> <value>'"
            )));
        }
    }
    Ok(())
}

/// Default then validate, returning the spec a pass should run with.
pub fn prepare(resource: &RedisSentinel) -> Result<RedisSentinelSpec> {
    let mut defaulted = resource.clone();
    apply_defaults(&mut defaulted.spec);
    validate(&defaulted)?;
    Ok(defaulted.spec)
}

/// Check if generation has changed since the last observed pass.
pub fn generation_changed(resource: &RedisSentinel) -> bool {
    let generation = resource.metadata.generation;
    let observed = resource.status.as_ref().and_then(|s| s.observed_generation);

    match (generation, observed) {
        (Some(current), Some(obs)) => current != obs,
        (Some(_), None) => true,
        _ => false,
    }
}
