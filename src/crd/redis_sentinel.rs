//! RedisSentinel Custom Resource Definition.
//!
//! A RedisSentinel describes N Redis replicas (one master, the rest replicas)
//! supervised by M Sentinel processes. The operator keeps that topology
//! singly-rooted: exactly one master, every replica pointing at it, and every
//! Sentinel monitoring it with an accurate view of its peers and replicas.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// RedisSentinel is a custom resource for deploying a Sentinel-supervised
/// Redis replication group.
///
/// Example:
/// ```yaml
/// apiVersion: redisoperator.dev/v1
/// kind: RedisSentinel
/// metadata:
///   name: cache
/// spec:
///   size: 3
///   config:
///     maxmemory-policy: allkeys-lru
///   auth:
///     secretRef:
///       name: cache-auth
///       key: password
///   sentinel:
///     replicas: 3
/// ```
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "redisoperator.dev",
    version = "v1",
    kind = "RedisSentinel",
    plural = "redissentinels",
    shortname = "rsen",
    status = "RedisSentinelStatus",
    namespaced,
    printcolumn = r#"{"name":"Size", "type":"integer", "jsonPath":".spec.size"}"#,
    printcolumn = r#"{"name":"Sentinels", "type":"integer", "jsonPath":".spec.sentinel.replicas"}"#,
    printcolumn = r#"{"name":"Master", "type":"string", "jsonPath":".status.masterIP"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.conditions[0].type"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisSentinelSpec {
    /// Number of Redis replicas (one of them is elected master).
    #[serde(default)]
    pub size: i32,

    /// Redis container image.
    #[serde(default)]
    pub image: ImageSpec,

    /// Override for the Redis container command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Redis configuration overlay, applied with CONFIG SET on every node.
    #[serde(default)]
    pub config: BTreeMap<String, String>,

    /// Shared password for every Redis node in the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSpec>,

    /// Disable RDB/AOF persistence.
    #[serde(default)]
    pub disable_persistence: bool,

    /// Volume configuration for Redis data.
    #[serde(default)]
    pub storage: StorageSpec,

    /// Resource requests and limits for Redis pods.
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,

    /// Additional labels to apply to all managed resources.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    /// Additional annotations to apply to all managed resources.
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Sentinel settings.
    #[serde(default)]
    pub sentinel: SentinelSpec,
}

/// Container image specification.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageSpec {
    /// Image repository (defaulted to `redis`).
    #[serde(default)]
    pub repository: String,

    /// Image tag (defaulted to `7.2-alpine`).
    #[serde(default)]
    pub tag: String,

    /// Image pull policy (defaulted to `IfNotPresent`).
    #[serde(default)]
    pub pull_policy: String,

    /// Image pull secrets.
    #[serde(default)]
    pub pull_secrets: Vec<String>,
}

impl ImageSpec {
    /// Full image reference (`repository:tag`).
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Authentication configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthSpec {
    /// Reference to a Secret containing the password.
    pub secret_ref: SecretKeyRef,
}

/// Reference to a key within a Secret.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Name of the Secret.
    pub name: String,

    /// Key within the Secret containing the password (default: password).
    #[serde(default = "default_password_key")]
    pub key: String,
}

fn default_password_key() -> String {
    "password".to_string()
}

/// Storage for Redis data.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Size of the PersistentVolumeClaim. An empty size means emptyDir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,

    /// Storage class name for the PersistentVolumeClaims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Keep PersistentVolumeClaims when the RedisSentinel is deleted.
    #[serde(default)]
    pub keep_after_deletion: bool,
}

/// Resource requests and limits.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    /// CPU and memory requests, e.g. `{"cpu": "100m", "memory": "256Mi"}`.
    #[serde(default)]
    pub requests: BTreeMap<String, String>,

    /// CPU and memory limits.
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

/// Sentinel cluster settings.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SentinelSpec {
    /// Number of Sentinel replicas.
    #[serde(default)]
    pub replicas: i32,

    /// Sentinel container image.
    #[serde(default)]
    pub image: ImageSpec,

    /// Override for the Sentinel container command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Extra `SENTINEL SET` directives, e.g. `down-after-milliseconds 5000`.
    #[serde(default)]
    pub custom_config: Vec<String>,

    /// Resource requests and limits for Sentinel pods.
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,
}

impl SentinelSpec {
    /// Majority of the configured Sentinels.
    pub fn quorum(&self) -> i32 {
        self.replicas / 2 + 1
    }

    /// `custom_config` as `(option, value)` pairs. Entries without a value
    /// are skipped.
    pub fn directives(&self) -> impl Iterator<Item = (&str, &str)> {
        self.custom_config
            .iter()
            .filter_map(|d| d.trim().split_once(char::is_whitespace))
            .map(|(option, value)| (option, value.trim()))
    }
}

/// Status of a RedisSentinel.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisSentinelStatus {
    /// Condition history, newest first, one entry per type.
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Last known master address.
    #[serde(rename = "masterIP", default, skip_serializing_if = "Option::is_none")]
    pub master_ip: Option<String>,

    /// Last known Sentinel entry point.
    #[serde(rename = "sentinelIP", default, skip_serializing_if = "Option::is_none")]
    pub sentinel_ip: Option<String>,

    /// The generation most recently observed by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Condition types for RedisSentinel.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ConditionType {
    /// Every topology check passed.
    Healthy,
    /// The cluster is being bootstrapped.
    Creating,
    /// Redis replicas are being added or removed.
    Scaling,
    /// Image or command changed.
    Upgrading,
    /// Any other spec change.
    Updating,
    /// The last pass failed and needs attention.
    Failed,
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionType::Healthy => write!(f, "Healthy"),
            ConditionType::Creating => write!(f, "Creating"),
            ConditionType::Scaling => write!(f, "Scaling"),
            ConditionType::Upgrading => write!(f, "Upgrading"),
            ConditionType::Updating => write!(f, "Updating"),
            ConditionType::Failed => write!(f, "Failed"),
        }
    }
}

/// Tri-state condition status.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Condition describes the state of a cluster at a certain point.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: ConditionType,
    /// Status of the condition.
    pub status: ConditionStatus,
    /// Last time this condition was set, even without changes.
    pub last_update_time: String,
    /// Last time the condition's status, reason or message changed.
    pub last_transition_time: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
}

impl Condition {
    /// Create a new condition stamped at `now`.
    pub fn new(
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: &str,
        message: &str,
        now: jiff::Timestamp,
    ) -> Self {
        let stamp = now.to_string();
        Self {
            r#type: condition_type,
            status,
            last_update_time: stamp.clone(),
            last_transition_time: stamp,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    /// Parsed `last_update_time`; unparseable stamps sort as oldest.
    pub fn updated_at(&self) -> jiff::Timestamp {
        self.last_update_time
            .parse()
            .unwrap_or(jiff::Timestamp::UNIX_EPOCH)
    }

    /// Whether status, reason and message all match `other`.
    pub fn same_state(&self, other: &Condition) -> bool {
        self.status == other.status && self.reason == other.reason && self.message == other.message
    }
}

/// Redis client port.
pub const REDIS_PORT: u16 = 6379;

/// Sentinel port.
pub const SENTINEL_PORT: u16 = 26379;

/// Name under which Sentinels monitor the master.
pub const MONITORED_MASTER_NAME: &str = "mymaster";
