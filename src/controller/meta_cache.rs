//! Per-cluster cache of the last desired spec and the inferred transition.
//!
//! Every pass calls [`ClusterMetaCache::cache`] with the spec it was handed.
//! The cache diffs it against the spec it saw last time for the same cluster
//! and records why the pass is running. Entries live until
//! [`ClusterMetaCache::delete`] is called for a deleted cluster.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::controller::topology::AuthConfig;
use crate::crd::{RedisSentinel, RedisSentinelSpec};

/// Namespaced identity of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    pub namespace: String,
    pub name: String,
}

impl ClusterKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key for a resource; `None` when the resource has no namespace or name.
    pub fn for_resource(obj: &RedisSentinel) -> Option<Self> {
        Some(Self::new(
            obj.metadata.namespace.clone()?,
            obj.metadata.name.clone()?,
        ))
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Why a pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionPhase {
    /// First pass seen for this cluster.
    Create,
    ScaleUp,
    ScaleDown,
    /// Image or command changed.
    Upgrade,
    /// Any other spec change, sentinel replicas included.
    Update,
    /// Spec unchanged since the last pass.
    Check,
}

impl TransitionPhase {
    /// Metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionPhase::Create => "create",
            TransitionPhase::ScaleUp => "scale_up",
            TransitionPhase::ScaleDown => "scale_down",
            TransitionPhase::Upgrade => "upgrade",
            TransitionPhase::Update => "update",
            TransitionPhase::Check => "check",
        }
    }
}

/// Cached view of a cluster for one pass.
#[derive(Debug, Clone)]
pub struct Meta {
    pub key: ClusterKey,
    pub spec: RedisSentinelSpec,
    pub auth: AuthConfig,
    pub phase: TransitionPhase,
    pub message: String,
}

/// Keyed store of [`Meta`], safe to share across concurrent passes.
#[derive(Debug, Default)]
pub struct ClusterMetaCache {
    entries: DashMap<ClusterKey, Arc<Meta>>,
}

impl ClusterMetaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `spec` for `key` and return the resulting meta.
    ///
    /// The diff against the previous spec and the overwrite happen under the
    /// entry lock, so two passes for one cluster cannot interleave here.
    pub fn cache(&self, key: ClusterKey, spec: RedisSentinelSpec, auth: AuthConfig) -> Arc<Meta> {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                let (phase, message) = infer_phase(&entry.get().spec, &spec);
                let meta = Arc::new(Meta {
                    key,
                    spec,
                    auth,
                    phase,
                    message,
                });
                entry.insert(Arc::clone(&meta));
                meta
            }
            Entry::Vacant(entry) => {
                let meta = Arc::new(Meta {
                    key,
                    spec,
                    auth,
                    phase: TransitionPhase::Create,
                    message: "Bootstrap redis cluster".to_string(),
                });
                entry.insert(Arc::clone(&meta));
                meta
            }
        }
    }

    pub fn get(&self, key: &ClusterKey) -> Option<Arc<Meta>> {
        self.entries.get(key).map(|m| Arc::clone(m.value()))
    }

    /// Forget a cluster. Returns whether an entry existed.
    pub fn delete(&self, key: &ClusterKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Classify the change from `old` to `new`.
///
/// A size change wins over an image or command change made in the same
/// edit.
pub fn infer_phase(old: &RedisSentinelSpec, new: &RedisSentinelSpec) -> (TransitionPhase, String) {
    if old == new {
        return (TransitionPhase::Check, "Check redis cluster".to_string());
    }

    if new.size > old.size {
        return (
            TransitionPhase::ScaleUp,
            format!("Scaling up redis from {} to {}", old.size, new.size),
        );
    }
    if new.size < old.size {
        return (
            TransitionPhase::ScaleDown,
            format!("Scaling down redis from {} to {}", old.size, new.size),
        );
    }

    if old.image != new.image || old.sentinel.image != new.sentinel.image {
        return (
            TransitionPhase::Upgrade,
            format!(
                "Upgrading redis from {} to {}",
                old.image.reference(),
                new.image.reference()
            ),
        );
    }
    if old.command != new.command || old.sentinel.command != new.sentinel.command {
        return (
            TransitionPhase::Upgrade,
            "Upgrading redis command".to_string(),
        );
    }

    if old.sentinel.replicas != new.sentinel.replicas {
        return (
            TransitionPhase::Update,
            format!(
                "Scaling sentinel from {} to {}",
                old.sentinel.replicas, new.sentinel.replicas
            ),
        );
    }

    (TransitionPhase::Update, "Updating redis cluster".to_string())
}
