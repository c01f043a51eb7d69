//! Observed topology of one Redis/Sentinel cluster.
//!
//! A [`TopologySnapshot`] is rebuilt from live reads on every pass and never
//! persisted.

use std::fmt;

/// Credentials shared by every Redis node in a cluster.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    pub password: Option<String>,
}

impl AuthConfig {
    pub fn new(password: Option<String>) -> Self {
        Self { password }
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Role a Redis node reports for itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRole {
    Master,
    Slave,
    /// Node could not be probed.
    Unknown,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Slave => write!(f, "slave"),
            NodeRole::Unknown => write!(f, "unknown"),
        }
    }
}

/// One Redis node as seen during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisNode {
    pub address: String,
    pub role: NodeRole,
    pub config_compliant: bool,
}

/// What one Sentinel believes about the cluster. The belief may be stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelView {
    pub address: String,
    /// Master address the sentinel monitors, if any.
    pub monitored_master: Option<String>,
    pub known_slaves: Option<u32>,
    pub known_sentinels: Option<u32>,
}

/// Observed state of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologySnapshot {
    redis_nodes: Vec<RedisNode>,
    sentinels: Vec<SentinelView>,
    master: Option<String>,
}

impl TopologySnapshot {
    /// Build a snapshot. The master address is only resolved when exactly
    /// one node reports the master role.
    pub fn new(redis_nodes: Vec<RedisNode>, sentinels: Vec<SentinelView>) -> Self {
        let mut masters = redis_nodes.iter().filter(|n| n.role == NodeRole::Master);
        let master = match (masters.next(), masters.next()) {
            (Some(only), None) => Some(only.address.clone()),
            _ => None,
        };
        Self {
            redis_nodes,
            sentinels,
            master,
        }
    }

    pub fn sentinels(&self) -> &[SentinelView] {
        &self.sentinels
    }

    /// The single master, if exactly one exists.
    pub fn master(&self) -> Option<&str> {
        self.master.as_deref()
    }

    pub fn master_count(&self) -> usize {
        self.redis_nodes
            .iter()
            .filter(|n| n.role == NodeRole::Master)
            .count()
    }

    /// Nodes that are not the resolved master.
    pub fn replicas(&self) -> impl Iterator<Item = &RedisNode> {
        self.redis_nodes
            .iter()
            .filter(move |n| Some(n.address.as_str()) != self.master.as_deref())
    }

    /// First sentinel address, published as the cluster's sentinel entry point.
    pub fn sentinel_entry_point(&self) -> Option<&str> {
        self.sentinels.first().map(|s| s.address.as_str())
    }
}

/// A running Redis pod and when it was created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisPod {
    pub address: String,
    pub created_at: jiff::Timestamp,
}

/// Pick the pod to elect as master: earliest creation time, ties broken by
/// address ascending.
pub fn select_oldest(pods: &[RedisPod]) -> Option<&RedisPod> {
    pods.iter()
        .min_by(|a, b| (a.created_at, &a.address).cmp(&(b.created_at, &b.address)))
}

/// Whether live replica counts match the desired ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaCounts {
    pub redis_ok: bool,
    pub sentinel_ok: bool,
}
