//! Error types for the controller.
//!
//! Two layers: [`ProbeError`] is what a single observer read or healer write
//! fails with, [`Error`] is what a reconciliation pass fails with. The
//! classification methods on [`Error`] decide between rescheduling the pass
//! and reporting the cluster as failed.

use std::time::Duration;

use thiserror::Error;

use crate::client::RedisError;

/// Failure of one observer or healer call.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Kubernetes API error while reading workload state
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Redis or Sentinel protocol error against one node
    #[error("node {node}: {source}")]
    Redis {
        node: String,
        #[source]
        source: RedisError,
    },

    /// No node currently reports the master role
    #[error("no master found")]
    NoMaster,

    /// Workload state is not usable (no pods, missing addresses)
    #[error("workload: {0}")]
    Workload(String),
}

impl ProbeError {
    /// Wrap a protocol error with the node it happened on.
    pub fn redis(node: impl Into<String>, source: RedisError) -> Self {
        ProbeError::Redis {
            node: node.into(),
            source,
        }
    }
}

/// Error type for controller operations
#[derive(Error, Debug)]
pub enum Error {
    /// Expected resources are not there yet; reschedule without marking the
    /// cluster unhealthy
    #[error("need requeue: {0}")]
    NeedRequeue(String),

    /// A read against the platform or a node failed
    #[error("probe failed: {0}")]
    Probe(#[source] ProbeError),

    /// Split topology, left for a human to resolve
    #[error("more than one master, fix manually ({count} masters)")]
    MultipleMasters { count: usize },

    /// A reset sentinel did not rediscover its replicas in time
    #[error("wait for restore sentinel slave timeout: sentinel {sentinel} after {waited:?}")]
    SentinelRestoreTimeout { sentinel: String, waited: Duration },

    /// A corrective write failed
    #[error("{action} failed: {source}")]
    Heal {
        action: &'static str,
        #[source]
        source: ProbeError,
    },

    /// Workload resources could not be created or updated
    #[error("ensure resources: {0}")]
    EnsureResources(String),

    /// Validation error in resource spec
    #[error("Validation error: {0}")]
    Validation(String),

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Missing required field in resource
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The whole pass ran past its deadline
    #[error("reconciliation pass exceeded {0:?}")]
    PassTimeout(Duration),
}

impl Error {
    /// Build a heal error for `action`.
    pub fn heal(action: &'static str, source: ProbeError) -> Self {
        Error::Heal { action, source }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Whether this error only asks for the pass to be rescheduled.
    ///
    /// Retry signals never set the Failed condition.
    pub fn is_retry_signal(&self) -> bool {
        matches!(self, Error::NeedRequeue(_) | Error::Probe(_))
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::NeedRequeue(_) | Error::Probe(_) | Error::PassTimeout(_) => true,
            Error::Kube(e) => {
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::MultipleMasters { .. }
            | Error::SentinelRestoreTimeout { .. }
            | Error::Heal { .. }
            | Error::EnsureResources(_)
            | Error::Validation(_)
            | Error::MissingField(_)
            | Error::Serialization(_) => false,
        }
    }

    /// Get the recommended requeue duration for this error
    pub fn requeue_after(&self, retry_delay: Duration) -> Duration {
        if self.is_retryable() {
            retry_delay
        } else {
            Duration::from_secs(300)
        }
    }
}

impl From<ProbeError> for Error {
    fn from(e: ProbeError) -> Self {
        Error::Probe(e)
    }
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, Error>;
