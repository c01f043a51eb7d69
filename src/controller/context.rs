//! Shared context for the controller.
//!
//! The Context struct holds shared state that is passed to the reconciler:
//! the Kubernetes client, the event reporter identity, the per-cluster spec
//! cache and the reconciliation handler wired to live Redis nodes.

use std::sync::Arc;

use kube::runtime::events::{Recorder, Reporter};
use kube::{Client, Resource};

use crate::config::OperatorConfig;
use crate::controller::engine::ReconciliationEngine;
use crate::controller::events::KubeEventSink;
use crate::controller::handler::ClusterHandler;
use crate::controller::healer::LiveHealer;
use crate::controller::meta_cache::ClusterMetaCache;
use crate::controller::observer::LiveObserver;
use crate::controller::workload::WorkloadReader;
use crate::crd::RedisSentinel;
use crate::health::{ClusterMetrics, HealthState};
use crate::resources::{FIELD_MANAGER, KubeWorkloads};

/// Handler type driving live clusters.
pub type LiveHandler = ClusterHandler<LiveObserver, LiveHealer>;

/// Shared context for the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Event reporter identity
    reporter: Reporter,
    /// Optional health state for metrics and readiness
    pub health_state: Option<Arc<HealthState>>,
    /// Last seen spec per cluster
    pub meta_cache: Arc<ClusterMetaCache>,
    pub handler: LiveHandler,
    pub config: OperatorConfig,
}

impl Context {
    /// Create a new context
    pub fn new(
        client: Client,
        health_state: Option<Arc<HealthState>>,
        config: OperatorConfig,
    ) -> Self {
        let meta_cache = Arc::new(ClusterMetaCache::new());
        let redis = config.redis_client_config();
        let engine = ReconciliationEngine::new(
            LiveObserver::new(WorkloadReader::new(client.clone()), redis),
            LiveHealer::new(WorkloadReader::new(client.clone()), redis),
            config.engine_config(),
        );
        let metrics = health_state
            .clone()
            .map(|state| state as Arc<dyn ClusterMetrics>);
        let handler = ClusterHandler::new(
            engine,
            meta_cache.clone(),
            Arc::new(KubeWorkloads::new(client.clone())),
            metrics,
            config.requeue_delay,
        );

        Self {
            client,
            reporter: Reporter {
                controller: FIELD_MANAGER.into(),
                instance: std::env::var("POD_NAME").ok(),
            },
            health_state,
            meta_cache,
            handler,
            config,
        }
    }

    /// Create an event recorder for publishing Kubernetes events
    fn recorder(&self) -> Recorder {
        Recorder::new(self.client.clone(), self.reporter.clone())
    }

    /// Event sink bound to one RedisSentinel
    pub fn event_sink(&self, resource: &RedisSentinel) -> KubeEventSink {
        KubeEventSink::new(self.recorder(), resource.object_ref(&()))
    }
}
