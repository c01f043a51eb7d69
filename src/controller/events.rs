//! Kubernetes events emitted while reconciling a cluster.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};

/// Named notifications for a cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    Creating(String),
    ScalingUp(String),
    ScalingDown(String),
    Updating(String),
    Upgrading(String),
    Ensuring,
    Checking,
    Failed(String),
    Healthy,
}

impl ClusterEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            ClusterEvent::Failed(_) => EventType::Warning,
            _ => EventType::Normal,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ClusterEvent::Creating(_) => "CreateCluster",
            ClusterEvent::ScalingUp(_) => "NewSlaveAdd",
            ClusterEvent::ScalingDown(_) => "SlaveRemove",
            ClusterEvent::Updating(_) => "UpdateCluster",
            ClusterEvent::Upgrading(_) => "UpgradedCluster",
            ClusterEvent::Ensuring => "EnsureCluster",
            ClusterEvent::Checking => "CheckCluster",
            ClusterEvent::Failed(_) => "FailedCluster",
            ClusterEvent::Healthy => "HealthCluster",
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            ClusterEvent::Creating(_) => "Bootstrap",
            ClusterEvent::ScalingUp(_) | ClusterEvent::ScalingDown(_) => "Scaling",
            ClusterEvent::Updating(_) => "Updating",
            ClusterEvent::Upgrading(_) => "Upgrading",
            ClusterEvent::Ensuring => "Ensure",
            ClusterEvent::Checking => "CheckAndHeal",
            ClusterEvent::Failed(_) | ClusterEvent::Healthy => "Reconcile",
        }
    }

    pub fn note(&self) -> String {
        match self {
            ClusterEvent::Creating(msg)
            | ClusterEvent::ScalingUp(msg)
            | ClusterEvent::ScalingDown(msg)
            | ClusterEvent::Updating(msg)
            | ClusterEvent::Upgrading(msg)
            | ClusterEvent::Failed(msg) => msg.clone(),
            ClusterEvent::Ensuring => "Makes sure of redis cluster ready".to_string(),
            ClusterEvent::Checking => "Check and heal the redis cluster problems".to_string(),
            ClusterEvent::Healthy => "Redis cluster is healthy".to_string(),
        }
    }
}

/// Fire-and-forget event publisher.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: ClusterEvent);
}

/// Publishes events against one RedisSentinel object.
pub struct KubeEventSink {
    recorder: Recorder,
    object_ref: ObjectReference,
}

impl KubeEventSink {
    pub fn new(recorder: Recorder, object_ref: ObjectReference) -> Self {
        Self {
            recorder,
            object_ref,
        }
    }
}

#[async_trait]
impl EventSink for KubeEventSink {
    async fn publish(&self, event: ClusterEvent) {
        let reason = event.reason();
        if let Err(e) = self
            .recorder
            .publish(
                &Event {
                    type_: event.event_type(),
                    reason: reason.into(),
                    note: Some(event.note()),
                    action: event.action().into(),
                    secondary: None,
                },
                &self.object_ref,
            )
            .await
        {
            tracing::warn!(reason = %reason, error = %e, "Failed to publish event");
        }
    }
}
