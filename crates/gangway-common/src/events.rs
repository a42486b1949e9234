//! Kubernetes Events for PodGroup decisions
//!
//! The reconciler reports what it did to a PodGroup through an injected
//! [`EventPublisher`], so decisions show up in `kubectl describe podgroup`
//! and tests can observe them without an API server.
//!
//! Publishing never fails from the caller's point of view. A rejected Event
//! is logged and dropped.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Why an Event was emitted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    /// PodGroup deleted because its owner has no replicas
    GangGroupReleased,
    /// Controlling owner's apiVersion is not `group/version`
    MalformedOwner,
    /// Owner's `spec.replicas` is not an integer
    InvalidScale,
}

impl Reason {
    /// REASON column value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GangGroupReleased => "GangGroupReleased",
            Self::MalformedOwner => "MalformedOwner",
            Self::InvalidScale => "InvalidScale",
        }
    }

    fn action(self) -> &'static str {
        match self {
            Self::GangGroupReleased => "Delete",
            Self::MalformedOwner | Self::InvalidScale => "InspectOwner",
        }
    }

    fn event_type(self) -> EventType {
        match self {
            Self::GangGroupReleased => EventType::Normal,
            Self::MalformedOwner | Self::InvalidScale => EventType::Warning,
        }
    }
}

/// One decision to report on a PodGroup
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GangEvent {
    /// Reason, which also fixes the type and action
    pub reason: Reason,
    /// Human-readable detail
    pub note: String,
}

impl GangEvent {
    /// Create an event for `reason`
    pub fn new(reason: Reason, note: impl Into<String>) -> Self {
        Self {
            reason,
            note: note.into(),
        }
    }

    fn into_kube_event(self) -> Event {
        Event {
            type_: self.reason.event_type(),
            reason: self.reason.as_str().to_string(),
            note: Some(self.note),
            action: self.reason.action().to_string(),
            secondary: None,
        }
    }
}

/// Sink for PodGroup Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Attach `event` to the object behind `regarding`
    async fn publish(&self, regarding: &ObjectReference, event: GangEvent);
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    /// `controller_name` becomes the Event's reporting component. The
    /// reporting instance is taken from `POD_NAME` when set.
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, regarding: &ObjectReference, event: GangEvent) {
        let reason = event.reason;
        if let Err(e) = self
            .recorder
            .publish(&event.into_kube_event(), regarding)
            .await
        {
            warn!(
                reason = reason.as_str(),
                object = ?regarding.name,
                error = %e,
                "failed to publish event"
            );
        }
    }
}

/// Discards every event
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _regarding: &ObjectReference, _event: GangEvent) {}
}
