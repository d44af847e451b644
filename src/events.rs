//! Event sink (§1 "persistent logging of events (sink interface only)").
//!
//! The spec treats the actual persistence backend as an external
//! collaborator — only the sink's contract matters here. Grounded on
//! `dns/logging.rs` (`EventCategory`, `LogLevel`, structured event emission
//! over `tracing`), narrowed to the state-transition events this crate
//! actually produces.

use chrono::{DateTime, Local};

use crate::ids::{NodeId, ResourceId};
use crate::status::Status;

#[derive(Debug, Clone)]
pub enum ClusterEvent {
    ClusterStarted,
    ClusterStopped,
    ConfigurationReloaded,
    ConfigurationReloadFailed { reason: String },
    ResourceDnsResultPublished { resource_id: ResourceId, status: Status },
    SynchronizeCompleted { resource_id: ResourceId, local: NodeId, remote: NodeId, status: crate::sync::OperationStatus },
    TestCompleted { resource_id: ResourceId, local: NodeId, remote: NodeId, status: crate::sync::OperationStatus },
    OperationTimedOut { resource_id: ResourceId, local: NodeId, remote: NodeId, operation: &'static str },
}

#[derive(Debug, Clone)]
pub struct EventRecord {
    pub at: DateTime<Local>,
    pub event: ClusterEvent,
}

/// §4.8: the domain logger of state transitions, distinct from ordinary
/// per-subsystem operational logs (§10.1).
pub trait EventSink: Send + Sync {
    fn record(&self, event: ClusterEvent);
}

/// Default sink: emits every event through `tracing` at a level matching
/// its severity (§10.1's level table).
#[derive(Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn record(&self, event: ClusterEvent) {
        match &event {
            ClusterEvent::ClusterStarted => tracing::info!("cluster started"),
            ClusterEvent::ClusterStopped => tracing::info!("cluster stopped"),
            ClusterEvent::ConfigurationReloaded => tracing::info!("configuration reloaded"),
            ClusterEvent::ConfigurationReloadFailed { reason } => {
                tracing::warn!(reason = %reason, "configuration reload failed")
            }
            ClusterEvent::ResourceDnsResultPublished { resource_id, status } => {
                if *status == Status::Inconsistent {
                    tracing::warn!(resource = %resource_id, ?status, "resource DNS result published");
                } else {
                    tracing::debug!(resource = %resource_id, ?status, "resource DNS result published");
                }
            }
            ClusterEvent::SynchronizeCompleted { resource_id, local, remote, status } => {
                tracing::info!(resource = %resource_id, %local, %remote, ?status, "synchronize completed");
            }
            ClusterEvent::TestCompleted { resource_id, local, remote, status } => {
                tracing::debug!(resource = %resource_id, %local, %remote, ?status, "test completed");
            }
            ClusterEvent::OperationTimedOut { resource_id, local, remote, operation } => {
                tracing::warn!(resource = %resource_id, %local, %remote, operation, "operation timed out");
            }
        }
    }
}

/// In-memory sink for tests: records every event it receives, in order.
#[derive(Default)]
pub struct RecordingEventSink {
    events: parking_lot::Mutex<Vec<EventRecord>>,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, event: ClusterEvent) {
        self.events.lock().push(EventRecord { at: Local::now(), event });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_preserves_order() {
        let sink = RecordingEventSink::default();
        sink.record(ClusterEvent::ClusterStarted);
        sink.record(ClusterEvent::ClusterStopped);
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].event, ClusterEvent::ClusterStarted));
        assert!(matches!(events[1].event, ClusterEvent::ClusterStopped));
    }
}
