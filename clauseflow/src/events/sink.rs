//! Event sink trait and implementations.

use parking_lot::RwLock;
use tracing::{debug, info, warn, Level};

use super::{EventKind, PipelineEvent};

/// Receives pipeline events.
///
/// Emission must never fail the pipeline: implementations log and swallow
/// their own errors.
pub trait EventSink: Send + Sync {
    /// Emits an event.
    fn emit(&self, event: &PipelineEvent);
}

/// Discards all events. Used when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn emit(&self, _event: &PipelineEvent) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a sink that logs at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl EventSink for LoggingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        let stage = event.stage.map(|s| s.as_str()).unwrap_or("-");
        // failures are always surfaced, regardless of the configured level
        if matches!(event.kind, EventKind::StageFailed | EventKind::RunFailed) {
            warn!(event_type = %event.kind, run_id = %event.run_id, stage, data = %event.data, "Event: {}", event.kind);
            return;
        }
        if self.level == Level::DEBUG {
            debug!(event_type = %event.kind, run_id = %event.run_id, stage, data = %event.data, "Event: {}", event.kind);
        } else {
            info!(event_type = %event.kind, run_id = %event.run_id, stage, data = %event.data, "Event: {}", event.kind);
        }
    }
}

/// Collects events in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Kinds of all collected events, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.read().iter().map(|e| e.kind).collect()
    }

    /// Events of one kind.
    #[must_use]
    pub fn events_of(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &PipelineEvent) {
        self.events.write().push(event.clone());
    }
}
