//! Shared services handed to the orchestrator.
//!
//! The context replaces process-wide singletons: every run executed by an
//! orchestrator reads its store, event sink, metrics and shutdown token from
//! here.

use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::observability::MetricsCollector;
use crate::store::{InMemoryStateStore, StateStore};

/// Services shared by all runs of an orchestrator.
#[derive(Clone)]
pub struct OrchestratorContext {
    /// Stage state store.
    pub store: Arc<dyn StateStore>,
    /// Lifecycle event sink.
    pub events: Arc<dyn EventSink>,
    /// Metrics collector.
    pub metrics: Arc<MetricsCollector>,
    /// Checked before every stage.
    pub shutdown: CancellationToken,
}

impl OrchestratorContext {
    /// Creates a context around `store` with no event sink and fresh metrics.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            events: Arc::new(NoOpEventSink),
            metrics: Arc::new(MetricsCollector::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Creates a context backed by a fresh [`InMemoryStateStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStateStore::new()))
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets the metrics collector.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the shutdown token.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Emits an event to the configured sink.
    pub fn emit(&self, event: &PipelineEvent) {
        self.events.emit(event);
    }
}

impl std::fmt::Debug for OrchestratorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestratorContext")
            .field("shutdown", &self.shutdown)
            .finish_non_exhaustive()
    }
}
