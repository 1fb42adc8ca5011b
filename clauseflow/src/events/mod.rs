//! Pipeline events for observability.
//!
//! The orchestrator reports run and stage lifecycle changes to the
//! [`EventSink`] held by its context.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::StageId;

/// Kind of a pipeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// An execution of a run started.
    #[serde(rename = "run.started")]
    RunStarted,
    /// A stage was satisfied by an existing slot.
    #[serde(rename = "stage.skipped")]
    StageSkipped,
    /// A stage started executing.
    #[serde(rename = "stage.started")]
    StageStarted,
    /// A stage produced its slot.
    #[serde(rename = "stage.completed")]
    StageCompleted,
    /// A stage failed after retries.
    #[serde(rename = "stage.failed")]
    StageFailed,
    /// A failed stage's slot was replaced by its default.
    #[serde(rename = "stage.degraded")]
    StageDegraded,
    /// The run reached the audit stage.
    #[serde(rename = "run.completed")]
    RunCompleted,
    /// The run was aborted.
    #[serde(rename = "run.failed")]
    RunFailed,
    /// The run was cancelled between stages.
    #[serde(rename = "run.cancelled")]
    RunCancelled,
}

impl EventKind {
    /// Dotted event name, e.g. `stage.completed`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::StageSkipped => "stage.skipped",
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageFailed => "stage.failed",
            Self::StageDegraded => "stage.degraded",
            Self::RunCompleted => "run.completed",
            Self::RunFailed => "run.failed",
            Self::RunCancelled => "run.cancelled",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Run the event belongs to.
    pub run_id: String,
    /// Stage, for stage events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageId>,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// Extra data.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl PipelineEvent {
    /// Creates a run-level event.
    #[must_use]
    pub fn run(kind: EventKind, run_id: impl Into<String>) -> Self {
        Self {
            kind,
            run_id: run_id.into(),
            stage: None,
            timestamp: Utc::now(),
            data: serde_json::Value::Null,
        }
    }

    /// Creates a stage-level event.
    #[must_use]
    pub fn stage(kind: EventKind, run_id: impl Into<String>, stage: StageId) -> Self {
        Self {
            stage: Some(stage),
            ..Self::run(kind, run_id)
        }
    }

    /// Attaches data.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names() {
        assert_eq!(EventKind::StageDegraded.to_string(), "stage.degraded");
        let json = serde_json::to_string(&EventKind::RunCancelled).unwrap();
        assert_eq!(json, r#""run.cancelled""#);
    }

    #[test]
    fn test_stage_event_builder() {
        let event = PipelineEvent::stage(EventKind::StageFailed, "r1", StageId::Score)
            .with_data(serde_json::json!({"error": "boom"}));
        assert_eq!(event.stage, Some(StageId::Score));
        assert_eq!(event.data["error"], "boom");
    }
}
