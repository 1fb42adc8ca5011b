//! Aggregated result of one pipeline execution.

use serde::{Deserialize, Serialize};

use crate::core::{RunSlots, RunStatus, StageId};
use crate::observability::TraceRecord;

/// What `run` and `resume` return.
///
/// Errors are plain strings; callers never see internal error types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Run id.
    pub run_id: String,
    /// Final status.
    pub status: RunStatus,
    /// Every populated slot, resumed ones included.
    pub slots: RunSlots,
    /// Trace records of this execution, one per executed stage.
    pub traces: Vec<TraceRecord>,
    /// Error messages in the order they happened.
    pub errors: Vec<String>,
    /// Stages satisfied by an existing slot.
    pub skipped: Vec<StageId>,
    /// Stages whose slot was replaced by its default in this execution.
    pub degraded: Vec<StageId>,
    /// Wall-clock duration of the execution.
    pub elapsed_ms: f64,
}

impl PipelineResult {
    /// A failed result that never reached a stage.
    #[must_use]
    pub fn failed(run_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Failed,
            slots: RunSlots::default(),
            traces: Vec::new(),
            errors: vec![error.into()],
            skipped: Vec::new(),
            degraded: Vec::new(),
            elapsed_ms: 0.0,
        }
    }

    /// Returns true unless the run failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }

    /// Stages executed in this execution, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<StageId> {
        self.traces.iter().map(|t| t.stage).collect()
    }

    /// Failed trace records.
    pub fn failed_traces(&self) -> impl Iterator<Item = &TraceRecord> {
        self.traces.iter().filter(|t| !t.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result() {
        let result = PipelineResult::failed("r1", "Storage error: Run not found: r1");
        assert_eq!(result.status, RunStatus::Failed);
        assert!(!result.is_complete());
        assert_eq!(result.errors.len(), 1);
        assert!(result.executed().is_empty());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let result = PipelineResult::failed("r1", "x");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
    }
}
