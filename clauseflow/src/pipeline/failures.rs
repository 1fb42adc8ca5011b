//! Stage failure handling.
//!
//! A whole-stage failure is either absorbed by substituting the stage's
//! default slot, or aborts the run. Storage failures always abort: no later
//! slot can be written while the failed slot is missing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::StageId;
use crate::errors::ClauseflowError;

/// How whole-stage failures are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureMode {
    /// Substitute the default slot and continue (default).
    #[default]
    Degrade,
    /// Stop the run at the first failed stage.
    Abort,
}

impl FailureMode {
    /// Mode matching the `graceful_degradation` flag.
    #[must_use]
    pub fn from_degradation(enabled: bool) -> Self {
        if enabled {
            Self::Degrade
        } else {
            Self::Abort
        }
    }

    /// What to do with a failed stage.
    #[must_use]
    pub fn action_for(self, error: &ClauseflowError) -> FailureAction {
        match (self, error) {
            (_, ClauseflowError::Storage(_)) | (Self::Abort, _) => FailureAction::Abort,
            (Self::Degrade, _) => FailureAction::Degrade,
        }
    }
}

/// Decision for one failed stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Write the default slot and continue.
    Degrade,
    /// Stop the run.
    Abort,
}

/// Record of a stage failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Stage that failed.
    pub stage: StageId,
    /// Human-readable message.
    pub error: String,
    /// Error type name.
    pub error_type: String,
    /// Whether a default slot was persisted in place of the stage output.
    pub degraded: bool,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    /// Creates a record for `error` raised by `stage`.
    #[must_use]
    pub fn new(stage: StageId, error: &ClauseflowError) -> Self {
        Self {
            stage,
            error: error.to_string(),
            error_type: error.kind().to_string(),
            degraded: false,
            timestamp: Utc::now(),
        }
    }
}

/// Collects failures in the order they happen.
#[derive(Debug, Default)]
pub struct FailureCollector {
    failures: Vec<FailureRecord>,
}

impl FailureCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure.
    pub fn record(&mut self, failure: FailureRecord) {
        self.failures.push(failure);
    }

    /// Marks the latest failure of `stage` as absorbed by degradation.
    ///
    /// Called only once the default slot has been persisted.
    pub fn mark_degraded(&mut self, stage: StageId) {
        if let Some(failure) = self.failures.iter_mut().rev().find(|f| f.stage == stage) {
            failure.degraded = true;
        }
    }

    /// Returns true if anything failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Failure records.
    #[must_use]
    pub fn failures(&self) -> &[FailureRecord] {
        &self.failures
    }

    /// Messages in failure order.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.error.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;

    #[test]
    fn test_storage_errors_always_abort() {
        let storage = ClauseflowError::Storage(StoreError::Io("disk full".into()));
        assert_eq!(FailureMode::Degrade.action_for(&storage), FailureAction::Abort);
        assert_eq!(FailureMode::Abort.action_for(&storage), FailureAction::Abort);
    }

    #[test]
    fn test_mode_from_flag() {
        let err = ClauseflowError::Extraction("x".into());
        assert_eq!(
            FailureMode::from_degradation(true).action_for(&err),
            FailureAction::Degrade
        );
        assert_eq!(
            FailureMode::from_degradation(false).action_for(&err),
            FailureAction::Abort
        );
    }

    #[test]
    fn test_collector_keeps_order() {
        let mut collector = FailureCollector::new();
        assert!(!collector.has_failures());
        collector.record(FailureRecord::new(
            StageId::Extract,
            &ClauseflowError::Extraction("a".into()),
        ));
        collector.record(FailureRecord::new(
            StageId::Summarize,
            &ClauseflowError::Summary("b".into()),
        ));
        collector.mark_degraded(StageId::Extract);

        assert_eq!(
            collector.messages(),
            vec!["Extraction error: a".to_string(), "Summary error: b".to_string()]
        );
        assert!(collector.failures()[0].degraded);
        assert!(!collector.failures()[1].degraded);
        assert_eq!(collector.failures()[1].error_type, "SummaryError");
    }

    #[test]
    fn test_failures_start_undegraded() {
        let mut collector = FailureCollector::new();
        collector.record(FailureRecord::new(
            StageId::Score,
            &ClauseflowError::Scoring("batch rejected".into()),
        ));
        assert!(!collector.failures()[0].degraded);

        // unknown stage leaves records untouched
        collector.mark_degraded(StageId::Audit);
        assert!(!collector.failures()[0].degraded);
    }
}
