//! Per-stage trace records.
//!
//! A [`TraceRecorder`] is owned by one execution of one run. Every stage
//! invocation that reaches a terminal outcome ends exactly one
//! [`TraceHandle`], which appends one immutable [`TraceRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Instant;

use crate::core::StageId;

/// Execution trace of one stage invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// Stage that ran.
    pub stage: StageId,
    /// Agent name of the stage.
    pub agent: String,
    /// When the invocation started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock latency in milliseconds, retries included.
    pub latency_ms: f64,
    /// Whether the stage succeeded.
    pub success: bool,
    /// Fingerprint of the stage input.
    pub input_fingerprint: String,
    /// Fingerprint of the stage output, or of the failure.
    pub output_fingerprint: String,
    /// Error message for failed invocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of collaborator attempts.
    #[serde(default)]
    pub attempts: usize,
    /// Per-item problems that were recovered inside the stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Fingerprints any serializable value: the first 16 hex characters of the
/// SHA-256 of its JSON form. For audit only, not for equality checks.
#[must_use]
pub fn fingerprint<T: Serialize + ?Sized>(value: &T) -> String {
    let json = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&json);
    hex::encode(&digest[..8])
}

/// An in-flight stage invocation.
#[derive(Debug)]
#[must_use = "a trace handle must be ended to record the invocation"]
pub struct TraceHandle {
    stage: StageId,
    started_at: DateTime<Utc>,
    start: Instant,
    input_fingerprint: String,
}

impl TraceHandle {
    /// Stage being traced.
    #[must_use]
    pub fn stage(&self) -> StageId {
        self.stage
    }

    /// Milliseconds since the invocation started.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// How a traced invocation ended.
#[derive(Debug, Clone)]
pub enum TraceOutcome {
    /// The stage produced an output.
    Success {
        /// Fingerprint of the output.
        output_fingerprint: String,
        /// Collaborator attempts.
        attempts: usize,
        /// Recovered per-item problems.
        warnings: Vec<String>,
    },
    /// The stage failed.
    Failure {
        /// Error message.
        error: String,
        /// Collaborator attempts.
        attempts: usize,
    },
}

/// Append-only trace list for one execution of a run.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    records: Vec<TraceRecord>,
}

impl TraceRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts timing an invocation of `stage` with the given input.
    pub fn start<T: Serialize + ?Sized>(&self, stage: StageId, input: &T) -> TraceHandle {
        TraceHandle {
            stage,
            started_at: Utc::now(),
            start: Instant::now(),
            input_fingerprint: fingerprint(input),
        }
    }

    /// Ends an invocation and appends its record.
    pub fn end(&mut self, handle: TraceHandle, outcome: TraceOutcome) -> &TraceRecord {
        let latency_ms = handle.elapsed_ms();
        let record = match outcome {
            TraceOutcome::Success {
                output_fingerprint,
                attempts,
                warnings,
            } => TraceRecord {
                stage: handle.stage,
                agent: handle.stage.agent_name().to_string(),
                started_at: handle.started_at,
                latency_ms,
                success: true,
                input_fingerprint: handle.input_fingerprint,
                output_fingerprint,
                error: None,
                attempts,
                warnings,
            },
            TraceOutcome::Failure { error, attempts } => TraceRecord {
                stage: handle.stage,
                agent: handle.stage.agent_name().to_string(),
                started_at: handle.started_at,
                latency_ms,
                success: false,
                input_fingerprint: handle.input_fingerprint,
                output_fingerprint: fingerprint(&error),
                error: Some(error),
                attempts,
                warnings: Vec::new(),
            },
        };
        self.records.push(record);
        // just pushed
        &self.records[self.records.len() - 1]
    }

    /// Records so far.
    #[must_use]
    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Consumes the recorder and returns its records.
    #[must_use]
    pub fn into_records(self) -> Vec<TraceRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = fingerprint(&serde_json::json!({"x": 1}));
        let b = fingerprint(&serde_json::json!({"x": 1}));
        let c = fingerprint(&serde_json::json!({"x": 2}));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_success_record() {
        let mut recorder = TraceRecorder::new();
        let handle = recorder.start(StageId::Extract, "normalized text");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let record = recorder.end(
            handle,
            TraceOutcome::Success {
                output_fingerprint: fingerprint(&["c1", "c2"]),
                attempts: 2,
                warnings: Vec::new(),
            },
        );

        assert!(record.success);
        assert_eq!(record.agent, "ClauseExtractionAgent");
        assert_eq!(record.attempts, 2);
        assert!(record.latency_ms >= 5.0);
        assert!(record.error.is_none());
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_failure_record() {
        let mut recorder = TraceRecorder::new();
        let handle = recorder.start(StageId::Summarize, &Vec::<String>::new());
        recorder.end(
            handle,
            TraceOutcome::Failure {
                error: "no findings".into(),
                attempts: 1,
            },
        );

        let records = recorder.into_records();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(records[0].error.as_deref(), Some("no findings"));
    }

    #[test]
    fn test_records_are_append_only_in_order() {
        let mut recorder = TraceRecorder::new();
        for stage in [StageId::Ingest, StageId::Extract, StageId::Score] {
            let handle = recorder.start(stage, &stage);
            recorder.end(
                handle,
                TraceOutcome::Success {
                    output_fingerprint: String::new(),
                    attempts: 1,
                    warnings: Vec::new(),
                },
            );
        }
        let stages: Vec<_> = recorder.records().iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![StageId::Ingest, StageId::Extract, StageId::Score]);
    }
}
