//! Stage collaborators and the dispatch of one stage invocation.
//!
//! Each stage's domain logic is supplied by an external collaborator behind
//! a narrow trait. [`StageExecutors`] bundles them and turns the slots
//! accumulated so far into the input of one collaborator call.

mod audit;
mod score;

pub use audit::DefaultAuditor;
pub use score::score_segments;

use async_trait::async_trait;
use futures::future::join_all;
use std::fmt::Debug;
use std::sync::Arc;

use crate::core::{
    AuditBundle, Finding, IngestOutput, NormalizedDocument, Proposal, RunSlots, Segment,
    SeedInput, Slot, StageId, SummaryBundle,
};
use crate::errors::{ClauseflowError, Result};
use crate::observability::{TraceHandle, TraceRecord, TraceRecorder};

/// Normalizes the source document and extracts its metadata.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ingestor: Send + Sync {
    /// Parses the seed. Fails with [`ClauseflowError::Parsing`] on bad input.
    async fn ingest(&self, seed: &SeedInput) -> Result<IngestOutput>;
}

/// Splits a normalized document into segments.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extracts segments in document order.
    async fn extract(&self, document: &NormalizedDocument) -> Result<Vec<Segment>>;
}

/// Assesses the risk of segments.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Scores one segment.
    async fn score_segment(&self, segment: &Segment) -> Result<Finding>;

    /// Scores a batch, one result per segment in input order.
    ///
    /// The default fans out over [`score_segment`](Self::score_segment)
    /// concurrently. An `Err` here fails the whole stage; per-item errors
    /// belong in the inner results.
    async fn score_all(&self, segments: &[Segment]) -> Result<Vec<Result<Finding>>> {
        Ok(join_all(segments.iter().map(|s| self.score_segment(s))).await)
    }
}

/// Proposes alternative language for actionable findings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Proposer: Send + Sync {
    /// Called with medium and high findings only, and the segments they
    /// refer to.
    async fn propose(&self, segments: &[Segment], findings: &[Finding]) -> Result<Vec<Proposal>>;
}

/// Synthesizes the negotiation summary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Builds the summary. Never called without findings.
    async fn summarize(
        &self,
        segments: &[Segment],
        findings: &[Finding],
        proposals: &[Proposal],
    ) -> Result<SummaryBundle>;
}

/// Compiles the final audit bundle.
#[async_trait]
pub trait Auditor: Send + Sync {
    /// Compiles the bundle from every slot and the full trace history.
    async fn audit(
        &self,
        run_id: &str,
        slots: &RunSlots,
        traces: &[TraceRecord],
    ) -> Result<AuditBundle>;
}

/// The six collaborators of a pipeline.
#[derive(Clone)]
pub struct StageExecutors {
    /// Ingest collaborator.
    pub ingestor: Arc<dyn Ingestor>,
    /// Extract collaborator.
    pub extractor: Arc<dyn Extractor>,
    /// Score collaborator.
    pub scorer: Arc<dyn Scorer>,
    /// Propose collaborator.
    pub proposer: Arc<dyn Proposer>,
    /// Summarize collaborator.
    pub summarizer: Arc<dyn Summarizer>,
    /// Audit collaborator, [`DefaultAuditor`] unless replaced.
    pub auditor: Arc<dyn Auditor>,
}

impl Debug for StageExecutors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutors").finish_non_exhaustive()
    }
}

impl StageExecutors {
    /// Bundles the five content collaborators with the default auditor.
    #[must_use]
    pub fn new(
        ingestor: Arc<dyn Ingestor>,
        extractor: Arc<dyn Extractor>,
        scorer: Arc<dyn Scorer>,
        proposer: Arc<dyn Proposer>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            ingestor,
            extractor,
            scorer,
            proposer,
            summarizer,
            auditor: Arc::new(DefaultAuditor),
        }
    }

    /// Replaces the auditor.
    #[must_use]
    pub fn with_auditor(mut self, auditor: Arc<dyn Auditor>) -> Self {
        self.auditor = auditor;
        self
    }

    /// Runs one attempt of `stage` against the accumulated input.
    pub async fn invoke(&self, stage: StageId, input: &StageInput<'_>) -> Result<StageProduct> {
        let slots = input.slots;
        match stage {
            StageId::Ingest => {
                let output = self.ingestor.ingest(input.seed).await?;
                Ok(StageProduct::new(Slot::Ingest(output)))
            }
            StageId::Extract => {
                let Some(ingest) = slots.ingest.as_ref() else {
                    return Err(ClauseflowError::Extraction(
                        "no normalized document available".to_string(),
                    ));
                };
                let segments = self.extractor.extract(&ingest.document).await?;
                Ok(StageProduct::new(Slot::Extract(segments)))
            }
            StageId::Score => {
                let (findings, warnings) =
                    score_segments(self.scorer.as_ref(), slots.segments_or_empty()).await?;
                Ok(StageProduct {
                    slot: Slot::Score(findings),
                    warnings,
                })
            }
            StageId::Propose => {
                let findings: Vec<Finding> = slots
                    .findings_or_empty()
                    .iter()
                    .filter(|f| f.severity.is_actionable())
                    .cloned()
                    .collect();
                if findings.is_empty() {
                    return Ok(StageProduct::new(Slot::Propose(Vec::new())));
                }
                let segments: Vec<Segment> = slots
                    .segments_or_empty()
                    .iter()
                    .filter(|s| findings.iter().any(|f| f.segment_id == s.id))
                    .cloned()
                    .collect();
                let proposals = self.proposer.propose(&segments, &findings).await?;
                Ok(StageProduct::new(Slot::Propose(proposals)))
            }
            StageId::Summarize => {
                let findings = slots.findings_or_empty();
                if findings.is_empty() {
                    return Err(ClauseflowError::Summary(
                        "no findings available to summarize".to_string(),
                    ));
                }
                let summary = self
                    .summarizer
                    .summarize(slots.segments_or_empty(), findings, slots.proposals_or_empty())
                    .await?;
                Ok(StageProduct::new(Slot::Summarize(summary)))
            }
            StageId::Audit => {
                let bundle = self
                    .auditor
                    .audit(input.run_id, slots, input.traces)
                    .await?;
                Ok(StageProduct::new(Slot::Audit(Box::new(bundle))))
            }
        }
    }
}

/// Everything a stage may read.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    /// Run being executed.
    pub run_id: &'a str,
    /// Seed of the run.
    pub seed: &'a SeedInput,
    /// Slots accumulated so far.
    pub slots: &'a RunSlots,
    /// Trace history, used by the audit stage.
    pub traces: &'a [TraceRecord],
}

impl StageInput<'_> {
    /// Starts a trace fingerprinting the part of the input `stage` reads.
    pub fn start_trace(&self, recorder: &TraceRecorder, stage: StageId) -> TraceHandle {
        let slots = self.slots;
        match stage {
            StageId::Ingest => recorder.start(stage, self.seed),
            StageId::Extract => recorder.start(stage, &slots.ingest),
            StageId::Score => recorder.start(stage, slots.segments_or_empty()),
            StageId::Propose => recorder.start(stage, slots.findings_or_empty()),
            StageId::Summarize => recorder.start(
                stage,
                &(slots.findings_or_empty(), slots.proposals_or_empty()),
            ),
            StageId::Audit => recorder.start(stage, slots),
        }
    }
}

/// Successful output of one stage invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct StageProduct {
    /// Slot to persist.
    pub slot: Slot,
    /// Per-item problems recovered inside the stage.
    pub warnings: Vec<String>,
}

impl StageProduct {
    fn new(slot: Slot) -> Self {
        Self {
            slot,
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;
    use crate::testing::{sample_executors, segment};

    fn finding(id: &str, severity: Severity) -> Finding {
        Finding {
            segment_id: id.into(),
            severity,
            finding_type: "t".into(),
            explanation: "e".into(),
            rationale: None,
        }
    }

    fn input<'a>(seed: &'a SeedInput, slots: &'a RunSlots) -> StageInput<'a> {
        StageInput {
            run_id: "run-1",
            seed,
            slots,
            traces: &[],
        }
    }

    #[tokio::test]
    async fn test_propose_only_sees_actionable_findings() {
        let mut proposer = MockProposer::new();
        proposer
            .expect_propose()
            .withf(|segments, findings| {
                segments.iter().map(|s| s.id.as_str()).collect::<Vec<_>>() == ["c1", "c3"]
                    && findings.len() == 2
            })
            .times(1)
            .returning(|_, findings| {
                Ok(findings
                    .iter()
                    .map(|f| Proposal {
                        segment_id: f.segment_id.clone(),
                        original: String::new(),
                        proposed: String::new(),
                        rationale: String::new(),
                        diff: String::new(),
                    })
                    .collect())
            });

        let executors = StageExecutors {
            proposer: Arc::new(proposer),
            ..sample_executors()
        };
        let seed = SeedInput::from_source("x");
        let slots = RunSlots {
            segments: Some(vec![segment("c1", "a"), segment("c2", "b"), segment("c3", "c")]),
            findings: Some(vec![
                finding("c1", Severity::High),
                finding("c2", Severity::Low),
                finding("c3", Severity::Medium),
            ]),
            ..RunSlots::default()
        };

        let product = executors
            .invoke(StageId::Propose, &input(&seed, &slots))
            .await
            .unwrap();
        match product.slot {
            Slot::Propose(proposals) => assert_eq!(proposals.len(), 2),
            other => panic!("unexpected slot {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_propose_without_actionable_findings_skips_collaborator() {
        let mut proposer = MockProposer::new();
        proposer.expect_propose().times(0);
        let executors = StageExecutors {
            proposer: Arc::new(proposer),
            ..sample_executors()
        };
        let seed = SeedInput::from_source("x");
        let slots = RunSlots {
            findings: Some(vec![finding("c1", Severity::Low)]),
            ..RunSlots::default()
        };

        let product = executors
            .invoke(StageId::Propose, &input(&seed, &slots))
            .await
            .unwrap();
        assert_eq!(product.slot, Slot::Propose(Vec::new()));
    }

    #[tokio::test]
    async fn test_summarize_without_findings_fails_before_collaborator() {
        let mut summarizer = MockSummarizer::new();
        summarizer.expect_summarize().times(0);
        let executors = StageExecutors {
            summarizer: Arc::new(summarizer),
            ..sample_executors()
        };
        let seed = SeedInput::from_source("x");
        let slots = RunSlots {
            findings: Some(Vec::new()),
            ..RunSlots::default()
        };

        let err = executors
            .invoke(StageId::Summarize, &input(&seed, &slots))
            .await
            .unwrap_err();
        assert!(matches!(err, ClauseflowError::Summary(_)));
    }

    #[tokio::test]
    async fn test_extract_passes_normalized_document() {
        let mut extractor = MockExtractor::new();
        extractor
            .expect_extract()
            .withf(|doc| doc.text == "1. Term")
            .times(1)
            .returning(|_| Ok(vec![segment("c1", "1. Term")]));
        let executors = StageExecutors {
            extractor: Arc::new(extractor),
            ..sample_executors()
        };
        let seed = SeedInput::from_source("x");
        let mut ingest = IngestOutput::default();
        ingest.document.text = "1. Term".into();
        let slots = RunSlots {
            ingest: Some(ingest),
            ..RunSlots::default()
        };

        let product = executors
            .invoke(StageId::Extract, &input(&seed, &slots))
            .await
            .unwrap();
        assert_eq!(product.slot, Slot::Extract(vec![segment("c1", "1. Term")]));
    }

    #[tokio::test]
    async fn test_trace_fingerprint_depends_on_stage_input() {
        let recorder = TraceRecorder::new();
        let seed = SeedInput::from_source("x");
        let empty = RunSlots::default();
        let with_segments = RunSlots {
            segments: Some(vec![segment("c1", "a")]),
            ..RunSlots::default()
        };

        let a = input(&seed, &empty).start_trace(&recorder, StageId::Score);
        let b = input(&seed, &with_segments).start_trace(&recorder, StageId::Score);
        let mut recorder = recorder;
        let outcome = crate::observability::TraceOutcome::Success {
            output_fingerprint: String::new(),
            attempts: 1,
            warnings: Vec::new(),
        };
        let fa = recorder.end(a, outcome.clone()).input_fingerprint.clone();
        let fb = recorder.end(b, outcome).input_fingerprint.clone();
        assert_ne!(fa, fb);
    }
}
