//! Stage output slots.

use serde::{Deserialize, Serialize};

use super::{AuditBundle, Finding, IngestOutput, Proposal, Segment, StageId, SummaryBundle};
use crate::observability::TraceRecord;

/// The persisted output of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", content = "value", rename_all = "snake_case")]
pub enum Slot {
    /// Normalized document and metadata.
    Ingest(IngestOutput),
    /// Extracted segments, in document order.
    Extract(Vec<Segment>),
    /// One finding per segment.
    Score(Vec<Finding>),
    /// Proposals for actionable findings.
    Propose(Vec<Proposal>),
    /// Summary bundle.
    Summarize(SummaryBundle),
    /// Final audit bundle.
    Audit(Box<AuditBundle>),
}

impl Slot {
    /// Returns the stage this payload belongs to.
    #[must_use]
    pub fn stage(&self) -> StageId {
        match self {
            Self::Ingest(_) => StageId::Ingest,
            Self::Extract(_) => StageId::Extract,
            Self::Score(_) => StageId::Score,
            Self::Propose(_) => StageId::Propose,
            Self::Summarize(_) => StageId::Summarize,
            Self::Audit(_) => StageId::Audit,
        }
    }

    /// The value substituted for a failed stage when degradation is enabled.
    #[must_use]
    pub fn degraded_default(stage: StageId, run_id: &str, traces: Vec<TraceRecord>) -> Self {
        match stage {
            StageId::Ingest => Self::Ingest(IngestOutput::default()),
            StageId::Extract => Self::Extract(Vec::new()),
            StageId::Score => Self::Score(Vec::new()),
            StageId::Propose => Self::Propose(Vec::new()),
            StageId::Summarize => Self::Summarize(SummaryBundle::default()),
            StageId::Audit => Self::Audit(Box::new(AuditBundle::empty(run_id, traces))),
        }
    }
}

/// Every slot of a run, as seen by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSlots {
    /// Ingest output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingest: Option<IngestOutput>,
    /// Extracted segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<Segment>>,
    /// Findings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<Finding>>,
    /// Proposals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposals: Option<Vec<Proposal>>,
    /// Summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryBundle>,
    /// Audit bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit: Option<AuditBundle>,
}

impl RunSlots {
    /// Stores a slot payload in its field.
    pub fn insert(&mut self, slot: Slot) {
        match slot {
            Slot::Ingest(v) => self.ingest = Some(v),
            Slot::Extract(v) => self.segments = Some(v),
            Slot::Score(v) => self.findings = Some(v),
            Slot::Propose(v) => self.proposals = Some(v),
            Slot::Summarize(v) => self.summary = Some(v),
            Slot::Audit(v) => self.audit = Some(*v),
        }
    }

    /// Returns true if the slot of `stage` is populated.
    #[must_use]
    pub fn contains(&self, stage: StageId) -> bool {
        match stage {
            StageId::Ingest => self.ingest.is_some(),
            StageId::Extract => self.segments.is_some(),
            StageId::Score => self.findings.is_some(),
            StageId::Propose => self.proposals.is_some(),
            StageId::Summarize => self.summary.is_some(),
            StageId::Audit => self.audit.is_some(),
        }
    }

    /// Number of populated slots.
    #[must_use]
    pub fn populated(&self) -> usize {
        StageId::ALL.iter().filter(|s| self.contains(**s)).count()
    }

    /// Segments, or an empty list when extraction produced nothing.
    #[must_use]
    pub fn segments_or_empty(&self) -> &[Segment] {
        self.segments.as_deref().unwrap_or_default()
    }

    /// Findings, or an empty list.
    #[must_use]
    pub fn findings_or_empty(&self) -> &[Finding] {
        self.findings.as_deref().unwrap_or_default()
    }

    /// Proposals, or an empty list.
    #[must_use]
    pub fn proposals_or_empty(&self) -> &[Proposal] {
        self.proposals.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Severity;

    #[test]
    fn test_slot_stage_matches_variant() {
        assert_eq!(Slot::Extract(Vec::new()).stage(), StageId::Extract);
        assert_eq!(
            Slot::degraded_default(StageId::Audit, "r", Vec::new()).stage(),
            StageId::Audit
        );
        for stage in StageId::ALL {
            assert_eq!(Slot::degraded_default(stage, "r", Vec::new()).stage(), stage);
        }
    }

    #[test]
    fn test_slot_serialization_is_tagged() {
        let slot = Slot::Score(vec![Finding {
            segment_id: "c1".into(),
            severity: Severity::High,
            finding_type: "Unlimited Liability".into(),
            explanation: "No cap".into(),
            rationale: None,
        }]);
        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(json["stage"], "score");
        assert_eq!(json["value"][0]["severity"], "high");
    }

    #[test]
    fn test_run_slots_insert_and_contains() {
        let mut slots = RunSlots::default();
        assert_eq!(slots.populated(), 0);
        assert!(slots.segments_or_empty().is_empty());

        slots.insert(Slot::Ingest(IngestOutput::default()));
        slots.insert(Slot::Extract(Vec::new()));

        assert!(slots.contains(StageId::Ingest));
        assert!(slots.contains(StageId::Extract));
        assert!(!slots.contains(StageId::Score));
        assert_eq!(slots.populated(), 2);
    }
}
