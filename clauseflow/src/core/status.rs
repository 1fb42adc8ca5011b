//! Stage identifiers, severities and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Normalizes the source document and extracts metadata.
    Ingest,
    /// Splits the document into segments.
    Extract,
    /// Assigns a risk finding to every segment.
    Score,
    /// Proposes alternative language for actionable findings.
    Propose,
    /// Synthesizes checklist, narrative and priority issues.
    Summarize,
    /// Compiles the final audit bundle.
    Audit,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [Self; 6] = [
        Self::Ingest,
        Self::Extract,
        Self::Score,
        Self::Propose,
        Self::Summarize,
        Self::Audit,
    ];

    /// Number of stages in the pipeline.
    pub const COUNT: usize = Self::ALL.len();

    /// Returns the slot index of the stage.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Ingest => 0,
            Self::Extract => 1,
            Self::Score => 2,
            Self::Propose => 3,
            Self::Summarize => 4,
            Self::Audit => 5,
        }
    }

    /// Returns the stage at a slot index.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Returns the stage that runs before this one.
    #[must_use]
    pub fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Returns the stage that runs after this one.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Stable snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Extract => "extract",
            Self::Score => "score",
            Self::Propose => "propose",
            Self::Summarize => "summarize",
            Self::Audit => "audit",
        }
    }

    /// Name of the agent that implements the stage, as recorded in traces.
    #[must_use]
    pub const fn agent_name(self) -> &'static str {
        match self {
            Self::Ingest => "IngestionAgent",
            Self::Extract => "ClauseExtractionAgent",
            Self::Score => "RiskScoringAgent",
            Self::Propose => "RedlineSuggestionAgent",
            Self::Summarize => "NegotiationSummaryAgent",
            Self::Audit => "ComplianceAuditAgent",
        }
    }

    /// Returns true if the stage calls external services whose transient
    /// failures are retried. Audit is structural and never retried.
    #[must_use]
    pub const fn retries_transient(self) -> bool {
        !matches!(self, Self::Audit)
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a risk finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// No action needed.
    #[default]
    Low,
    /// Worth negotiating.
    Medium,
    /// Must be addressed.
    High,
}

impl Severity {
    /// Returns true if findings of this severity get a proposal.
    #[must_use]
    pub const fn is_actionable(self) -> bool {
        matches!(self, Self::Medium | Self::High)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Final status of one pipeline execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every executed stage succeeded.
    Completed,
    /// All stages ran but at least one was degraded.
    CompletedWithErrors,
    /// The run was aborted.
    Failed,
}

impl RunStatus {
    /// Returns true if the run reached the audit stage.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithErrors)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::CompletedWithErrors => write!(f, "completed_with_errors"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
