//! Test fixtures for pipeline testing.

use std::sync::Arc;

use super::{ClauseExtractor, RuleScorer, TemplateProposer, TemplateSummarizer, TextIngestor};
use crate::core::{SeedInput, Segment};
use crate::stages::StageExecutors;

/// A three-clause contract: clause 1 scores high, clause 2 medium and
/// clause 3 low with [`RuleScorer`].
pub const SAMPLE_CONTRACT: &str = "MASTER SERVICES AGREEMENT between Acme Corp and Globex Inc.

1. Limitation of Liability: The Supplier's liability shall be unlimited for all claims.
2. Termination: Either party may terminate this Agreement without notice.
3. Governing Law: This Agreement is governed by the laws of Delaware.
";

/// Seed carrying [`SAMPLE_CONTRACT`].
#[must_use]
pub fn sample_seed() -> SeedInput {
    SeedInput::from_bytes("msa.txt", SAMPLE_CONTRACT.as_bytes().to_vec()).with_mime_type("text/plain")
}

/// A single-line segment on page 1.
#[must_use]
pub fn segment(id: &str, text: &str) -> Segment {
    Segment {
        id: id.to_string(),
        kind: "general".to_string(),
        text: text.to_string(),
        start_line: 1,
        end_line: 1,
        page_number: 1,
    }
}

/// Default scripted collaborators, kept as concrete types so tests can
/// inspect call counts.
#[derive(Debug, Clone)]
pub struct TestCollaborators {
    /// Ingest collaborator.
    pub ingestor: Arc<TextIngestor>,
    /// Extract collaborator.
    pub extractor: Arc<ClauseExtractor>,
    /// Score collaborator.
    pub scorer: Arc<RuleScorer>,
    /// Propose collaborator.
    pub proposer: Arc<TemplateProposer>,
    /// Summarize collaborator.
    pub summarizer: Arc<TemplateSummarizer>,
}

impl Default for TestCollaborators {
    fn default() -> Self {
        Self {
            ingestor: Arc::new(TextIngestor::new()),
            extractor: Arc::new(ClauseExtractor::new()),
            scorer: Arc::new(RuleScorer::new()),
            proposer: Arc::new(TemplateProposer::new()),
            summarizer: Arc::new(TemplateSummarizer::new()),
        }
    }
}

impl TestCollaborators {
    /// Creates the default collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the ingestor.
    #[must_use]
    pub fn with_ingestor(mut self, ingestor: TextIngestor) -> Self {
        self.ingestor = Arc::new(ingestor);
        self
    }

    /// Replaces the extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: ClauseExtractor) -> Self {
        self.extractor = Arc::new(extractor);
        self
    }

    /// Replaces the scorer.
    #[must_use]
    pub fn with_scorer(mut self, scorer: RuleScorer) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    /// Replaces the proposer.
    #[must_use]
    pub fn with_proposer(mut self, proposer: TemplateProposer) -> Self {
        self.proposer = Arc::new(proposer);
        self
    }

    /// Replaces the summarizer.
    #[must_use]
    pub fn with_summarizer(mut self, summarizer: TemplateSummarizer) -> Self {
        self.summarizer = Arc::new(summarizer);
        self
    }

    /// Calls per stage, Ingest through Summarize.
    #[must_use]
    pub fn calls(&self) -> [usize; 5] {
        [
            self.ingestor.calls(),
            self.extractor.calls(),
            self.scorer.calls(),
            self.proposer.calls(),
            self.summarizer.calls(),
        ]
    }

    /// Bundles the collaborators with the default auditor.
    #[must_use]
    pub fn executors(&self) -> StageExecutors {
        StageExecutors::new(
            self.ingestor.clone(),
            self.extractor.clone(),
            self.scorer.clone(),
            self.proposer.clone(),
            self.summarizer.clone(),
        )
    }
}

/// Executors built from fresh default collaborators.
#[must_use]
pub fn sample_executors() -> StageExecutors {
    TestCollaborators::new().executors()
}
