//! Scripted stage collaborators.
//!
//! Every collaborator counts its calls and can be told to fail its next
//! `n` calls with a given error.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;

use crate::core::{
    DocumentMetadata, Finding, IngestOutput, NormalizedDocument, Proposal, SeedInput, Segment,
    Severity, SummaryBundle,
};
use crate::errors::{ClauseflowError, Result};
use crate::stages::{Extractor, Ingestor, Proposer, Scorer, Summarizer};

static CLAUSE_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\.\s+(.*)$").expect("valid clause pattern"));
static PARTIES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)between\s+(.+?)\s+and\s+(.+?)[.,\n]").expect("valid parties pattern")
});
static JURISDICTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)laws of (?:the )?([A-Za-z][A-Za-z ]*?)[.,\n]").expect("valid law pattern")
});
static CONTRACT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^([A-Z][A-Z ]*AGREEMENT)").expect("valid contract type pattern")
});

/// Call counter plus an optional run of injected failures.
#[derive(Debug, Default)]
struct Script {
    calls: AtomicUsize,
    remaining_failures: AtomicUsize,
    error: Mutex<Option<ClauseflowError>>,
}

impl Script {
    fn fail_next(&self, times: usize, error: ClauseflowError) {
        *self.error.lock() = Some(error);
        self.remaining_failures.store(times, Ordering::SeqCst);
    }

    /// Counts a call and returns the injected failure, if any is left.
    fn call(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok();
        if should_fail {
            if let Some(err) = self.error.lock().clone() {
                return Err(err);
            }
        }
        Ok(())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

macro_rules! scripted {
    ($ty:ty) => {
        impl $ty {
            /// Fails the next `times` calls with `error`.
            #[must_use]
            pub fn failing(self, times: usize, error: ClauseflowError) -> Self {
                self.script.fail_next(times, error);
                self
            }

            /// Fails every call with `error`.
            #[must_use]
            pub fn always_failing(self, error: ClauseflowError) -> Self {
                self.failing(usize::MAX, error)
            }

            /// Number of calls so far.
            #[must_use]
            pub fn calls(&self) -> usize {
                self.script.calls()
            }
        }
    };
}

/// Reads the seed's bytes as UTF-8 text and pulls simple metadata from it.
#[derive(Debug, Default)]
pub struct TextIngestor {
    script: Script,
}

scripted!(TextIngestor);

impl TextIngestor {
    /// Creates an ingestor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ingestor for TextIngestor {
    async fn ingest(&self, seed: &SeedInput) -> Result<IngestOutput> {
        self.script.call()?;
        let Some(bytes) = seed.content.as_deref() else {
            return Err(ClauseflowError::Parsing(format!(
                "no content for {}",
                seed.source
            )));
        };
        let raw = std::str::from_utf8(bytes).map_err(|e| {
            ClauseflowError::Parsing(format!("{} is not valid UTF-8: {e}", seed.source))
        })?;

        let text = raw
            .replace("\r\n", "\n")
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");
        let page_count = u32::try_from(text.matches('\x0c').count() + 1).unwrap_or(u32::MAX);

        let parties = PARTIES
            .captures(&text)
            .map(|c| vec![c[1].trim().to_string(), c[2].trim().to_string()])
            .unwrap_or_default();
        let metadata = DocumentMetadata {
            parties,
            date: None,
            jurisdiction: JURISDICTION.captures(&text).map(|c| c[1].trim().to_string()),
            contract_type: CONTRACT_TYPE.captures(&text).map(|c| c[1].trim().to_string()),
        };

        Ok(IngestOutput {
            document: NormalizedDocument { text, page_count },
            metadata,
        })
    }
}

/// Splits text into numbered clauses (`1. ...`, `2. ...`).
///
/// Lines before the first numbered clause are ignored; other lines continue
/// the current clause.
#[derive(Debug, Default)]
pub struct ClauseExtractor {
    script: Script,
}

scripted!(ClauseExtractor);

impl ClauseExtractor {
    /// Creates an extractor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn clause_kind(body: &str) -> String {
    body.split_once(':')
        .map(|(heading, _)| heading.trim().to_lowercase().replace(' ', "_"))
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| "general".to_string())
}

#[async_trait]
impl Extractor for ClauseExtractor {
    async fn extract(&self, document: &NormalizedDocument) -> Result<Vec<Segment>> {
        self.script.call()?;
        let mut segments: Vec<Segment> = Vec::new();
        let mut page = 1;

        for (index, line) in document.text.lines().enumerate() {
            let line_no = u32::try_from(index + 1).unwrap_or(u32::MAX);
            page += u32::try_from(line.matches('\x0c').count()).unwrap_or(0);
            let line = line.trim_matches('\x0c');

            if let Some(caps) = CLAUSE_START.captures(line) {
                segments.push(Segment {
                    id: format!("c{}", &caps[1]),
                    kind: clause_kind(&caps[2]),
                    text: line.trim().to_string(),
                    start_line: line_no,
                    end_line: line_no,
                    page_number: page,
                });
            } else if let Some(current) = segments.last_mut() {
                if !line.trim().is_empty() {
                    current.text.push('\n');
                    current.text.push_str(line.trim());
                    current.end_line = line_no;
                }
            }
        }
        Ok(segments)
    }
}

/// Scores segments with keyword rules.
///
/// Unlimited liability is high risk; termination without notice and
/// automatic renewal are medium; everything else is low.
#[derive(Debug)]
pub struct RuleScorer {
    script: Script,
    rules: Vec<(Regex, Severity, &'static str)>,
    failing_segments: HashSet<String>,
}

scripted!(RuleScorer);

impl Default for RuleScorer {
    fn default() -> Self {
        let rules = [
            (
                r"(?i)unlimited liability|liability shall be unlimited",
                Severity::High,
                "Unlimited Liability",
            ),
            (
                r"(?i)without (?:prior )?notice",
                Severity::Medium,
                "Termination Without Notice",
            ),
            (r"(?i)automatic(?:ally)? renew", Severity::Medium, "Auto-Renewal"),
        ]
        .into_iter()
        .filter_map(|(pattern, severity, kind)| {
            Regex::new(pattern).ok().map(|re| (re, severity, kind))
        })
        .collect();

        Self {
            script: Script::default(),
            rules,
            failing_segments: HashSet::new(),
        }
    }
}

impl RuleScorer {
    /// Creates a scorer with the default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes scoring of one segment fail, without failing the batch.
    #[must_use]
    pub fn failing_on(mut self, segment_id: impl Into<String>) -> Self {
        self.failing_segments.insert(segment_id.into());
        self
    }
}

#[async_trait]
impl Scorer for RuleScorer {
    async fn score_segment(&self, segment: &Segment) -> Result<Finding> {
        if self.failing_segments.contains(&segment.id) {
            return Err(ClauseflowError::transient("model returned malformed JSON"));
        }
        let matched = self
            .rules
            .iter()
            .find(|(re, _, _)| re.is_match(&segment.text));
        Ok(match matched {
            Some((_, severity, kind)) => Finding {
                segment_id: segment.id.clone(),
                severity: *severity,
                finding_type: (*kind).to_string(),
                explanation: format!("{kind} detected in {}", segment.kind),
                rationale: None,
            },
            None => Finding {
                segment_id: segment.id.clone(),
                severity: Severity::Low,
                finding_type: "Standard Clause".to_string(),
                explanation: "No risk indicators found".to_string(),
                rationale: None,
            },
        })
    }

    async fn score_all(&self, segments: &[Segment]) -> Result<Vec<Result<Finding>>> {
        self.script.call()?;
        Ok(join_all(segments.iter().map(|s| self.score_segment(s))).await)
    }
}

/// Proposes a hedged rewrite for every finding it is given.
#[derive(Debug, Default)]
pub struct TemplateProposer {
    script: Script,
}

scripted!(TemplateProposer);

impl TemplateProposer {
    /// Creates a proposer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Proposer for TemplateProposer {
    async fn propose(&self, segments: &[Segment], findings: &[Finding]) -> Result<Vec<Proposal>> {
        self.script.call()?;
        findings
            .iter()
            .map(|finding| {
                let segment = segments
                    .iter()
                    .find(|s| s.id == finding.segment_id)
                    .ok_or_else(|| {
                        ClauseflowError::Proposal(format!(
                            "unknown segment {}",
                            finding.segment_id
                        ))
                    })?;
                let proposed = format!(
                    "{}, subject to a cap equal to the fees paid in the preceding twelve months \
                     and thirty days' written notice.",
                    segment.text.trim_end_matches('.')
                );
                Ok(Proposal {
                    segment_id: segment.id.clone(),
                    diff: format!("- {}\n+ {}", segment.text, proposed),
                    original: segment.text.clone(),
                    proposed,
                    rationale: format!("Mitigates {}", finding.finding_type),
                })
            })
            .collect()
    }
}

/// Builds a checklist and narrative from findings.
#[derive(Debug, Default)]
pub struct TemplateSummarizer {
    script: Script,
}

scripted!(TemplateSummarizer);

impl TemplateSummarizer {
    /// Creates a summarizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Summarizer for TemplateSummarizer {
    async fn summarize(
        &self,
        segments: &[Segment],
        findings: &[Finding],
        proposals: &[Proposal],
    ) -> Result<SummaryBundle> {
        self.script.call()?;
        let mut ranked: Vec<&Finding> = findings.iter().collect();
        ranked.sort_by(|a, b| b.severity.cmp(&a.severity));

        let high = findings.iter().filter(|f| f.severity == Severity::High).count();
        Ok(SummaryBundle {
            checklist: ranked
                .iter()
                .filter(|f| f.severity.is_actionable())
                .map(|f| format!("Negotiate {} ({})", f.finding_type, f.segment_id))
                .collect(),
            narrative: format!(
                "Reviewed {} clauses: {} findings, {high} high severity, {} proposed revisions.",
                segments.len(),
                findings.len(),
                proposals.len()
            ),
            priority_issues: ranked
                .iter()
                .map(|f| format!("[{}] {}", f.severity, f.finding_type))
                .collect(),
            draft_message: format!(
                "We would like to discuss {} points before signing.",
                proposals.len()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SAMPLE_CONTRACT;

    #[tokio::test]
    async fn test_text_ingestor_extracts_metadata() {
        let ingestor = TextIngestor::new();
        let seed = SeedInput::from_bytes("msa.txt", SAMPLE_CONTRACT.as_bytes().to_vec());
        let out = ingestor.ingest(&seed).await.unwrap();

        assert_eq!(out.document.page_count, 1);
        assert_eq!(out.metadata.parties, vec!["Acme Corp", "Globex Inc"]);
        assert_eq!(out.metadata.jurisdiction.as_deref(), Some("Delaware"));
        assert_eq!(
            out.metadata.contract_type.as_deref(),
            Some("MASTER SERVICES AGREEMENT")
        );
        assert_eq!(ingestor.calls(), 1);
    }

    #[tokio::test]
    async fn test_text_ingestor_requires_content() {
        let err = TextIngestor::new()
            .ingest(&SeedInput::from_source("missing.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClauseflowError::Parsing(_)));
    }

    #[tokio::test]
    async fn test_clause_extractor_splits_numbered_clauses() {
        let doc = NormalizedDocument {
            text: "Preamble\n1. Payment: Net 30.\nLate fees apply.\n2. Term\n".into(),
            page_count: 1,
        };
        let segments = ClauseExtractor::new().extract(&doc).await.unwrap();

        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].id, "c1");
        assert_eq!(segments[0].kind, "payment");
        assert_eq!(segments[0].start_line, 2);
        assert_eq!(segments[0].end_line, 3);
        assert!(segments[0].text.ends_with("Late fees apply."));
        assert_eq!(segments[1].kind, "general");
    }

    #[test]
    fn test_clause_extractor_tracks_form_feed_pages() {
        let doc = NormalizedDocument {
            text: "1. Scope: Services.\n\x0c2. Fees: Monthly.\n".into(),
            page_count: 2,
        };
        let segments = tokio_test::block_on(ClauseExtractor::new().extract(&doc)).unwrap();

        assert_eq!(segments[0].page_number, 1);
        assert_eq!(segments[1].page_number, 2);
        assert_eq!(segments[1].kind, "fees");
    }

    #[tokio::test]
    async fn test_failures_are_consumed_in_order() {
        let ingestor = TextIngestor::new().failing(2, ClauseflowError::transient("503"));
        let seed = SeedInput::from_bytes("a.txt", b"text".to_vec());

        assert!(ingestor.ingest(&seed).await.is_err());
        assert!(ingestor.ingest(&seed).await.is_err());
        assert!(ingestor.ingest(&seed).await.is_ok());
        assert_eq!(ingestor.calls(), 3);
    }

    #[tokio::test]
    async fn test_always_failing_never_recovers() {
        let proposer = TemplateProposer::new().always_failing(ClauseflowError::transient("down"));
        for _ in 0..10 {
            assert!(proposer.propose(&[], &[]).await.is_err());
        }
        assert_eq!(proposer.calls(), 10);
    }

    #[tokio::test]
    async fn test_summarizer_ranks_by_severity() {
        let findings = vec![
            Finding::assessment_failed("c1", "x"),
            Finding {
                segment_id: "c2".into(),
                severity: Severity::High,
                finding_type: "Unlimited Liability".into(),
                explanation: String::new(),
                rationale: None,
            },
        ];
        let summary = TemplateSummarizer::new()
            .summarize(&[], &findings, &[])
            .await
            .unwrap();
        assert_eq!(summary.priority_issues[0], "[high] Unlimited Liability");
        assert_eq!(summary.checklist.len(), 1);
    }
}
