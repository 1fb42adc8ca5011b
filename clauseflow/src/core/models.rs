//! Payload types exchanged between stages and persisted in slots.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Severity;
use crate::observability::TraceRecord;

/// Standard disclaimer attached to every audit bundle.
pub const DISCLAIMER: &str = "IMPORTANT LEGAL DISCLAIMER: This report was produced by an \
automated analysis pipeline and is NOT a substitute for legal advice. Findings and proposed \
language may contain errors or omissions and must be reviewed by qualified legal counsel \
before being relied upon.";

/// The document a run starts from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedInput {
    /// Path, URL or original file name of the source document.
    pub source: String,
    /// MIME type, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Raw document bytes for uploads.
    #[serde(default, with = "base64_bytes", skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<u8>>,
}

impl SeedInput {
    /// Creates a seed that references a document by path or name.
    #[must_use]
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mime_type: None,
            content: None,
        }
    }

    /// Creates a seed carrying uploaded bytes.
    #[must_use]
    pub fn from_bytes(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            source: filename.into(),
            mime_type: None,
            content: Some(content),
        }
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => s.serialize_str(&STANDARD.encode(b)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded: Option<String> = Option::deserialize(d)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Normalized document text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedDocument {
    /// Cleaned full text.
    pub text: String,
    /// Number of pages in the source.
    pub page_count: u32,
}

/// Metadata extracted during ingestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Contracting parties.
    #[serde(default)]
    pub parties: Vec<String>,
    /// Effective date as written in the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Governing jurisdiction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction: Option<String>,
    /// Contract type, e.g. "NDA".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
}

/// Output of the ingest stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutput {
    /// Normalized document.
    pub document: NormalizedDocument,
    /// Document metadata.
    pub metadata: DocumentMetadata,
}

/// A segment of the document, e.g. one clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Segment id, unique within the run.
    pub id: String,
    /// Segment category, e.g. "termination".
    pub kind: String,
    /// Segment text.
    pub text: String,
    /// First line of the segment.
    pub start_line: u32,
    /// Last line of the segment.
    pub end_line: u32,
    /// Page the segment starts on.
    pub page_number: u32,
}

/// A risk finding for one segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Segment this finding belongs to.
    pub segment_id: String,
    /// Severity.
    pub severity: Severity,
    /// Finding category.
    pub finding_type: String,
    /// Short explanation.
    pub explanation: String,
    /// Longer rationale, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Finding {
    /// Placeholder used when assessing one segment failed.
    #[must_use]
    pub fn assessment_failed(segment_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            segment_id: segment_id.into(),
            severity: Severity::Low,
            finding_type: "Assessment Failed".to_string(),
            explanation: "Unable to assess risk for this segment".to_string(),
            rationale: Some(format!("Error: {error}")),
        }
    }
}

/// Proposed alternative language for a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Segment the proposal rewrites.
    pub segment_id: String,
    /// Original text.
    pub original: String,
    /// Proposed text.
    pub proposed: String,
    /// Why the change is proposed.
    pub rationale: String,
    /// Unified diff between original and proposed text.
    pub diff: String,
}

/// Synthesized summary materials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBundle {
    /// Negotiation checklist.
    #[serde(default)]
    pub checklist: Vec<String>,
    /// Narrative summary.
    #[serde(default)]
    pub narrative: String,
    /// Issues ordered by priority.
    #[serde(default)]
    pub priority_issues: Vec<String>,
    /// Draft message to the counterparty.
    #[serde(default)]
    pub draft_message: String,
}

impl SummaryBundle {
    /// Returns true if nothing was synthesized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checklist.is_empty()
            && self.narrative.is_empty()
            && self.priority_issues.is_empty()
            && self.draft_message.is_empty()
    }
}

/// Final audit bundle: everything the run produced plus the trace history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditBundle {
    /// Run the bundle belongs to.
    pub run_id: String,
    /// When the bundle was compiled.
    pub generated_at: DateTime<Utc>,
    /// Normalized document text.
    pub document_text: String,
    /// Document metadata.
    pub metadata: DocumentMetadata,
    /// Extracted segments.
    pub segments: Vec<Segment>,
    /// Risk findings.
    pub findings: Vec<Finding>,
    /// Proposals.
    pub proposals: Vec<Proposal>,
    /// Summary, when one was synthesized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryBundle>,
    /// Every trace record of the run up to the audit stage.
    pub traces: Vec<TraceRecord>,
    /// Legal disclaimer.
    pub disclaimer: String,
}

impl AuditBundle {
    /// An audit bundle carrying only the disclaimer and traces.
    #[must_use]
    pub fn empty(run_id: impl Into<String>, traces: Vec<TraceRecord>) -> Self {
        Self {
            run_id: run_id.into(),
            generated_at: Utc::now(),
            document_text: String::new(),
            metadata: DocumentMetadata::default(),
            segments: Vec::new(),
            findings: Vec::new(),
            proposals: Vec::new(),
            summary: None,
            traces,
            disclaimer: DISCLAIMER.to_string(),
        }
    }
}

/// Encodes bytes the way seeds are persisted.
#[must_use]
pub fn encode_content(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
