//! Core domain model types for clauseflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage identifiers, severities and run status
//! - Stage payloads exchanged with collaborators
//! - Slots, the persisted unit of stage output

mod models;
mod slot;
mod status;

pub use models::{
    encode_content, AuditBundle, DocumentMetadata, Finding, IngestOutput, NormalizedDocument,
    Proposal, Segment, SeedInput, SummaryBundle, DISCLAIMER,
};
pub use slot::{RunSlots, Slot};
pub use status::{RunStatus, Severity, StageId};
