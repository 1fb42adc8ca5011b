//! Default audit bundle compiler.

use async_trait::async_trait;
use chrono::Utc;

use super::Auditor;
use crate::core::{AuditBundle, RunSlots, DISCLAIMER};
use crate::errors::{ClauseflowError, Result};
use crate::observability::TraceRecord;

/// Compiles every slot, the trace history and the disclaimer into an
/// [`AuditBundle`].
///
/// Only fails if the bundle cannot be serialized for persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuditor;

#[async_trait]
impl Auditor for DefaultAuditor {
    async fn audit(
        &self,
        run_id: &str,
        slots: &RunSlots,
        traces: &[TraceRecord],
    ) -> Result<AuditBundle> {
        let ingest = slots.ingest.clone().unwrap_or_default();
        let bundle = AuditBundle {
            run_id: run_id.to_string(),
            generated_at: Utc::now(),
            document_text: ingest.document.text,
            metadata: ingest.metadata,
            segments: slots.segments_or_empty().to_vec(),
            findings: slots.findings_or_empty().to_vec(),
            proposals: slots.proposals_or_empty().to_vec(),
            summary: slots.summary.clone().filter(|s| !s.is_empty()),
            traces: traces.to_vec(),
            disclaimer: DISCLAIMER.to_string(),
        };

        serde_json::to_vec(&bundle)
            .map_err(|e| ClauseflowError::Audit(format!("cannot serialize audit bundle: {e}")))?;
        Ok(bundle)
    }
}
