//! Error types for the clauseflow pipeline.
//!
//! Stage collaborators report failures through [`ClauseflowError`]. Only the
//! transient variants participate in retry; every stage-domain variant is
//! fatal for the stage that raised it. Storage failures are reported by the
//! state store as [`StoreError`] and wrapped into [`ClauseflowError::Storage`].

use thiserror::Error;

use crate::core::StageId;

/// The main error type for pipeline operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClauseflowError {
    /// Ingestion could not parse or normalize the source document.
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Segment extraction failed.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Scoring failed. Per-item scoring errors never leave the stage.
    #[error("Scoring error: {0}")]
    Scoring(String),

    /// Proposal generation failed.
    #[error("Proposal error: {0}")]
    Proposal(String),

    /// Summary synthesis failed.
    #[error("Summary error: {0}")]
    Summary(String),

    /// Audit bundle compilation failed.
    #[error("Audit error: {0}")]
    Audit(String),

    /// The state store failed. Never retried.
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    /// A transient failure from an external collaborator.
    #[error("Transient external error: {0}")]
    TransientExternal(String),

    /// An externally imposed timeout expired.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The run was cancelled before a stage began.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl ClauseflowError {
    /// Creates a transient external error.
    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::TransientExternal(message.into())
    }

    /// Creates the domain error that belongs to `stage`.
    #[must_use]
    pub fn for_stage(stage: StageId, message: impl Into<String>) -> Self {
        let message = message.into();
        match stage {
            StageId::Ingest => Self::Parsing(message),
            StageId::Extract => Self::Extraction(message),
            StageId::Score => Self::Scoring(message),
            StageId::Propose => Self::Proposal(message),
            StageId::Summarize => Self::Summary(message),
            StageId::Audit => Self::Audit(message),
        }
    }

    /// Converts a failure raised while running `stage` into that stage's
    /// domain error. Domain, storage and cancellation errors pass through.
    #[must_use]
    pub fn into_stage_error(self, stage: StageId) -> Self {
        match self {
            Self::TransientExternal(msg) | Self::Timeout(msg) => {
                Self::for_stage(stage, format!("{} failed: {msg}", stage.agent_name()))
            }
            other => other,
        }
    }

    /// Returns true for errors raised by the state store.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns the error type name used in traces and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parsing(_) => "ParsingError",
            Self::Extraction(_) => "ExtractionError",
            Self::Scoring(_) => "ScoringError",
            Self::Proposal(_) => "ProposalError",
            Self::Summary(_) => "SummaryError",
            Self::Audit(_) => "AuditError",
            Self::Storage(_) => "StorageError",
            Self::TransientExternal(_) => "TransientExternalError",
            Self::Timeout(_) => "TimeoutError",
            Self::Cancelled(_) => "CancelledError",
            Self::Config(_) => "ConfigError",
        }
    }
}

impl From<anyhow::Error> for ClauseflowError {
    fn from(err: anyhow::Error) -> Self {
        Self::TransientExternal(format!("{err:#}"))
    }
}

impl From<tokio::time::error::Elapsed> for ClauseflowError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::Timeout(err.to_string())
    }
}

/// Errors raised by a [`StateStore`](crate::store::StateStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No run exists with this id.
    #[error("Run not found: {0}")]
    NotFound(String),

    /// A live run already uses this id.
    #[error("Run already exists: {0}")]
    AlreadyExists(String),

    /// The run id cannot be used as a key.
    #[error("Invalid run id '{0}'")]
    InvalidRunId(String),

    /// A slot was written before the slot of the preceding stage.
    #[error("Slot '{stage}' of run {run_id} cannot be written before '{missing}'")]
    OutOfOrder {
        /// Run being written.
        run_id: String,
        /// Stage whose slot was written.
        stage: StageId,
        /// Preceding stage whose slot is absent.
        missing: StageId,
    },

    /// A slot payload was written to the index of a different stage.
    #[error("Slot payload for '{actual}' written to '{expected}'")]
    SlotMismatch {
        /// Target slot index.
        expected: StageId,
        /// Stage the payload belongs to.
        actual: StageId,
    },

    /// Underlying I/O failure.
    #[error("Storage I/O error: {0}")]
    Io(String),

    /// Persisted data could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A value is outside its allowed range.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// An environment variable could not be parsed.
    #[error("Cannot parse environment variable {name}='{value}'")]
    InvalidEnv {
        /// Variable name.
        name: String,
        /// Raw value.
        value: String,
    },
}

/// Convenience result alias.
pub type Result<T, E = ClauseflowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_stage_maps_domain() {
        assert!(matches!(
            ClauseflowError::for_stage(StageId::Ingest, "x"),
            ClauseflowError::Parsing(_)
        ));
        assert!(matches!(
            ClauseflowError::for_stage(StageId::Summarize, "x"),
            ClauseflowError::Summary(_)
        ));
        assert!(matches!(
            ClauseflowError::for_stage(StageId::Audit, "x"),
            ClauseflowError::Audit(_)
        ));
    }

    #[test]
    fn test_into_stage_error_converts_transient() {
        let err = ClauseflowError::transient("503 from model").into_stage_error(StageId::Extract);
        assert_eq!(err.kind(), "ExtractionError");
        assert!(err.to_string().contains("ClauseExtractionAgent failed: 503 from model"));
    }

    #[test]
    fn test_into_stage_error_keeps_domain_and_storage() {
        let err = ClauseflowError::Summary("no findings".into()).into_stage_error(StageId::Extract);
        assert_eq!(err, ClauseflowError::Summary("no findings".into()));

        let err = ClauseflowError::from(StoreError::Io("disk full".into()))
            .into_stage_error(StageId::Score);
        assert!(err.is_storage());
    }

    #[test]
    fn test_anyhow_becomes_transient() {
        let err: ClauseflowError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(err, ClauseflowError::TransientExternal(ref m) if m == "connection reset"));
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::OutOfOrder {
            run_id: "r1".into(),
            stage: StageId::Score,
            missing: StageId::Extract,
        };
        assert_eq!(
            err.to_string(),
            "Slot 'score' of run r1 cannot be written before 'extract'"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
