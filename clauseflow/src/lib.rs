//! # Clauseflow
//!
//! A resumable, multi-stage document review pipeline.
//!
//! A run takes one source document through six stages in fixed order:
//!
//! - **ingest**: normalize the document and extract its metadata
//! - **extract**: split it into segments
//! - **score**: assess the risk of every segment
//! - **propose**: draft alternative language for actionable findings
//! - **summarize**: synthesize negotiation materials
//! - **audit**: compile everything, trace history included, into one bundle
//!
//! Each stage's output lands in a durable slot of the [`store::StateStore`].
//! Re-running a run executes only the stages whose slot is still empty, so
//! an interrupted run resumes where it stopped. Transient collaborator
//! failures are retried with exponential backoff, and with graceful
//! degradation enabled a failed stage is replaced by its default output
//! instead of stopping the run.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clauseflow::prelude::*;
//!
//! let orchestrator = PipelineOrchestrator::new(
//!     OrchestratorContext::in_memory(),
//!     StageExecutors::new(ingestor, extractor, scorer, proposer, summarizer),
//!     OrchestratorConfig::from_env()?,
//! );
//!
//! let result = orchestrator
//!     .run(SeedInput::from_source("contracts/msa.pdf"), "alice", None)
//!     .await;
//! println!("{} finished as {}", result.run_id, result.status);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod store;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{OrchestratorConfig, RetentionConfig};
    pub use crate::context::OrchestratorContext;
    pub use crate::core::{
        AuditBundle, DocumentMetadata, Finding, IngestOutput, NormalizedDocument, Proposal,
        RunSlots, RunStatus, SeedInput, Segment, Severity, Slot, StageId, SummaryBundle,
    };
    pub use crate::errors::{ClauseflowError, ConfigError, StoreError};
    pub use crate::events::{EventKind, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::observability::{init_logging, MetricsCollector, TraceRecord};
    pub use crate::pipeline::{PipelineOrchestrator, PipelineResult, RetryConfig};
    pub use crate::stages::{
        Auditor, Extractor, Ingestor, Proposer, Scorer, StageExecutors, Summarizer,
    };
    pub use crate::store::{FileStateStore, InMemoryStateStore, RunRecord, StateStore};
    pub use crate::utils::{generate_run_id, Timestamp};
}
