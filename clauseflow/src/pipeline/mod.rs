//! Pipeline execution.
//!
//! This module provides:
//! - The orchestrator that drives the fixed stage sequence of a run
//! - The retry policy wrapped around collaborator calls
//! - Failure handling (degradation or abort)
//! - The aggregated execution result

mod failures;
mod orchestrator;
mod result;
mod retry;

pub use failures::{FailureAction, FailureCollector, FailureMode, FailureRecord};
pub use orchestrator::PipelineOrchestrator;
pub use result::PipelineResult;
pub use retry::{
    should_retry, with_retry, BackoffStrategy, JitterStrategy, RetryConfig, RetryDecision,
    RetryOutcome, Retryable,
};
