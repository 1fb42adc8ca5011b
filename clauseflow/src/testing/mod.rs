//! Testing utilities for clauseflow pipelines.
//!
//! This module provides:
//! - Scripted, deterministic stage collaborators with call counters and
//!   injectable failures
//! - A sample contract and seed fixtures

mod fixtures;
mod mocks;

pub use fixtures::{
    sample_executors, sample_seed, segment, TestCollaborators, SAMPLE_CONTRACT,
};
pub use mocks::{
    ClauseExtractor, RuleScorer, TemplateProposer, TemplateSummarizer, TextIngestor,
};
