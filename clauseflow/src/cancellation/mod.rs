//! Cooperative cancellation of pipeline runs.
//!
//! The orchestrator checks its [`CancellationToken`] before each stage. A
//! stage that already started always runs to its terminal outcome.

mod token;

pub use token::{CancelCallback, CancellationToken};
