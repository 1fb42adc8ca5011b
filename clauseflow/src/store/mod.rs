//! Stage state store: the durable record of each run's stage outputs.
//!
//! Slots are written at most once, strictly in stage order. A second write to
//! a populated slot succeeds without effect, which makes replays idempotent.
//! Operations on different runs never contend with each other.

mod file;
mod memory;
mod record;

pub use file::FileStateStore;
pub use memory::InMemoryStateStore;
pub use record::{RetentionPolicy, RunOutcome, RunRecord, RunSummary, StoredSlot};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::core::{SeedInput, Slot, StageId};
use crate::errors::StoreError;
use crate::observability::TraceRecord;

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable per-run storage used by the orchestrator.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Creates a run holding only its seed and returns its id.
    ///
    /// Fails with [`StoreError::AlreadyExists`] when `run_id` names an
    /// existing run. A missing id is generated.
    async fn create_run(
        &self,
        run_id: Option<String>,
        owner_id: &str,
        seed: SeedInput,
    ) -> StoreResult<String>;

    /// Returns true if the run exists.
    async fn run_exists(&self, run_id: &str) -> StoreResult<bool>;

    /// Returns a snapshot of the whole run record.
    async fn get_run(&self, run_id: &str) -> StoreResult<RunRecord>;

    /// Reads the slot of `stage`.
    async fn get_slot(&self, run_id: &str, stage: StageId) -> StoreResult<Option<StoredSlot>>;

    /// Writes the slot of `stage` once.
    ///
    /// Returns `false` when the slot was already written; the stored value is
    /// left unchanged.
    async fn put_slot(
        &self,
        run_id: &str,
        stage: StageId,
        slot: Slot,
        degraded: bool,
    ) -> StoreResult<bool>;

    /// Lists runs newest first, optionally filtered by owner.
    async fn list_runs(
        &self,
        owner_id: Option<&str>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<RunSummary>>;

    /// Appends to the run's trace log.
    async fn append_traces(&self, run_id: &str, traces: &[TraceRecord]) -> StoreResult<()>;

    /// Reads the run's whole trace log in append order.
    async fn traces(&self, run_id: &str) -> StoreResult<Vec<TraceRecord>>;

    /// Records the outcome of the latest execution.
    async fn record_outcome(&self, run_id: &str, outcome: RunOutcome) -> StoreResult<()>;

    /// Changes the run's retention policy.
    async fn set_retention(&self, run_id: &str, policy: RetentionPolicy) -> StoreResult<()>;

    /// Deletes every run that is expired at `now`, returning the count.
    async fn purge_expired_at(&self, now: DateTime<Utc>, max_idle: Duration) -> StoreResult<usize>;

    /// Deletes every run idle for longer than `max_idle`.
    async fn purge_expired(&self, max_idle: Duration) -> StoreResult<usize> {
        self.purge_expired_at(Utc::now(), max_idle).await
    }

    /// Deletes a run and its traces regardless of retention.
    ///
    /// Returns false if the run did not exist.
    async fn delete_run(&self, run_id: &str) -> StoreResult<bool>;
}
