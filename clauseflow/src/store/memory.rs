//! In-memory state store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::record::select_summaries;
use super::{
    RetentionPolicy, RunOutcome, RunRecord, RunSummary, StateStore, StoreResult, StoredSlot,
};
use crate::core::{SeedInput, Slot, StageId};
use crate::errors::StoreError;
use crate::observability::TraceRecord;
use crate::utils::{generate_run_id, validate_run_id};

#[derive(Debug)]
struct RunEntry {
    record: RunRecord,
    traces: Vec<TraceRecord>,
}

/// Process-local store.
///
/// Each run sits behind its own lock, so writers of different runs never
/// block each other.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStateStore {
    runs: Arc<DashMap<String, Arc<RwLock<RunEntry>>>>,
}

impl InMemoryStateStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Returns true if no run is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    fn entry(&self, run_id: &str) -> StoreResult<Arc<RwLock<RunEntry>>> {
        self.runs
            .get(run_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create_run(
        &self,
        run_id: Option<String>,
        owner_id: &str,
        seed: SeedInput,
    ) -> StoreResult<String> {
        let run_id = run_id.unwrap_or_else(generate_run_id);
        validate_run_id(&run_id)?;

        match self.runs.entry(run_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(run_id)),
            Entry::Vacant(slot) => {
                let record = RunRecord::new(run_id.clone(), owner_id, seed, Utc::now());
                slot.insert(Arc::new(RwLock::new(RunEntry {
                    record,
                    traces: Vec::new(),
                })));
                debug!(run_id = %run_id, owner_id, "Created run");
                Ok(run_id)
            }
        }
    }

    async fn run_exists(&self, run_id: &str) -> StoreResult<bool> {
        Ok(self.runs.contains_key(run_id))
    }

    async fn get_run(&self, run_id: &str) -> StoreResult<RunRecord> {
        Ok(self.entry(run_id)?.read().record.clone())
    }

    async fn get_slot(&self, run_id: &str, stage: StageId) -> StoreResult<Option<StoredSlot>> {
        Ok(self.entry(run_id)?.read().record.slot(stage).cloned())
    }

    async fn put_slot(
        &self,
        run_id: &str,
        stage: StageId,
        slot: Slot,
        degraded: bool,
    ) -> StoreResult<bool> {
        let entry = self.entry(run_id)?;
        let written = entry
            .write()
            .record
            .put_slot(stage, slot, degraded, Utc::now())?;
        if !written {
            debug!(run_id, stage = %stage, "Slot already written; ignoring second write");
        }
        Ok(written)
    }

    async fn list_runs(
        &self,
        owner_id: Option<&str>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<RunSummary>> {
        let rows = self
            .runs
            .iter()
            .map(|e| e.value().read().record.summary())
            .collect();
        Ok(select_summaries(rows, owner_id, limit))
    }

    async fn append_traces(&self, run_id: &str, traces: &[TraceRecord]) -> StoreResult<()> {
        let entry = self.entry(run_id)?;
        let mut guard = entry.write();
        guard.traces.extend_from_slice(traces);
        guard.record.updated_at = Utc::now();
        Ok(())
    }

    async fn traces(&self, run_id: &str) -> StoreResult<Vec<TraceRecord>> {
        Ok(self.entry(run_id)?.read().traces.clone())
    }

    async fn record_outcome(&self, run_id: &str, outcome: RunOutcome) -> StoreResult<()> {
        let entry = self.entry(run_id)?;
        let mut guard = entry.write();
        guard.record.updated_at = outcome.finished_at;
        guard.record.outcome = Some(outcome);
        Ok(())
    }

    async fn set_retention(&self, run_id: &str, policy: RetentionPolicy) -> StoreResult<()> {
        self.entry(run_id)?.write().record.retention = policy;
        Ok(())
    }

    async fn purge_expired_at(&self, now: DateTime<Utc>, max_idle: Duration) -> StoreResult<usize> {
        let before = self.runs.len();
        self.runs
            .retain(|_, entry| !entry.read().record.is_expired(now, max_idle));
        let purged = before.saturating_sub(self.runs.len());
        debug!(purged, "Purged expired runs");
        Ok(purged)
    }

    async fn delete_run(&self, run_id: &str) -> StoreResult<bool> {
        Ok(self.runs.remove(run_id).is_some())
    }
}
