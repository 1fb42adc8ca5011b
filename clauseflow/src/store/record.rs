//! Persisted run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::{RunSlots, RunStatus, SeedInput, Slot, StageId};
use crate::errors::StoreError;
use crate::utils::cutoff;

/// How the retention sweep treats a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "until", rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Purged once idle longer than the sweep's window.
    #[default]
    Idle,
    /// Never purged by the sweep; only an explicit delete removes it.
    Indefinite,
    /// Purged by the sweep once the timestamp has passed.
    Until(DateTime<Utc>),
}

/// One written slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSlot {
    /// Slot payload.
    pub slot: Slot,
    /// When the slot was written.
    pub written_at: DateTime<Utc>,
    /// True if the payload is a degradation substitute.
    #[serde(default)]
    pub degraded: bool,
}

/// Final status of the most recent execution of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// Status reported to the caller.
    pub status: RunStatus,
    /// Errors collected during the execution.
    #[serde(default)]
    pub errors: Vec<String>,
    /// When the execution ended.
    pub finished_at: DateTime<Utc>,
}

/// Durable record of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run id.
    pub run_id: String,
    /// Owner of the run.
    pub owner_id: String,
    /// Input the run was seeded with.
    pub seed: SeedInput,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
    /// Retention policy.
    #[serde(default)]
    pub retention: RetentionPolicy,
    /// Stage output slots, indexed by [`StageId::index`].
    #[serde(default)]
    pub slots: [Option<StoredSlot>; StageId::COUNT],
    /// Outcome of the most recent execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,
}

impl RunRecord {
    /// Creates a record with only the seed populated.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        owner_id: impl Into<String>,
        seed: SeedInput,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            owner_id: owner_id.into(),
            seed,
            created_at: now,
            updated_at: now,
            retention: RetentionPolicy::Idle,
            slots: Default::default(),
            outcome: None,
        }
    }

    /// Returns the slot of `stage`, if written.
    #[must_use]
    pub fn slot(&self, stage: StageId) -> Option<&StoredSlot> {
        self.slots[stage.index()].as_ref()
    }

    /// Returns true if the slot of `stage` is written.
    #[must_use]
    pub fn has_slot(&self, stage: StageId) -> bool {
        self.slot(stage).is_some()
    }

    /// Writes `slot` into the slot of `stage`.
    ///
    /// Returns `Ok(false)` without touching the record when the slot is
    /// already written.
    pub fn put_slot(
        &mut self,
        stage: StageId,
        slot: Slot,
        degraded: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if slot.stage() != stage {
            return Err(StoreError::SlotMismatch {
                expected: stage,
                actual: slot.stage(),
            });
        }
        if self.has_slot(stage) {
            return Ok(false);
        }
        if let Some(previous) = stage.previous() {
            if !self.has_slot(previous) {
                return Err(StoreError::OutOfOrder {
                    run_id: self.run_id.clone(),
                    stage,
                    missing: previous,
                });
            }
        }
        self.slots[stage.index()] = Some(StoredSlot {
            slot,
            written_at: now,
            degraded,
        });
        self.updated_at = now;
        Ok(true)
    }

    /// Assembles every written slot.
    #[must_use]
    pub fn run_slots(&self) -> RunSlots {
        let mut slots = RunSlots::default();
        for stored in self.slots.iter().flatten() {
            slots.insert(stored.slot.clone());
        }
        slots
    }

    /// Number of written slots.
    #[must_use]
    pub fn populated(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Stages whose slot holds a degradation substitute.
    #[must_use]
    pub fn degraded_stages(&self) -> Vec<StageId> {
        StageId::ALL
            .into_iter()
            .filter(|s| self.slot(*s).is_some_and(|slot| slot.degraded))
            .collect()
    }

    /// Returns true if the sweep at `now` with window `max_idle` removes
    /// this run.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, max_idle: Duration) -> bool {
        match self.retention {
            RetentionPolicy::Idle => self.updated_at < cutoff(now, max_idle),
            RetentionPolicy::Indefinite => false,
            RetentionPolicy::Until(until) => now >= until,
        }
    }

    /// Summary row for listings.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            owner_id: self.owner_id.clone(),
            source: self.seed.source.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            populated_slots: self.populated(),
            degraded: self.degraded_stages(),
            status: self.outcome.as_ref().map(|o| o.status),
            retention: self.retention,
        }
    }
}

/// Listing row for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Run id.
    pub run_id: String,
    /// Owner.
    pub owner_id: String,
    /// Seed source reference.
    pub source: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last write.
    pub updated_at: DateTime<Utc>,
    /// Number of written slots.
    pub populated_slots: usize,
    /// Stages holding degradation substitutes.
    pub degraded: Vec<StageId>,
    /// Status of the last execution, if any finished.
    pub status: Option<RunStatus>,
    /// Retention policy.
    pub retention: RetentionPolicy,
}

/// Sorts newest first, filters by owner and truncates to `limit`.
pub(crate) fn select_summaries(
    mut rows: Vec<RunSummary>,
    owner_id: Option<&str>,
    limit: Option<usize>,
) -> Vec<RunSummary> {
    if let Some(owner) = owner_id {
        rows.retain(|r| r.owner_id == owner);
    }
    rows.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.run_id.cmp(&b.run_id))
    });
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}
