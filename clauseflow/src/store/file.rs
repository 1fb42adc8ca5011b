//! File-backed state store.
//!
//! Layout under the root directory:
//!
//! - `<run_id>.json`: the [`RunRecord`], replaced atomically via a temp file
//!   and rename on every write.
//! - `<run_id>.traces.jsonl`: the append-only trace log, one JSON record per
//!   line.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::record::select_summaries;
use super::{
    RetentionPolicy, RunOutcome, RunRecord, RunSummary, StateStore, StoreResult, StoredSlot,
};
use crate::core::{SeedInput, Slot, StageId};
use crate::errors::StoreError;
use crate::observability::TraceRecord;
use crate::utils::{generate_run_id, validate_run_id};

const RECORD_EXT: &str = ".json";
const TRACES_EXT: &str = ".traces.jsonl";
const TEMP_EXT: &str = ".json.tmp";

/// Store that keeps one JSON document per run in a directory.
///
/// Writes to one run are serialized by a per-run async lock; different runs
/// never share a lock.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    root: PathBuf,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl FileStateStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            locks: Arc::new(DashMap::new()),
        })
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, run_id: &str) -> PathBuf {
        self.root.join(format!("{run_id}{RECORD_EXT}"))
    }

    fn traces_path(&self, run_id: &str) -> PathBuf {
        self.root.join(format!("{run_id}{TRACES_EXT}"))
    }

    fn lock_for(&self, run_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(run_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    async fn read_record(&self, run_id: &str) -> StoreResult<RunRecord> {
        validate_run_id(run_id)?;
        match fs::read(self.record_path(run_id)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(run_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write_record(&self, record: &RunRecord) -> StoreResult<()> {
        let path = self.record_path(&record.run_id);
        let tmp = self.root.join(format!("{}{TEMP_EXT}", record.run_id));
        let bytes = serde_json::to_vec_pretty(record)?;
        fs::write(&tmp, bytes).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Reads, mutates and writes back a record under the run's lock.
    async fn update_record<T, F>(&self, run_id: &str, mutate: F) -> StoreResult<T>
    where
        F: FnOnce(&mut RunRecord) -> StoreResult<T> + Send,
        T: Send,
    {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;
        let mut record = self.read_record(run_id).await?;
        let value = mutate(&mut record)?;
        self.write_record(&record).await?;
        Ok(value)
    }

    async fn run_ids(&self) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name.strip_suffix(RECORD_EXT) {
                if validate_run_id(id).is_ok() {
                    ids.push(id.to_string());
                }
            }
        }
        Ok(ids)
    }

    async fn remove_files(&self, run_id: &str) -> StoreResult<bool> {
        let existed = match fs::remove_file(self.record_path(run_id)).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        match fs::remove_file(self.traces_path(run_id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(existed)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn create_run(
        &self,
        run_id: Option<String>,
        owner_id: &str,
        seed: SeedInput,
    ) -> StoreResult<String> {
        let run_id = run_id.unwrap_or_else(generate_run_id);
        validate_run_id(&run_id)?;

        let lock = self.lock_for(&run_id);
        let _guard = lock.lock().await;
        if fs::try_exists(self.record_path(&run_id)).await? {
            return Err(StoreError::AlreadyExists(run_id));
        }
        let record = RunRecord::new(run_id.clone(), owner_id, seed, Utc::now());
        self.write_record(&record).await?;
        debug!(run_id = %run_id, owner_id, root = %self.root.display(), "Created run");
        Ok(run_id)
    }

    async fn run_exists(&self, run_id: &str) -> StoreResult<bool> {
        validate_run_id(run_id)?;
        Ok(fs::try_exists(self.record_path(run_id)).await?)
    }

    async fn get_run(&self, run_id: &str) -> StoreResult<RunRecord> {
        self.read_record(run_id).await
    }

    async fn get_slot(&self, run_id: &str, stage: StageId) -> StoreResult<Option<StoredSlot>> {
        Ok(self.read_record(run_id).await?.slot(stage).cloned())
    }

    async fn put_slot(
        &self,
        run_id: &str,
        stage: StageId,
        slot: Slot,
        degraded: bool,
    ) -> StoreResult<bool> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;
        let mut record = self.read_record(run_id).await?;
        if !record.put_slot(stage, slot, degraded, Utc::now())? {
            debug!(run_id, stage = %stage, "Slot already written; ignoring second write");
            return Ok(false);
        }
        self.write_record(&record).await?;
        Ok(true)
    }

    async fn list_runs(
        &self,
        owner_id: Option<&str>,
        limit: Option<usize>,
    ) -> StoreResult<Vec<RunSummary>> {
        let mut rows = Vec::new();
        for id in self.run_ids().await? {
            match self.read_record(&id).await {
                Ok(record) => rows.push(record.summary()),
                // deleted between listing and reading
                Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(select_summaries(rows, owner_id, limit))
    }

    async fn append_traces(&self, run_id: &str, traces: &[TraceRecord]) -> StoreResult<()> {
        let lock = self.lock_for(run_id);
        let _guard = lock.lock().await;
        let mut record = self.read_record(run_id).await?;

        let mut buf = Vec::new();
        for trace in traces {
            serde_json::to_writer(&mut buf, trace)?;
            buf.push(b'\n');
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.traces_path(run_id))
            .await?;
        file.write_all(&buf).await?;
        file.flush().await?;

        record.updated_at = Utc::now();
        self.write_record(&record).await
    }

    async fn traces(&self, run_id: &str) -> StoreResult<Vec<TraceRecord>> {
        validate_run_id(run_id)?;
        let text = match fs::read_to_string(self.traces_path(run_id)).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return if self.run_exists(run_id).await? {
                    Ok(Vec::new())
                } else {
                    Err(StoreError::NotFound(run_id.to_string()))
                };
            }
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(StoreError::from))
            .collect()
    }

    async fn record_outcome(&self, run_id: &str, outcome: RunOutcome) -> StoreResult<()> {
        self.update_record(run_id, |record| {
            record.updated_at = outcome.finished_at;
            record.outcome = Some(outcome);
            Ok(())
        })
        .await
    }

    async fn set_retention(&self, run_id: &str, policy: RetentionPolicy) -> StoreResult<()> {
        self.update_record(run_id, |record| {
            record.retention = policy;
            Ok(())
        })
        .await
    }

    async fn purge_expired_at(&self, now: DateTime<Utc>, max_idle: Duration) -> StoreResult<usize> {
        let mut purged = 0;
        for id in self.run_ids().await? {
            let lock = self.lock_for(&id);
            let gone = {
                let _guard = lock.lock().await;
                match self.read_record(&id).await {
                    Ok(record) if record.is_expired(now, max_idle) => {
                        if self.remove_files(&id).await? {
                            purged += 1;
                        }
                        true
                    }
                    Ok(_) => false,
                    Err(StoreError::NotFound(_)) => true,
                    Err(StoreError::Corrupt(reason)) => {
                        warn!(run_id = %id, reason = %reason, "Skipping corrupt record during purge");
                        false
                    }
                    Err(e) => return Err(e),
                }
            };
            if gone {
                self.locks.remove(&id);
            }
        }
        debug!(purged, "Purged expired runs");
        Ok(purged)
    }

    async fn delete_run(&self, run_id: &str) -> StoreResult<bool> {
        validate_run_id(run_id)?;
        let lock = self.lock_for(run_id);
        let deleted = {
            let _guard = lock.lock().await;
            self.remove_files(run_id).await?
        };
        self.locks.remove(run_id);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{IngestOutput, RunStatus};
    use crate::observability::{TraceOutcome, TraceRecorder};
    use chrono::TimeDelta;
    use tempfile::TempDir;

    async fn store() -> (TempDir, FileStateStore) {
        let dir = TempDir::new().unwrap();
        let store = FileStateStore::open(dir.path().join("runs")).await.unwrap();
        (dir, store)
    }

    fn ingest(text: &str) -> Slot {
        let mut out = IngestOutput::default();
        out.document.text = text.to_string();
        Slot::Ingest(out)
    }

    #[tokio::test]
    async fn test_create_and_reopen() {
        let (dir, store) = store().await;
        let id = store
            .create_run(Some("run-1".into()), "alice", SeedInput::from_bytes("a.txt", b"hi".to_vec()))
            .await
            .unwrap();
        store
            .put_slot(&id, StageId::Ingest, ingest("hello"), false)
            .await
            .unwrap();

        let reopened = FileStateStore::open(dir.path().join("runs")).await.unwrap();
        let run = reopened.get_run(&id).await.unwrap();
        assert_eq!(run.owner_id, "alice");
        assert_eq!(run.seed.content.as_deref(), Some(&b"hi"[..]));
        assert_eq!(run.slot(StageId::Ingest).unwrap().slot, ingest("hello"));
        assert!(!dir.path().join("runs").join("run-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_duplicate_and_missing() {
        let (_dir, store) = store().await;
        store.create_run(Some("dup".into()), "a", SeedInput::from_source("x")).await.unwrap();
        let err = store
            .create_run(Some("dup".into()), "a", SeedInput::from_source("x"))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists("dup".into()));

        let err = store.get_slot("ghost", StageId::Ingest).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("ghost".into()));
        assert!(matches!(
            store.get_run("../escape").await.unwrap_err(),
            StoreError::InvalidRunId(_)
        ));
    }

    #[tokio::test]
    async fn test_put_slot_once_and_in_order() {
        let (_dir, store) = store().await;
        let id = store.create_run(None, "a", SeedInput::from_source("x")).await.unwrap();

        assert!(matches!(
            store
                .put_slot(&id, StageId::Extract, Slot::Extract(Vec::new()), false)
                .await
                .unwrap_err(),
            StoreError::OutOfOrder { .. }
        ));
        assert!(store.put_slot(&id, StageId::Ingest, ingest("one"), false).await.unwrap());
        assert!(!store.put_slot(&id, StageId::Ingest, ingest("two"), false).await.unwrap());
        let slot = store.get_slot(&id, StageId::Ingest).await.unwrap().unwrap();
        assert_eq!(slot.slot, ingest("one"));
    }

    #[tokio::test]
    async fn test_trace_log_appends() {
        let (_dir, store) = store().await;
        let id = store.create_run(None, "a", SeedInput::from_source("x")).await.unwrap();
        assert!(store.traces(&id).await.unwrap().is_empty());

        let mut recorder = TraceRecorder::new();
        for stage in [StageId::Ingest, StageId::Extract] {
            let handle = recorder.start(stage, &stage);
            recorder.end(
                handle,
                TraceOutcome::Success {
                    output_fingerprint: "f".into(),
                    attempts: 1,
                    warnings: Vec::new(),
                },
            );
        }
        store.append_traces(&id, &recorder.records()[..1]).await.unwrap();
        store.append_traces(&id, &recorder.records()[1..]).await.unwrap();

        let traces = store.traces(&id).await.unwrap();
        let stages: Vec<_> = traces.iter().map(|t| t.stage).collect();
        assert_eq!(stages, vec![StageId::Ingest, StageId::Extract]);
        assert_eq!(traces[1].input_fingerprint, recorder.records()[1].input_fingerprint);
        assert!(matches!(
            store.traces("ghost").await.unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_corrupt_record() {
        let (_dir, store) = store().await;
        tokio::fs::write(store.root().join("bad.json"), b"{not json")
            .await
            .unwrap();
        assert!(matches!(
            store.get_run("bad").await.unwrap_err(),
            StoreError::Corrupt(_)
        ));
    }

    #[tokio::test]
    async fn test_outcome_retention_purge_and_delete() {
        let (_dir, store) = store().await;
        let old = store.create_run(Some("old".into()), "a", SeedInput::from_source("x")).await.unwrap();
        let kept = store.create_run(Some("kept".into()), "a", SeedInput::from_source("x")).await.unwrap();
        store.set_retention(&kept, RetentionPolicy::Indefinite).await.unwrap();
        store
            .record_outcome(
                &old,
                RunOutcome {
                    status: RunStatus::Completed,
                    errors: Vec::new(),
                    finished_at: Utc::now(),
                },
            )
            .await
            .unwrap();

        let rows = store.list_runs(None, None).await.unwrap();
        assert_eq!(rows.len(), 2);

        let later = Utc::now() + TimeDelta::days(3);
        let purged = store
            .purge_expired_at(later, Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(!store.run_exists(&old).await.unwrap());

        assert!(store.delete_run(&kept).await.unwrap());
        assert!(!store.delete_run(&kept).await.unwrap());
        assert!(store.list_runs(None, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_releases_run_locks() {
        let (_dir, store) = store().await;
        for i in 0..20 {
            let id = store
                .create_run(Some(format!("run-{i}")), "a", SeedInput::from_source("x"))
                .await
                .unwrap();
            store.put_slot(&id, StageId::Ingest, ingest("text"), false).await.unwrap();
        }
        let kept = store.create_run(Some("kept".into()), "a", SeedInput::from_source("x")).await.unwrap();
        store.set_retention(&kept, RetentionPolicy::Indefinite).await.unwrap();
        assert_eq!(store.locks.len(), 21);

        let later = Utc::now() + TimeDelta::days(3);
        let purged = store
            .purge_expired_at(later, Duration::from_secs(3600))
            .await
            .unwrap();

        assert_eq!(purged, 20);
        assert_eq!(store.locks.len(), 1);
        assert!(store.locks.contains_key(&kept));
        assert!(store.delete_run(&kept).await.unwrap());
        assert!(store.locks.is_empty());
    }
}
