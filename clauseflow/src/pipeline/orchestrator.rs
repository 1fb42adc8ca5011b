//! The pipeline orchestrator.
//!
//! Drives the six stages of a run in fixed order. For each stage:
//!
//! 1. If the store already holds the stage's slot, reuse it and move on.
//! 2. Otherwise invoke the stage's collaborator, under the retry policy for
//!    stages that call external services.
//! 3. On success, persist the slot and record a successful trace.
//! 4. On failure, record a failed trace, then either persist the stage's
//!    default slot and continue (degradation) or stop the run.
//!
//! Every execution ends by appending its traces to the store's trace log and
//! recording the run outcome, so an aborted or cancelled run can be resumed.

use chrono::Utc;
use serde_json::json;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::failures::{FailureAction, FailureCollector, FailureMode, FailureRecord};
use super::result::PipelineResult;
use super::retry::{with_retry, RetryConfig, RetryOutcome};
use crate::config::OrchestratorConfig;
use crate::context::OrchestratorContext;
use crate::core::{RunSlots, RunStatus, SeedInput, Severity, Slot, StageId};
use crate::errors::{ClauseflowError, Result, StoreError};
use crate::events::{EventKind, PipelineEvent};
use crate::observability::{fingerprint, TraceHandle, TraceOutcome, TraceRecord, TraceRecorder};
use crate::stages::{StageExecutors, StageInput};
use crate::store::{RetentionPolicy, RunOutcome};

/// Runs, resumes and cleans up pipeline runs.
#[derive(Debug, Clone)]
pub struct PipelineOrchestrator {
    ctx: OrchestratorContext,
    executors: StageExecutors,
    config: OrchestratorConfig,
}

/// Mutable state of one execution of one run.
struct Execution {
    run_id: String,
    seed: SeedInput,
    prior_traces: Vec<TraceRecord>,
    slots: RunSlots,
    recorder: TraceRecorder,
    failures: FailureCollector,
    // errors with no stage trace of their own
    notes: Vec<String>,
    skipped: Vec<StageId>,
    degraded: Vec<StageId>,
    cancelled: bool,
    started: Instant,
}

impl Execution {
    fn errors(&self) -> Vec<String> {
        let mut errors = self.failures.messages();
        errors.extend(self.notes.iter().cloned());
        errors
    }

    fn all_traces(&self) -> Vec<TraceRecord> {
        self.prior_traces
            .iter()
            .chain(self.recorder.records())
            .cloned()
            .collect()
    }
}

/// Whether the stage loop continues.
enum Step {
    Continue,
    Abort,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator.
    #[must_use]
    pub fn new(
        ctx: OrchestratorContext,
        executors: StageExecutors,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            ctx,
            executors,
            config,
        }
    }

    /// Shared services.
    #[must_use]
    pub fn context(&self) -> &OrchestratorContext {
        &self.ctx
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Runs the pipeline for `seed`.
    ///
    /// A `run_id` naming an existing run resumes it and keeps its stored
    /// seed. Otherwise a run is created before the first stage executes.
    pub async fn run(
        &self,
        seed: SeedInput,
        owner_id: &str,
        run_id: Option<String>,
    ) -> PipelineResult {
        let started = Instant::now();
        let store = &self.ctx.store;

        if let Some(id) = run_id.as_deref() {
            match store.run_exists(id).await {
                Ok(true) => {
                    info!(run_id = %id, "Run already exists; resuming");
                    return self.execute(id.to_string(), started).await;
                }
                Ok(false) => {}
                Err(e) => return self.fail_before_start(id, e.into(), started),
            }
        }

        let requested = run_id.clone().unwrap_or_default();
        let run_id = match store.create_run(run_id, owner_id, seed).await {
            Ok(id) => id,
            Err(e) => return self.fail_before_start(&requested, e.into(), started),
        };
        if self.config.retention.retain_runs {
            if let Err(e) = store.set_retention(&run_id, RetentionPolicy::Indefinite).await {
                return self.fail_before_start(&run_id, e.into(), started);
            }
        }
        debug!(run_id = %run_id, owner_id, "Created run");

        self.execute(run_id, started).await
    }

    /// Resumes an existing run, executing only the stages whose slot is
    /// missing.
    pub async fn resume(&self, run_id: &str) -> PipelineResult {
        let started = Instant::now();
        match self.ctx.store.run_exists(run_id).await {
            Ok(true) => self.execute(run_id.to_string(), started).await,
            Ok(false) => self.fail_before_start(
                run_id,
                StoreError::NotFound(run_id.to_string()).into(),
                started,
            ),
            Err(e) => self.fail_before_start(run_id, e.into(), started),
        }
    }

    /// Deletes every run idle for longer than `max_idle`.
    pub async fn purge(&self, max_idle: std::time::Duration) -> Result<usize> {
        let purged = self.ctx.store.purge_expired(max_idle).await?;
        info!(purged, max_idle_secs = max_idle.as_secs(), "Retention sweep finished");
        Ok(purged)
    }

    /// Runs the retention sweep with the configured idle window.
    pub async fn purge_with_config(&self) -> Result<usize> {
        self.purge(self.config.retention.max_idle()).await
    }

    /// Cleans up a finished run.
    ///
    /// Deletes it immediately unless persistence is enabled, in which case
    /// the run is left to the retention sweep. Returns whether it was
    /// deleted.
    pub async fn cleanup(&self, run_id: &str) -> Result<bool> {
        if self.config.retention.persistence {
            info!(run_id, "Persistence enabled; keeping run for the retention sweep");
            return Ok(false);
        }
        self.delete(run_id).await
    }

    /// Deletes a run and its traces regardless of retention.
    pub async fn delete(&self, run_id: &str) -> Result<bool> {
        let deleted = self.ctx.store.delete_run(run_id).await?;
        if deleted {
            info!(run_id, "Deleted run");
        }
        Ok(deleted)
    }

    async fn execute(&self, run_id: String, started: Instant) -> PipelineResult {
        let store = &self.ctx.store;
        let record = match store.get_run(&run_id).await {
            Ok(record) => record,
            Err(e) => return self.fail_before_start(&run_id, e.into(), started),
        };
        let prior_traces = match store.traces(&run_id).await {
            Ok(traces) => traces,
            Err(e) => return self.fail_before_start(&run_id, e.into(), started),
        };

        info!(run_id = %run_id, source = %record.seed.source, "Starting pipeline execution");
        self.ctx
            .emit(&PipelineEvent::run(EventKind::RunStarted, &run_id));

        let mut exec = Execution {
            run_id,
            seed: record.seed,
            prior_traces,
            slots: RunSlots::default(),
            recorder: TraceRecorder::new(),
            failures: FailureCollector::new(),
            notes: Vec::new(),
            skipped: Vec::new(),
            degraded: Vec::new(),
            cancelled: false,
            started,
        };
        let mode = FailureMode::from_degradation(self.config.graceful_degradation);

        let mut aborted = false;
        for stage in StageId::ALL {
            if self.ctx.shutdown.is_cancelled() {
                let reason = self
                    .ctx
                    .shutdown
                    .reason()
                    .unwrap_or_else(|| "shutdown requested".to_string());
                warn!(run_id = %exec.run_id, stage = %stage, reason = %reason, "Run cancelled before stage");
                exec.notes
                    .push(ClauseflowError::Cancelled(format!("before {stage}: {reason}")).to_string());
                exec.cancelled = true;
                aborted = true;
                break;
            }
            if let Step::Abort = self.run_stage(stage, &mut exec, mode).await {
                aborted = true;
                break;
            }
        }

        let status = if aborted {
            RunStatus::Failed
        } else if exec.failures.has_failures() || !exec.notes.is_empty() {
            RunStatus::CompletedWithErrors
        } else {
            RunStatus::Completed
        };
        self.finish(exec, status).await
    }

    async fn run_stage(&self, stage: StageId, exec: &mut Execution, mode: FailureMode) -> Step {
        let store = &self.ctx.store;
        let run_id = exec.run_id.clone();

        match store.get_slot(&run_id, stage).await {
            Ok(Some(stored)) => {
                debug!(run_id = %run_id, stage = %stage, degraded = stored.degraded, "Slot present; skipping stage");
                exec.slots.insert(stored.slot);
                exec.skipped.push(stage);
                self.ctx.emit(
                    &PipelineEvent::stage(EventKind::StageSkipped, &run_id, stage)
                        .with_data(json!({ "degraded": stored.degraded })),
                );
                return Step::Continue;
            }
            Ok(None) => {}
            Err(e) => {
                let handle = exec.recorder.start(stage, &run_id);
                self.fail_stage(exec, handle, stage, e.into(), 0);
                return Step::Abort;
            }
        }

        self.ctx
            .emit(&PipelineEvent::stage(EventKind::StageStarted, &run_id, stage));
        debug!(run_id = %run_id, stage = %stage, "Executing stage");

        let audit_traces = if stage == StageId::Audit {
            exec.all_traces()
        } else {
            Vec::new()
        };
        let input = StageInput {
            run_id: &exec.run_id,
            seed: &exec.seed,
            slots: &exec.slots,
            traces: &audit_traces,
        };
        let handle = input.start_trace(&exec.recorder, stage);
        let retry = if stage.retries_transient() {
            self.config.retry.clone()
        } else {
            RetryConfig::no_retry()
        };
        let executors = &self.executors;
        let key = format!("{run_id}/{stage}");
        let RetryOutcome { result, attempts } = with_retry(&retry, &key, move || {
            let input = input;
            async move { executors.invoke(stage, &input).await }
        })
        .await;

        let product = match result {
            Ok(product) => product,
            Err(e) => {
                let err = e.into_stage_error(stage);
                return self.handle_failure(exec, handle, stage, err, attempts, mode).await;
            }
        };

        let slot = match self.persist(&run_id, stage, product.slot, false).await {
            Ok(slot) => slot,
            Err(e) => {
                self.fail_stage(exec, handle, stage, e, attempts);
                return Step::Abort;
            }
        };

        if !product.warnings.is_empty() {
            warn!(run_id = %run_id, stage = %stage, warnings = product.warnings.len(), "Stage recovered per-item failures");
        }
        let record = exec.recorder.end(
            handle,
            TraceOutcome::Success {
                output_fingerprint: fingerprint(&slot),
                attempts,
                warnings: product.warnings,
            },
        );
        let latency_ms = record.latency_ms;
        self.record_content_metrics(&slot);
        self.ctx.metrics.record_latency(stage, latency_ms);
        self.ctx.metrics.record_success(stage);
        info!(run_id = %run_id, stage = %stage, attempts, latency_ms, "Stage completed");
        self.ctx.emit(
            &PipelineEvent::stage(EventKind::StageCompleted, &run_id, stage)
                .with_data(json!({ "attempts": attempts, "latency_ms": latency_ms })),
        );
        exec.slots.insert(slot);
        Step::Continue
    }

    async fn handle_failure(
        &self,
        exec: &mut Execution,
        handle: TraceHandle,
        stage: StageId,
        err: ClauseflowError,
        attempts: usize,
        mode: FailureMode,
    ) -> Step {
        let action = mode.action_for(&err);
        let run_id = exec.run_id.clone();
        self.fail_stage(exec, handle, stage, err, attempts);

        if action == FailureAction::Abort {
            error!(run_id = %run_id, stage = %stage, "Stage failed; aborting run");
            return Step::Abort;
        }

        let substitute = Slot::degraded_default(stage, &run_id, exec.all_traces());
        match self.persist(&run_id, stage, substitute, true).await {
            Ok(slot) => {
                warn!(run_id = %run_id, stage = %stage, "Stage failed; continuing with default output");
                self.ctx
                    .emit(&PipelineEvent::stage(EventKind::StageDegraded, &run_id, stage));
                exec.slots.insert(slot);
                exec.failures.mark_degraded(stage);
                exec.degraded.push(stage);
                Step::Continue
            }
            Err(e) => {
                error!(run_id = %run_id, stage = %stage, error = %e, "Cannot persist default output; aborting run");
                exec.notes.push(e.to_string());
                Step::Abort
            }
        }
    }

    /// Ends the trace of a failed stage and records the failure.
    fn fail_stage(
        &self,
        exec: &mut Execution,
        handle: TraceHandle,
        stage: StageId,
        err: ClauseflowError,
        attempts: usize,
    ) {
        warn!(
            run_id = %exec.run_id,
            stage = %stage,
            attempts,
            error_type = err.kind(),
            error = %err,
            "Stage failed"
        );
        let record = exec.recorder.end(
            handle,
            TraceOutcome::Failure {
                error: err.to_string(),
                attempts,
            },
        );
        self.ctx.metrics.record_latency(stage, record.latency_ms);
        self.ctx.metrics.record_error(stage);

        exec.failures.record(FailureRecord::new(stage, &err));
        self.ctx.emit(
            &PipelineEvent::stage(EventKind::StageFailed, &exec.run_id, stage).with_data(json!({
                "error": err.to_string(),
                "error_type": err.kind(),
                "attempts": attempts,
            })),
        );
    }

    /// Writes a slot and returns the value the store holds afterwards.
    async fn persist(
        &self,
        run_id: &str,
        stage: StageId,
        slot: Slot,
        degraded: bool,
    ) -> Result<Slot> {
        let store = &self.ctx.store;
        if store.put_slot(run_id, stage, slot.clone(), degraded).await? {
            return Ok(slot);
        }
        // another writer got there first; its value is the one that counts
        warn!(run_id, stage = %stage, "Slot written concurrently; using stored value");
        Ok(store
            .get_slot(run_id, stage)
            .await?
            .map_or(slot, |stored| stored.slot))
    }

    fn record_content_metrics(&self, slot: &Slot) {
        match slot {
            Slot::Extract(segments) => self.ctx.metrics.record_segment_count(segments.len()),
            Slot::Score(findings) => self.ctx.metrics.record_high_severity_count(
                findings
                    .iter()
                    .filter(|f| f.severity == Severity::High)
                    .count(),
            ),
            _ => {}
        }
    }

    async fn finish(&self, exec: Execution, status: RunStatus) -> PipelineResult {
        let store = &self.ctx.store;
        let errors = exec.errors();
        let Execution {
            run_id,
            slots,
            recorder,
            skipped,
            degraded,
            cancelled,
            started,
            ..
        } = exec;
        let traces = recorder.into_records();

        if !traces.is_empty() {
            if let Err(e) = store.append_traces(&run_id, &traces).await {
                error!(run_id = %run_id, error = %e, "Failed to persist traces");
            }
        }
        let outcome = RunOutcome {
            status,
            errors: errors.clone(),
            finished_at: Utc::now(),
        };
        if let Err(e) = store.record_outcome(&run_id, outcome).await {
            error!(run_id = %run_id, error = %e, "Failed to persist run outcome");
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.ctx.metrics.record_run(status == RunStatus::Failed);
        let kind = match (status, cancelled) {
            (_, true) => EventKind::RunCancelled,
            (RunStatus::Failed, false) => EventKind::RunFailed,
            _ => EventKind::RunCompleted,
        };
        self.ctx.emit(&PipelineEvent::run(kind, &run_id).with_data(json!({
            "status": status,
            "errors": errors.len(),
            "executed": traces.len(),
            "skipped": skipped.len(),
        })));
        info!(
            run_id = %run_id,
            status = %status,
            executed = traces.len(),
            skipped = skipped.len(),
            errors = errors.len(),
            elapsed_ms,
            "Pipeline execution finished"
        );

        PipelineResult {
            run_id,
            status,
            slots,
            traces,
            errors,
            skipped,
            degraded,
            elapsed_ms,
        }
    }

    fn fail_before_start(
        &self,
        run_id: &str,
        err: ClauseflowError,
        started: Instant,
    ) -> PipelineResult {
        error!(run_id, error = %err, "Pipeline could not start");
        self.ctx.metrics.record_run(true);
        self.ctx.emit(
            &PipelineEvent::run(EventKind::RunFailed, run_id)
                .with_data(json!({ "error": err.to_string() })),
        );
        PipelineResult {
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
            ..PipelineResult::failed(run_id, err.to_string())
        }
    }
}
