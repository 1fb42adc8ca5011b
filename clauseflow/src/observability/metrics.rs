//! In-process pipeline metrics.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

use crate::core::StageId;

/// Latency samples kept per stage; older samples are dropped.
pub const LATENCY_WINDOW: usize = 1024;

/// Running sum and count, for means that need no sample history.
#[derive(Debug, Default, Clone, Copy)]
struct RunningMean {
    sum: u64,
    count: u64,
}

impl RunningMean {
    fn add(&mut self, value: usize) {
        self.sum = self.sum.saturating_add(value as u64);
        self.count += 1;
    }

    fn mean(self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }
}

#[derive(Debug, Default)]
struct MetricsState {
    latencies_ms: BTreeMap<StageId, VecDeque<f64>>,
    successes: BTreeMap<StageId, u64>,
    errors: BTreeMap<StageId, u64>,
    segment_counts: RunningMean,
    high_severity_counts: RunningMean,
    runs_completed: u64,
    runs_failed: u64,
}

/// Collects stage latencies, outcome counters and content counts.
///
/// Shared across runs through the orchestrator context. Percentiles cover the
/// last [`LATENCY_WINDOW`] samples of each stage; counters and means cover
/// every run.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    state: RwLock<MetricsState>,
}

impl MetricsCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a stage latency sample.
    pub fn record_latency(&self, stage: StageId, latency_ms: f64) {
        let mut state = self.state.write();
        let samples = state.latencies_ms.entry(stage).or_default();
        if samples.len() == LATENCY_WINDOW {
            samples.pop_front();
        }
        samples.push_back(latency_ms);
    }

    /// Counts a successful stage execution.
    pub fn record_success(&self, stage: StageId) {
        *self.state.write().successes.entry(stage).or_default() += 1;
    }

    /// Counts a failed stage execution.
    pub fn record_error(&self, stage: StageId) {
        *self.state.write().errors.entry(stage).or_default() += 1;
    }

    /// Records how many segments a run extracted.
    pub fn record_segment_count(&self, count: usize) {
        self.state.write().segment_counts.add(count);
    }

    /// Records how many high-severity findings a run produced.
    pub fn record_high_severity_count(&self, count: usize) {
        self.state.write().high_severity_counts.add(count);
    }

    /// Counts a finished run.
    pub fn record_run(&self, failed: bool) {
        let mut state = self.state.write();
        if failed {
            state.runs_failed += 1;
        } else {
            state.runs_completed += 1;
        }
    }

    /// Successful executions of `stage`.
    #[must_use]
    pub fn successes(&self, stage: StageId) -> u64 {
        self.state.read().successes.get(&stage).copied().unwrap_or(0)
    }

    /// Failed executions of `stage`.
    #[must_use]
    pub fn errors(&self, stage: StageId) -> u64 {
        self.state.read().errors.get(&stage).copied().unwrap_or(0)
    }

    /// Builds a serializable summary.
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let state = self.state.read();
        let stages = StageId::ALL
            .iter()
            .filter_map(|stage| {
                let samples: Vec<f64> = state
                    .latencies_ms
                    .get(stage)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default();
                let successes = state.successes.get(stage).copied().unwrap_or(0);
                let errors = state.errors.get(stage).copied().unwrap_or(0);
                if samples.is_empty() && successes == 0 && errors == 0 {
                    return None;
                }
                let total = successes + errors;
                Some((
                    *stage,
                    StageMetrics {
                        invocations: total,
                        successes,
                        errors,
                        success_rate: if total == 0 {
                            0.0
                        } else {
                            successes as f64 / total as f64
                        },
                        latency_p50_ms: percentile(&samples, 50),
                        latency_p95_ms: percentile(&samples, 95),
                        latency_p99_ms: percentile(&samples, 99),
                    },
                ))
            })
            .collect();

        MetricsSummary {
            stages,
            runs_completed: state.runs_completed,
            runs_failed: state.runs_failed,
            avg_segment_count: state.segment_counts.mean(),
            avg_high_severity_count: state.high_severity_counts.mean(),
        }
    }
}

/// Metrics for one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageMetrics {
    /// Total terminal outcomes.
    pub invocations: u64,
    /// Successful outcomes.
    pub successes: u64,
    /// Failed outcomes.
    pub errors: u64,
    /// successes / invocations.
    pub success_rate: f64,
    /// Median latency.
    pub latency_p50_ms: f64,
    /// 95th percentile latency.
    pub latency_p95_ms: f64,
    /// 99th percentile latency.
    pub latency_p99_ms: f64,
}

/// Snapshot of every metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    /// Per-stage metrics, only for stages that ran.
    pub stages: BTreeMap<StageId, StageMetrics>,
    /// Runs that reached the audit stage.
    pub runs_completed: u64,
    /// Runs that were aborted.
    pub runs_failed: u64,
    /// Mean number of extracted segments per run.
    pub avg_segment_count: f64,
    /// Mean number of high-severity findings per run.
    pub avg_high_severity_count: f64,
}

/// Nearest-rank percentile.
fn percentile(samples: &[f64], pct: u32) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = (f64::from(pct) / 100.0 * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_percentile_nearest_rank() {
        let samples: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&samples, 50), 50.0);
        assert_eq!(percentile(&samples, 95), 95.0);
        assert_eq!(percentile(&samples, 99), 99.0);
        assert_eq!(percentile(&[], 50), 0.0);
        assert_eq!(percentile(&[7.0], 99), 7.0);
    }

    #[test]
    fn test_counters() {
        let metrics = MetricsCollector::new();
        metrics.record_success(StageId::Score);
        metrics.record_success(StageId::Score);
        metrics.record_error(StageId::Score);

        assert_eq!(metrics.successes(StageId::Score), 2);
        assert_eq!(metrics.errors(StageId::Score), 1);
        assert_eq!(metrics.errors(StageId::Ingest), 0);
    }

    #[test]
    fn test_summary_only_lists_active_stages() {
        let metrics = MetricsCollector::new();
        metrics.record_latency(StageId::Ingest, 10.0);
        metrics.record_success(StageId::Ingest);
        metrics.record_segment_count(4);
        metrics.record_segment_count(2);
        metrics.record_run(false);
        metrics.record_run(true);

        let summary = metrics.summary();
        assert_eq!(summary.stages.len(), 1);
        let ingest = &summary.stages[&StageId::Ingest];
        assert_eq!(ingest.invocations, 1);
        assert_eq!(ingest.success_rate, 1.0);
        assert_eq!(ingest.latency_p50_ms, 10.0);
        assert_eq!(summary.avg_segment_count, 3.0);
        assert_eq!(summary.runs_completed, 1);
        assert_eq!(summary.runs_failed, 1);
    }

    #[test]
    fn test_latency_window_drops_oldest_samples() {
        let metrics = MetricsCollector::new();
        for _ in 0..LATENCY_WINDOW {
            metrics.record_latency(StageId::Score, 1000.0);
        }
        for _ in 0..LATENCY_WINDOW {
            metrics.record_latency(StageId::Score, 5.0);
        }

        assert_eq!(metrics.state.read().latencies_ms[&StageId::Score].len(), LATENCY_WINDOW);
        let score = &metrics.summary().stages[&StageId::Score];
        assert_eq!(score.latency_p99_ms, 5.0);
    }

    #[test]
    fn test_means_keep_no_history() {
        let metrics = MetricsCollector::new();
        for count in [1, 2, 3, 6] {
            metrics.record_high_severity_count(count);
        }
        assert_eq!(metrics.summary().avg_high_severity_count, 3.0);
        assert_eq!(metrics.summary().avg_segment_count, 0.0);
    }
}
