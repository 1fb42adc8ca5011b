//! Observability: trace records, metrics and log setup.

mod logging;
mod metrics;
mod trace;

pub use logging::{init_logging, LogFormat, DEFAULT_FILTER};
pub use metrics::{MetricsCollector, MetricsSummary, StageMetrics, LATENCY_WINDOW};
pub use trace::{fingerprint, TraceHandle, TraceOutcome, TraceRecord, TraceRecorder};
