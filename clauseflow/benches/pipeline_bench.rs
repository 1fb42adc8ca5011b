//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use clauseflow::config::OrchestratorConfig;
use clauseflow::context::OrchestratorContext;
use clauseflow::pipeline::PipelineOrchestrator;
use clauseflow::store::InMemoryStateStore;
use clauseflow::testing::{sample_executors, sample_seed};

fn pipeline_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let orchestrator = PipelineOrchestrator::new(
        OrchestratorContext::new(Arc::new(InMemoryStateStore::new())),
        sample_executors(),
        OrchestratorConfig::default(),
    );

    c.bench_function("full_run_in_memory", |b| {
        b.iter(|| {
            let result = runtime.block_on(orchestrator.run(sample_seed(), "bench", None));
            black_box(result.status)
        });
    });

    let done = runtime.block_on(orchestrator.run(sample_seed(), "bench", None));
    c.bench_function("resume_completed_run", |b| {
        b.iter(|| {
            let result = runtime.block_on(orchestrator.resume(&done.run_id));
            black_box(result.skipped.len())
        });
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
