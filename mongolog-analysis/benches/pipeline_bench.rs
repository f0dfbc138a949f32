//! Throughput benchmarks for the hot per-line path.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use mongolog_core::config::FilterConfig;
use mongolog_core::PipelineCounters;
use mongolog_analysis::accumulators::operation::OperationAccumulator;
use mongolog_analysis::accumulators::Accumulator;
use mongolog_analysis::extract::RecordExtractor;
use mongolog_analysis::filter::LineFilter;

fn synthetic_lines(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            format!(
                r#"{{"t":{{"$date":"2024-03-01T10:00:00.000Z"}},"c":"COMMAND","ctx":"conn{}","msg":"Slow query","attr":{{"ns":"bench.items","command":{{"find":"items","filter":{{"k":{}}}}},"planSummary":"IXSCAN {{ k: 1 }}","keysExamined":{},"docsExamined":{},"nreturned":10,"queryHash":"QH{}","durationMillis":{}}}}}"#,
                i % 64,
                i,
                i % 100,
                i % 100,
                i % 8,
                i % 250,
            )
        })
        .collect()
}

fn bench_filter(c: &mut Criterion) {
    let filter = LineFilter::new(&FilterConfig::default()).unwrap();
    let lines = synthetic_lines(1_000);

    let mut group = c.benchmark_group("filter");
    group.throughput(Throughput::Elements(lines.len() as u64));
    group.bench_function("classify_1k", |b| {
        b.iter(|| {
            for line in &lines {
                black_box(filter.classify(line.as_bytes()));
            }
        })
    });
    group.finish();
}

fn bench_extract(c: &mut Criterion) {
    let extractor = RecordExtractor::new();
    let counters = PipelineCounters::new();
    let lines = synthetic_lines(1_000);

    let mut group = c.benchmark_group("extract");
    group.throughput(Throughput::Elements(lines.len() as u64));
    group.bench_function("extract_1k", |b| {
        b.iter(|| {
            for line in &lines {
                black_box(extractor.extract(line, &counters));
            }
        })
    });
    group.finish();
}

fn bench_accumulate(c: &mut Criterion) {
    let extractor = RecordExtractor::new();
    let counters = Arc::new(PipelineCounters::new());
    let lines = synthetic_lines(1_000);
    let records: Vec<_> = lines
        .iter()
        .filter_map(|l| extractor.extract(l, &counters).record)
        .collect();

    let mut group = c.benchmark_group("accumulate");
    group.throughput(Throughput::Elements(records.len() as u64));
    group.bench_function("operation_1k", |b| {
        b.iter(|| {
            let acc = OperationAccumulator::new(Arc::clone(&counters), 95.0);
            for rec in &records {
                acc.record(rec);
            }
            black_box(acc.entry_count())
        })
    });
    group.finish();
}

criterion_group!(benches, bench_filter, bench_extract, bench_accumulate);
criterion_main!(benches);
