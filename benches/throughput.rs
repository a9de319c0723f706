use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chainring::disruptor::{
    BusySpinWaitStrategy, ClosureEventHandler, DefaultEventFactory, Disruptor, Executor,
    MultiProducerSequencer, ProducerType, Sequencer, SingleProducerSequencer, ThreadExecutor,
    YieldingWaitStrategy,
};

const EVENTS: u64 = 100_000;

#[derive(Debug, Default)]
struct BenchEvent {
    value: i64,
}

/// Claim and publish with no consumers attached
fn claim_publish_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("claim_publish");
    group.throughput(Throughput::Elements(1));

    let single = SingleProducerSequencer::new(1024, Arc::new(BusySpinWaitStrategy::new()))
        .expect("valid buffer size");
    group.bench_function("single_producer", |b| {
        b.iter(|| {
            let sequence = single.next().expect("claim");
            single.publish(black_box(sequence));
        });
    });

    let multi = MultiProducerSequencer::new(1024, Arc::new(BusySpinWaitStrategy::new()))
        .expect("valid buffer size");
    group.bench_function("multi_producer", |b| {
        b.iter(|| {
            let sequence = multi.next().expect("claim");
            multi.publish(black_box(sequence));
        });
    });

    group.finish();
}

fn run_pipeline(producer_type: ProducerType, buffer_size: usize, stages: usize) {
    let executor = Arc::new(ThreadExecutor::new("bench"));
    let mut disruptor = Disruptor::new(
        DefaultEventFactory::<BenchEvent>::new(),
        buffer_size,
        producer_type,
        Arc::new(YieldingWaitStrategy::new()),
        Arc::clone(&executor) as Arc<dyn Executor>,
    )
    .expect("valid buffer size");

    let sink = Arc::new(AtomicI64::new(0));
    let mut upstream = Vec::new();
    for _ in 0..stages {
        let sink = Arc::clone(&sink);
        let id = disruptor
            .handle_events_with(
                ClosureEventHandler::new(move |event: &BenchEvent, _, end_of_batch| {
                    if end_of_batch {
                        sink.fetch_add(event.value, Ordering::Relaxed);
                    }
                    Ok(())
                }),
                &upstream,
            )
            .expect("register stage");
        upstream = vec![id];
    }

    disruptor.start().expect("start");
    for value in 0..EVENTS {
        disruptor
            .publish_event(|event, _| event.value = value as i64)
            .expect("publish");
    }
    disruptor.shutdown(None).expect("drain");
    executor.join_all().expect("join");
    black_box(sink.load(Ordering::Relaxed));
}

/// End-to-end pipelines of one and three chained stages
fn pipeline_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.throughput(Throughput::Elements(EVENTS));
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(10);

    for stages in [1, 3] {
        for buffer_size in [256, 4096] {
            group.bench_with_input(
                BenchmarkId::new(format!("single_{stages}_stages"), buffer_size),
                &buffer_size,
                |b, &size| b.iter(|| run_pipeline(ProducerType::Single, size, stages)),
            );
        }
        group.bench_with_input(
            BenchmarkId::new(format!("multi_{stages}_stages"), 4096),
            &4096,
            |b, &size| b.iter(|| run_pipeline(ProducerType::Multi, size, stages)),
        );
    }

    group.finish();
}

criterion_group!(benches, claim_publish_benchmark, pipeline_benchmark);
criterion_main!(benches);
