#![allow(missing_docs, clippy::all)]

//! Consumer graph topologies running on real threads
//!
//! Chains, diamonds and worker pools; every test drains the ring buffer with
//! `shutdown` and joins the consumer threads before asserting.

use chainring::disruptor::{
    ClosureEventHandler, ClosureWorkHandler, DefaultEventFactory, Disruptor, Executor,
    ProducerType, ThreadExecutor, YieldingWaitStrategy,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Order {
    id: u64,
    amount: i64,
}

type Log = Arc<Mutex<Vec<u64>>>;

fn new_disruptor(name: &str, size: usize) -> (Disruptor<Order>, Arc<ThreadExecutor>) {
    let executor = Arc::new(ThreadExecutor::new(name));
    let disruptor = Disruptor::new(
        DefaultEventFactory::new(),
        size,
        ProducerType::Single,
        Arc::new(YieldingWaitStrategy::new()),
        Arc::clone(&executor) as Arc<dyn Executor>,
    )
    .unwrap();
    (disruptor, executor)
}

fn recording_handler(
    log: Log,
) -> ClosureEventHandler<Order, impl FnMut(&Order, i64, bool) -> chainring::Result<()> + Send> {
    ClosureEventHandler::new(move |order: &Order, _, _| {
        log.lock().push(order.id);
        Ok(())
    })
}

fn publish(disruptor: &Disruptor<Order>, count: u64) {
    for id in 0..count {
        disruptor
            .publish_event(|order, _| {
                order.id = id;
                order.amount = id as i64 * 2;
            })
            .unwrap();
    }
}

#[test]
fn test_chain_gates_producer_on_tail_only() {
    let (mut disruptor, executor) = new_disruptor("chain", 8);
    let first: Log = Arc::default();
    let second: Log = Arc::default();

    let a = disruptor.handle_events_with(recording_handler(Arc::clone(&first)), &[]).unwrap();
    let b = disruptor.handle_events_with(recording_handler(Arc::clone(&second)), &[a]).unwrap();

    let gating = disruptor.ring_buffer().sequencer().gating_sequences();
    assert_eq!(gating.len(), 1);
    assert!(Arc::ptr_eq(&gating[0], &disruptor.consumer(b).unwrap().sequences()[0]));
    assert!(!disruptor.consumer(a).unwrap().is_end_of_chain());

    disruptor.start().unwrap();
    // Far more events than slots, so the producer wraps many times.
    publish(&disruptor, 500);
    disruptor.shutdown(None).unwrap();
    executor.join_all().unwrap();

    let expected: Vec<u64> = (0..500).collect();
    assert_eq!(*first.lock(), expected);
    assert_eq!(*second.lock(), expected);
}

#[test]
fn test_diamond_join_sees_both_branches() {
    let (mut disruptor, executor) = new_disruptor("diamond", 16);
    let journal: Log = Arc::default();
    let replicate: Log = Arc::default();
    let violations = Arc::new(AtomicUsize::new(0));
    let joined: Log = Arc::default();

    let j = disruptor.handle_events_with(recording_handler(Arc::clone(&journal)), &[]).unwrap();
    let r = disruptor.handle_events_with(recording_handler(Arc::clone(&replicate)), &[]).unwrap();
    {
        let journal = Arc::clone(&journal);
        let replicate = Arc::clone(&replicate);
        let violations = Arc::clone(&violations);
        let joined = Arc::clone(&joined);
        disruptor
            .handle_events_with(
                ClosureEventHandler::new(move |order: &Order, _, _| {
                    // Both upstream branches must already have seen this event.
                    let seen_by_journal = journal.lock().len() as u64 > order.id;
                    let seen_by_replicate = replicate.lock().len() as u64 > order.id;
                    if !(seen_by_journal && seen_by_replicate) {
                        violations.fetch_add(1, Ordering::Relaxed);
                    }
                    joined.lock().push(order.id);
                    Ok(())
                }),
                &[j, r],
            )
            .unwrap();
    }

    assert_eq!(disruptor.ring_buffer().sequencer().gating_sequences().len(), 1);

    disruptor.start().unwrap();
    publish(&disruptor, 1000);
    disruptor.shutdown(None).unwrap();
    executor.join_all().unwrap();

    assert_eq!(violations.load(Ordering::Relaxed), 0);
    assert_eq!(*joined.lock(), (0..1000).collect::<Vec<_>>());
}

#[test]
fn test_worker_pool_handles_each_event_once() {
    let (mut disruptor, executor) = new_disruptor("pool", 32);
    let handled: Log = Arc::default();
    let per_worker: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::default()).collect();

    let handlers: Vec<_> = per_worker
        .iter()
        .map(|count| {
            let count = Arc::clone(count);
            let handled = Arc::clone(&handled);
            ClosureWorkHandler::new(move |order: &Order| {
                count.fetch_add(1, Ordering::Relaxed);
                handled.lock().push(order.id);
                Ok(())
            })
        })
        .collect();
    let pool = disruptor.handle_events_with_worker_pool(handlers, &[]).unwrap();

    // A batch stage behind the pool only sees events the whole pool passed.
    let after_pool: Log = Arc::default();
    disruptor
        .handle_events_with(recording_handler(Arc::clone(&after_pool)), &[pool])
        .unwrap();
    assert!(!disruptor.consumer(pool).unwrap().is_end_of_chain());

    disruptor.start().unwrap();
    publish(&disruptor, 2000);
    disruptor.shutdown(None).unwrap();
    executor.join_all().unwrap();

    let mut handled = handled.lock().clone();
    handled.sort_unstable();
    assert_eq!(handled, (0..2000).collect::<Vec<_>>());
    assert_eq!(
        per_worker.iter().map(|count| count.load(Ordering::Relaxed)).sum::<usize>(),
        2000
    );
    assert_eq!(*after_pool.lock(), (0..2000).collect::<Vec<_>>());
}

#[test]
fn test_batch_publish_through_pipeline() {
    let (mut disruptor, executor) = new_disruptor("batch", 64);
    let total = Arc::new(AtomicUsize::new(0));
    {
        let total = Arc::clone(&total);
        disruptor
            .handle_events_with(
                ClosureEventHandler::new(move |order: &Order, _, _| {
                    total.fetch_add(order.amount as usize, Ordering::Relaxed);
                    Ok(())
                }),
                &[],
            )
            .unwrap();
    }

    disruptor.start().unwrap();
    for chunk in (0..1000u64).collect::<Vec<_>>().chunks(50) {
        disruptor
            .publish_events(chunk.iter().copied(), |order, _, id| {
                order.id = id;
                order.amount = 1;
            })
            .unwrap();
    }
    disruptor.shutdown(None).unwrap();
    executor.join_all().unwrap();

    assert_eq!(total.load(Ordering::Relaxed), 1000);
    assert_eq!(disruptor.cursor(), 999);
}
