//! Property-based tests for the sequencing core
//!
//! These tests use proptest to check the ordering, capacity and gating rules
//! over generated inputs.

use crate::disruptor::{
    BusySpinWaitStrategy, ConsumerId, Cursored, DefaultEventFactory, Disruptor, DisruptorError,
    MultiProducerSequencer, NoOpEventHandler, ProducerType, RingBuffer, Sequence, Sequencer,
    SingleProducerSequencer, ThreadExecutor,
};
use proptest::prelude::*;
use std::sync::Arc;

fn busy_spin() -> Arc<BusySpinWaitStrategy> {
    Arc::new(BusySpinWaitStrategy::new())
}

/// Property tests for Sequence
mod sequence_properties {
    use super::*;

    proptest! {
        #[test]
        fn add_and_get_accumulates(
            initial in -1_000_000i64..1_000_000,
            increments in prop::collection::vec(1i64..100, 1..50),
        ) {
            let sequence = Sequence::new(initial);
            let mut expected = initial;

            for increment in increments {
                expected += increment;
                prop_assert_eq!(sequence.add_and_get(increment), expected);
            }
            prop_assert_eq!(sequence.get(), expected);
        }

        #[test]
        fn compare_and_set_only_matches_current(
            initial in any::<i64>(),
            expected in any::<i64>(),
            new_value in any::<i64>(),
        ) {
            let sequence = Sequence::new(initial);
            let swapped = sequence.compare_and_set(expected, new_value);

            prop_assert_eq!(swapped, expected == initial);
            prop_assert_eq!(sequence.get(), if swapped { new_value } else { initial });
        }

        #[test]
        fn minimum_of_group(values in prop::collection::vec(-1000i64..1000, 0..16)) {
            let sequences: Vec<_> = values.iter().map(|value| Arc::new(Sequence::new(*value))).collect();
            let expected = values.iter().copied().min().unwrap_or(i64::MAX);
            prop_assert_eq!(Sequence::get_minimum_sequence(&sequences, i64::MAX), expected);
        }
    }
}

/// Property tests for `RingBuffer`
mod ring_buffer_properties {
    use super::*;

    proptest! {
        #[test]
        fn capacity_must_be_power_of_two(size in 0usize..5000) {
            let result = RingBuffer::<i64>::new(
                DefaultEventFactory::new(),
                size,
                ProducerType::Single,
                busy_spin(),
            );
            if size.is_power_of_two() {
                prop_assert_eq!(result.unwrap().buffer_size(), size);
            } else {
                prop_assert!(matches!(result, Err(DisruptorError::InvalidBufferSize(_))));
            }
        }

        #[test]
        fn latest_values_survive_wrapping(size_power in 1u32..8, count in 1usize..600) {
            let size = 1usize << size_power;
            let ring_buffer =
                RingBuffer::create_single_producer(DefaultEventFactory::<i64>::new(), size, busy_spin())
                    .unwrap();

            for value in 0..count as i64 {
                let sequence = ring_buffer.publish_event(|slot, _| *slot = value * 3).unwrap();
                prop_assert_eq!(sequence, value);
            }

            let oldest = count.saturating_sub(size) as i64;
            for sequence in oldest..count as i64 {
                // SAFETY: no producer is running and the sequence is published.
                let value = unsafe { *ring_buffer.get(sequence) };
                prop_assert_eq!(value, sequence * 3);
            }
        }

        #[test]
        fn batch_publish_covers_every_item(size_power in 1u32..8, items in prop::collection::vec(any::<i32>(), 1..128)) {
            let size = 1usize << size_power;
            prop_assume!(items.len() <= size);
            let ring_buffer =
                RingBuffer::create_multi_producer(DefaultEventFactory::<i32>::new(), size, busy_spin())
                    .unwrap();

            let high = ring_buffer
                .publish_events(items.clone(), |slot, _, item| *slot = item)
                .unwrap();

            prop_assert_eq!(high, items.len() as i64 - 1);
            for (sequence, item) in items.iter().enumerate() {
                prop_assert!(ring_buffer.is_available(sequence as i64));
                // SAFETY: published above.
                prop_assert_eq!(unsafe { *ring_buffer.get(sequence as i64) }, *item);
            }
        }
    }
}

/// Gating: a producer can never lap the slowest gating sequence
mod gating_properties {
    use super::*;

    fn claims_until_full(sequencer: &dyn Sequencer) -> i64 {
        let mut claimed = 0;
        loop {
            match sequencer.try_next() {
                Ok(sequence) => {
                    sequencer.publish(sequence);
                    claimed += 1;
                }
                Err(DisruptorError::InsufficientCapacity) => return claimed,
                Err(error) => panic!("unexpected claim error: {error}"),
            }
        }
    }

    proptest! {
        #[test]
        fn single_producer_never_overruns(size_power in 1u32..7, advances in prop::collection::vec(0i64..8, 1..10)) {
            let size = 1i64 << size_power;
            let sequencer = SingleProducerSequencer::new(size as usize, busy_spin()).unwrap();
            let consumer = Arc::new(Sequence::default());
            sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);

            prop_assert_eq!(claims_until_full(&sequencer), size);
            for advance in advances {
                let target = (consumer.get() + advance).min(sequencer.get_cursor());
                let freed = target - consumer.get();
                consumer.set(target);

                prop_assert_eq!(sequencer.remaining_capacity(), freed);
                prop_assert_eq!(claims_until_full(&sequencer), freed);
                prop_assert!(sequencer.get_cursor() - consumer.get() <= size);
            }
        }

        #[test]
        fn multi_producer_never_overruns(size_power in 1u32..7, advances in prop::collection::vec(0i64..8, 1..10)) {
            let size = 1i64 << size_power;
            let sequencer = MultiProducerSequencer::new(size as usize, busy_spin()).unwrap();
            let consumer = Arc::new(Sequence::default());
            sequencer.add_gating_sequences(&[Arc::clone(&consumer)]);

            prop_assert_eq!(claims_until_full(&sequencer), size);
            for advance in advances {
                let target = (consumer.get() + advance).min(sequencer.get_cursor());
                let freed = target - consumer.get();
                consumer.set(target);

                prop_assert_eq!(claims_until_full(&sequencer), freed);
                prop_assert!(sequencer.get_cursor() - consumer.get() <= size);
            }
        }
    }
}

/// Contiguity: consumers only see the gap-free published prefix
mod contiguity_properties {
    use super::*;

    proptest! {
        #[test]
        fn highest_published_is_contiguous_prefix(order in Just((0..32i64).collect::<Vec<_>>()).prop_shuffle()) {
            let sequencer = MultiProducerSequencer::new(64, busy_spin()).unwrap();
            let high = sequencer.next_n(32).unwrap();
            prop_assert_eq!(high, 31);

            let mut published = [false; 32];
            for sequence in order {
                sequencer.publish(sequence);
                published[sequence as usize] = true;

                let prefix = published.iter().take_while(|flag| **flag).count() as i64;
                prop_assert_eq!(sequencer.get_highest_published_sequence(0, high), prefix - 1);
            }
        }
    }
}

/// Topology: the gating set always equals the end-of-chain consumers
mod topology_properties {
    use super::*;

    fn upstream_choices() -> impl Strategy<Value = Vec<Vec<prop::sample::Index>>> {
        prop::collection::vec(prop::collection::vec(any::<prop::sample::Index>(), 0..3), 1..8)
    }

    proptest! {
        #[test]
        fn gating_set_tracks_end_of_chain(choices in upstream_choices()) {
            let mut disruptor = Disruptor::<u64>::new(
                DefaultEventFactory::new(),
                16,
                ProducerType::Multi,
                busy_spin(),
                Arc::new(ThreadExecutor::new("topology")),
            )
            .unwrap();

            let mut ids: Vec<ConsumerId> = Vec::new();
            let mut has_dependents = Vec::new();
            for picks in choices {
                let mut upstream: Vec<ConsumerId> = Vec::new();
                if !ids.is_empty() {
                    for pick in picks {
                        let id = ids[pick.index(ids.len())];
                        if !upstream.contains(&id) {
                            upstream.push(id);
                        }
                    }
                }
                for id in &upstream {
                    has_dependents[id.index()] = true;
                }
                ids.push(disruptor.handle_events_with(NoOpEventHandler::new(), &upstream).unwrap());
                has_dependents.push(false);
            }

            let gating = disruptor.ring_buffer().sequencer().gating_sequences();
            let mut expected = 0;
            for id in &ids {
                let info = disruptor.consumer(*id).unwrap();
                let end_of_chain = !has_dependents[id.index()];
                prop_assert_eq!(info.is_end_of_chain(), end_of_chain);

                let sequence = &info.sequences()[0];
                let gated = gating.iter().any(|gating| Arc::ptr_eq(gating, sequence));
                prop_assert_eq!(gated, end_of_chain);
                if end_of_chain {
                    expected += 1;
                }
            }
            prop_assert_eq!(gating.len(), expected);
        }
    }
}
