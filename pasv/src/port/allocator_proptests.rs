//! Property-based tests for block allocation.
//!
//! These drive [`BlockAllocator`] with randomly placed listeners and claims
//! and check the guarantees every successful reservation must keep.

use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;

use crate::cancel::{CancelToken, RecordingSleeper};
use crate::port::allocator::BlockAllocator;
use crate::port::listeners::{ListenerSnapshot, MockListenerSource};
use crate::port::registry::ReservationRegistry;
use crate::{Error, Port, PortRange};

// ============================================================================
// STRATEGY DEFINITIONS
// ============================================================================

/// Windows between 1 and 64 ports wide, placed anywhere a full window fits.
fn window_strategy() -> impl Strategy<Value = PortRange> {
    (Port::MIN..=65000u16, 0u16..64).prop_map(|(start, extra)| {
        let start = Port::try_from(start).unwrap();
        PortRange::from_start(start, extra + 1).unwrap()
    })
}

/// A window together with a random subset of its ports marked bound.
fn window_with_listeners() -> impl Strategy<Value = (PortRange, HashSet<Port>)> {
    window_strategy().prop_flat_map(|window| {
        let ports: Vec<Port> = window.iter().collect();
        let max = ports.len();
        (
            Just(window),
            proptest::sample::subsequence(ports, 0..=max).prop_map(|v| v.into_iter().collect()),
        )
    })
}

fn allocator(
    window: PortRange,
    bound: HashSet<Port>,
) -> BlockAllocator<MockListenerSource, RecordingSleeper> {
    BlockAllocator::new(
        MockListenerSource::new(bound),
        Arc::new(ReservationRegistry::new()),
        window,
    )
    .with_sleeper(RecordingSleeper::new())
}

/// Ground truth: does any run of `count` free ports exist?
fn has_free_run(window: &PortRange, bound: &HashSet<Port>, count: u16) -> bool {
    ListenerSnapshot::new(bound.clone())
        .free_runs(window)
        .iter()
        .any(|run| run.len() >= u32::from(count))
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    /// A successful reservation is exactly `count` contiguous ports inside
    /// the window, none of them bound, all of them claimed.
    #[test]
    fn prop_block_is_contiguous_free_and_claimed(
        (window, bound) in window_with_listeners(),
        count in 1u16..=16,
    ) {
        let allocator = allocator(window, bound.clone());

        match allocator.reserve(count, &CancelToken::new()) {
            Ok(block) => {
                prop_assert_eq!(block.len(), u32::from(count));
                prop_assert!(window.encloses(&block));
                for port in block {
                    prop_assert!(!bound.contains(&port));
                    prop_assert!(allocator.registry().is_claimed(port));
                }
                prop_assert_eq!(allocator.registry().len(), usize::from(count));
            }
            Err(err) => {
                prop_assert!(err.is_exhausted(), "unexpected error: {}", err);
                prop_assert!(!has_free_run(&window, &bound, count));
                prop_assert!(allocator.registry().is_empty());
            }
        }
    }

    /// The allocator never reports exhaustion while a free run exists, and
    /// always picks the lowest one.
    #[test]
    fn prop_lowest_free_run_is_chosen(
        (window, bound) in window_with_listeners(),
        count in 1u16..=8,
    ) {
        let expected = ListenerSnapshot::new(bound.clone())
            .free_runs(&window)
            .into_iter()
            .find(|run| run.len() >= u32::from(count))
            .map(|run| run.start());

        let result = allocator(window, bound).reserve(count, &CancelToken::new());
        prop_assert_eq!(result.ok().map(|block| block.start()), expected);
    }

    /// Blocks handed out one after another from the same registry never
    /// share a port.
    #[test]
    fn prop_sequential_blocks_are_disjoint(
        window in window_strategy(),
        sizes in prop::collection::vec(1u16..=6, 1..12),
    ) {
        let allocator = allocator(window, HashSet::new());
        let token = CancelToken::new();
        let mut held: Vec<PortRange> = Vec::new();

        for count in sizes {
            if let Ok(block) = allocator.reserve(count, &token) {
                for other in &held {
                    prop_assert!(!block.overlaps(other), "{} overlaps {}", block, other);
                }
                held.push(block);
            }
        }

        let total: u32 = held.iter().map(PortRange::len).sum();
        prop_assert_eq!(allocator.registry().len(), total as usize);
    }

    /// A window smaller than the request fails fast instead of scanning.
    #[test]
    fn prop_undersized_window_is_exhausted(
        window in window_strategy(),
        surplus in 1u16..100,
    ) {
        let count = u16::try_from(window.len()).unwrap() + surplus;
        let allocator = allocator(window, HashSet::new());

        let err = allocator.reserve(count, &CancelToken::new()).unwrap_err();
        let exhausted = matches!(err, Error::WindowExhausted { count: c, .. } if c == count);
        prop_assert!(exhausted);
        prop_assert_eq!(allocator.listeners().snapshot_count(), 0);
    }

    /// Releasing a block makes the same block available again.
    #[test]
    fn prop_release_makes_block_reusable(
        (window, bound) in window_with_listeners(),
        count in 1u16..=8,
    ) {
        let allocator = allocator(window, bound);
        let token = CancelToken::new();

        if let Ok(block) = allocator.reserve(count, &token) {
            for port in block {
                allocator.release(port);
            }
            prop_assert_eq!(allocator.reserve(count, &token).ok(), Some(block));
        }
    }
}
