//! Concurrent allocation tests.
//!
//! Many threads share one registry and reserve blocks from the same window.
//! No two successful reservations may overlap, and every reserved port must
//! be claimed in the registry until it is released.

mod common;

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::{port, range};
use pasv::{
    BlockAllocator, CancelToken, Error, MockListenerSource, PortRange, RecordingSleeper,
    ReservationRegistry,
};

fn shared_allocator(
    window: PortRange,
    bound: &[u16],
) -> Arc<BlockAllocator<MockListenerSource, RecordingSleeper>> {
    let listeners = MockListenerSource::new(bound.iter().map(|&p| port(p)).collect());
    let registry = Arc::new(ReservationRegistry::new());
    Arc::new(
        BlockAllocator::new(listeners, registry, window)
            .with_sleeper(RecordingSleeper::new())
            .with_settle_delay(Duration::from_millis(1)),
    )
}

/// Tests that threads racing on one window never receive overlapping blocks.
///
/// **Invariant verified:**
/// If N threads each reserve a block, all N blocks are pairwise disjoint and
/// every port in them is claimed.
#[test]
fn test_concurrent_reservations_disjoint() {
    let window = range(40000, 40199);
    let allocator = shared_allocator(window, &[40013, 40077]);
    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                allocator.reserve(5, &CancelToken::new())
            })
        })
        .collect();

    let blocks: Vec<PortRange> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap())
        .collect();

    let mut seen = HashSet::new();
    for block in &blocks {
        assert_eq!(block.len(), 5);
        assert!(window.encloses(block));
        for p in block.iter() {
            assert!(seen.insert(p), "port {p} handed out twice");
            assert_ne!(p.value(), 40013);
            assert_ne!(p.value(), 40077);
            assert!(allocator.registry().is_claimed(p));
        }
    }
    assert_eq!(allocator.registry().len(), threads * 5);
}

/// Tests that when demand exceeds capacity, winners are disjoint and losers
/// see exhaustion rather than a partial claim.
#[test]
fn test_contention_over_capacity() {
    let window = range(41000, 41019);
    let allocator = shared_allocator(window, &[]);
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                allocator.reserve(4, &CancelToken::new())
            })
        })
        .collect();

    let mut granted = Vec::new();
    let mut exhausted = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(block) => granted.push(block),
            Err(Error::WindowExhausted { count, .. }) => {
                assert_eq!(count, 4);
                exhausted += 1;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(granted.len(), 5);
    assert_eq!(exhausted, 3);
    for (i, a) in granted.iter().enumerate() {
        for b in &granted[i + 1..] {
            assert!(!a.overlaps(b), "{a} overlaps {b}");
        }
    }
    assert_eq!(allocator.registry().len(), 20);
}

/// Tests that blocks released by one thread become available to others.
#[test]
fn test_reserve_release_churn() {
    let window = range(42000, 42029);
    let allocator = shared_allocator(window, &[]);

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let allocator = Arc::clone(&allocator);
            thread::spawn(move || {
                for _ in 0..50 {
                    let lease = allocator.lease(3, &CancelToken::new()).unwrap();
                    assert_eq!(lease.block().len(), 3);
                    drop(lease);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(allocator.registry().is_empty());
}
