//! The in-process reservation registry.
//!
//! A port present in the registry is unavailable to every allocation made
//! against it, whatever the OS thinks of the port. Entries are added only by
//! [`ReservationRegistry::claim_block`] and removed only by release.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cancel::CancelToken;
use crate::{Error, Port, PortRange, Result};

use super::listeners::ListenerSnapshot;

/// Bookkeeping for one claimed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClaimRecord {
    /// When the block containing this port was claimed.
    pub claimed_at: DateTime<Utc>,
    /// The first port of the block this port was claimed with.
    pub block_start: Port,
}

/// Outcome of a single atomic claim attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// Every port of the block is now held by the caller.
    Claimed(PortRange),
    /// The block could not be taken whole. Nothing was inserted.
    Collision {
        /// The first port that blocked the claim.
        port: Port,
        /// Why that port blocked it.
        reason: CollisionReason,
    },
}

/// Why a claim lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionReason {
    /// Another allocation already holds the port.
    Claimed,
    /// The fresh listener snapshot shows the port bound on the host.
    Bound,
}

/// Process-local registry of claimed ports.
///
/// Share one registry between every allocator that must not hand out the same
/// port twice, usually through an `Arc`.
///
/// # Examples
///
/// ```
/// use pasv::port::listeners::ListenerSnapshot;
/// use pasv::port::registry::{ClaimOutcome, ReservationRegistry};
/// use pasv::{CancelToken, Port, PortRange};
///
/// let registry = ReservationRegistry::new();
/// let block = PortRange::from_start(Port::try_from(30000).unwrap(), 3).unwrap();
///
/// let outcome = registry
///     .claim_block(block, &CancelToken::new(), |_| Ok(ListenerSnapshot::empty()))
///     .unwrap();
/// assert_eq!(outcome, ClaimOutcome::Claimed(block));
/// assert_eq!(registry.len(), 3);
///
/// registry.release(Port::try_from(30001).unwrap());
/// registry.release(Port::try_from(30001).unwrap()); // no-op
/// assert_eq!(registry.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ReservationRegistry {
    claims: Mutex<HashMap<Port, ClaimRecord>>,
}

impl ReservationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims every port of `block`, or none of them.
    ///
    /// Runs entirely under the registry lock: `fresh_snapshot` is called with
    /// the block to re-read the host's listener state, every port is checked
    /// against it, and then the ports are inserted one by one. If any port is
    /// bound or already claimed, every insert made by this call is undone and
    /// [`ClaimOutcome::Collision`] is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if `fresh_snapshot` fails, or [`Error::Cancelled`] if
    /// `cancel` fires while the claim is in progress. In both cases the
    /// registry is left exactly as it was.
    pub fn claim_block<F>(
        &self,
        block: PortRange,
        cancel: &CancelToken,
        fresh_snapshot: F,
    ) -> Result<ClaimOutcome>
    where
        F: FnOnce(&PortRange) -> Result<ListenerSnapshot>,
    {
        let mut claims = self.lock();
        let snapshot = fresh_snapshot(&block)?;

        let mut batch = BatchClaim {
            claims: &mut *claims,
            inserted: Vec::with_capacity(block.iter().len()),
            committed: false,
        };
        let record = ClaimRecord {
            claimed_at: Utc::now(),
            block_start: block.start(),
        };

        for port in block {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if snapshot.is_bound(port) {
                return Ok(ClaimOutcome::Collision {
                    port,
                    reason: CollisionReason::Bound,
                });
            }
            if !batch.insert(port, record) {
                return Ok(ClaimOutcome::Collision {
                    port,
                    reason: CollisionReason::Claimed,
                });
            }
        }

        batch.commit();
        Ok(ClaimOutcome::Claimed(block))
    }

    /// Removes one port from the registry.
    ///
    /// Returns `true` if the port was claimed. Releasing a port that is not
    /// claimed does nothing.
    pub fn release(&self, port: Port) -> bool {
        self.lock().remove(&port).is_some()
    }

    /// Releases every port of `range`, returning how many were claimed.
    pub fn release_range(&self, range: PortRange) -> usize {
        let mut claims = self.lock();
        range
            .iter()
            .filter(|port| claims.remove(port).is_some())
            .count()
    }

    /// Returns `true` if `port` is currently claimed.
    #[must_use]
    pub fn is_claimed(&self, port: Port) -> bool {
        self.lock().contains_key(&port)
    }

    /// Returns the claimed ports that fall inside `range`.
    #[must_use]
    pub fn claimed_in(&self, range: &PortRange) -> HashSet<Port> {
        self.lock()
            .keys()
            .copied()
            .filter(|port| range.contains(*port))
            .collect()
    }

    /// Returns a copy of all claims, ordered by port.
    #[must_use]
    pub fn entries(&self) -> Vec<(Port, ClaimRecord)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(port, record)| (*port, *record))
            .collect();
        entries.sort_unstable_by_key(|(port, _)| *port);
        entries
    }

    /// Number of claimed ports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is claimed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Port, ClaimRecord>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ports inserted by one in-flight claim. Removed again on drop unless the
/// claim was committed.
struct BatchClaim<'a> {
    claims: &'a mut HashMap<Port, ClaimRecord>,
    inserted: Vec<Port>,
    committed: bool,
}

impl BatchClaim<'_> {
    fn insert(&mut self, port: Port, record: ClaimRecord) -> bool {
        if self.claims.contains_key(&port) {
            return false;
        }
        self.claims.insert(port, record);
        self.inserted.push(port);
        true
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for BatchClaim<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for port in self.inserted.drain(..) {
            self.claims.remove(&port);
        }
    }
}
