//! Scoped ownership of a reserved block.

use std::sync::Arc;

use crate::PortRange;

use super::registry::ReservationRegistry;

/// A reserved block that is released when the lease is dropped.
///
/// # Examples
///
/// ```
/// use pasv::port::lease::PortLease;
/// use pasv::port::listeners::ListenerSnapshot;
/// use pasv::port::registry::ReservationRegistry;
/// use pasv::{CancelToken, Port, PortRange};
/// use std::sync::Arc;
///
/// let registry = Arc::new(ReservationRegistry::new());
/// let block = PortRange::from_start(Port::try_from(30000).unwrap(), 2).unwrap();
/// registry
///     .claim_block(block, &CancelToken::new(), |_| Ok(ListenerSnapshot::empty()))
///     .unwrap();
///
/// let lease = PortLease::new(Arc::clone(&registry), block);
/// assert_eq!(registry.len(), 2);
/// drop(lease);
/// assert!(registry.is_empty());
/// ```
#[derive(Debug)]
#[must_use = "dropping a lease releases its ports immediately"]
pub struct PortLease {
    registry: Arc<ReservationRegistry>,
    block: PortRange,
    released: bool,
}

impl PortLease {
    /// Takes ownership of an already claimed block.
    pub fn new(registry: Arc<ReservationRegistry>, block: PortRange) -> Self {
        Self {
            registry,
            block,
            released: false,
        }
    }

    /// The leased block.
    #[must_use]
    pub fn block(&self) -> PortRange {
        self.block
    }

    /// Releases every port of the block now, returning how many were still
    /// claimed.
    pub fn release(mut self) -> usize {
        self.release_ports()
    }

    /// Gives up the lease without releasing its ports.
    ///
    /// The caller becomes responsible for releasing the block.
    #[must_use]
    pub fn into_block(mut self) -> PortRange {
        self.released = true;
        self.block
    }

    fn release_ports(&mut self) -> usize {
        if self.released {
            return 0;
        }
        self.released = true;
        let released = self.registry.release_range(self.block);
        log::debug!("released block {} ({released} port(s) held)", self.block);
        released
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        self.release_ports();
    }
}
