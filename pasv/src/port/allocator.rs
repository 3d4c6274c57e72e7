//! Contiguous block allocation.
//!
//! The allocator scans its window in ascending order for `count` consecutive
//! ports that are neither bound on the host nor claimed in the registry, then
//! claims the whole block atomically. Losing a claim to a concurrent
//! allocation is expected and only moves the cursor forward by one port; the
//! only failure a caller sees is [`Error::WindowExhausted`].
//!
//! Scanning uses a cached [`ListenerSnapshot`]. The cache is dropped when the
//! cursor wraps back to the start of the window, after a short settle pause
//! that gives recently released ports time to be unbound. A second pass that
//! also fails ends the search.
//!
//! The claim itself re-reads listener state under the registry lock, which
//! closes the gap against other allocators in this process. Nothing closes
//! the gap between the claim and the moment the downstream service actually
//! binds; another process can still take a port in that window.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::{CancelToken, CancellableSleeper, Sleeper};
use crate::config::Config;
use crate::error::Error;
use crate::{Port, PortRange, Result};

use super::lease::PortLease;
use super::listeners::{ListenerQueryConfig, ListenerSnapshot, ListenerSource, SystemListenerSource};
use super::registry::{ClaimOutcome, ReservationRegistry};

/// Default pause before rescanning a window after a failed pass.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(250);

/// Allocates contiguous port blocks from a fixed window.
///
/// # Type Parameters
///
/// * `L` - where live listener state comes from (defaults to [`SystemListenerSource`])
/// * `S` - how the settle pause is performed (defaults to [`CancellableSleeper`])
///
/// # Examples
///
/// ```
/// use pasv::port::allocator::BlockAllocator;
/// use pasv::port::listeners::MockListenerSource;
/// use pasv::port::registry::ReservationRegistry;
/// use pasv::{CancelToken, Port, PortRange};
/// use std::sync::Arc;
///
/// let window = PortRange::new(Port::try_from(30000).unwrap(), Port::try_from(30004).unwrap()).unwrap();
/// let registry = Arc::new(ReservationRegistry::new());
/// let allocator = BlockAllocator::new(MockListenerSource::empty(), Arc::clone(&registry), window);
///
/// let block = allocator.reserve(5, &CancelToken::new()).unwrap();
/// assert_eq!(block, window);
///
/// for port in block {
///     allocator.release(port);
/// }
/// assert!(registry.is_empty());
/// ```
#[derive(Debug)]
pub struct BlockAllocator<L: ListenerSource = SystemListenerSource, S: Sleeper = CancellableSleeper>
{
    listeners: L,
    sleeper: S,
    registry: Arc<ReservationRegistry>,
    window: PortRange,
    settle_delay: Duration,
    query: ListenerQueryConfig,
}

impl<L: ListenerSource> BlockAllocator<L, CancellableSleeper> {
    /// Creates an allocator over `window` that claims into `registry`.
    #[must_use]
    pub fn new(listeners: L, registry: Arc<ReservationRegistry>, window: PortRange) -> Self {
        Self {
            listeners,
            sleeper: CancellableSleeper,
            registry,
            window,
            settle_delay: DEFAULT_SETTLE_DELAY,
            query: ListenerQueryConfig::default(),
        }
    }
}

impl<L: ListenerSource, S: Sleeper> BlockAllocator<L, S> {
    /// Replaces the sleeper used for the settle pause.
    #[must_use]
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> BlockAllocator<L, T> {
        BlockAllocator {
            listeners: self.listeners,
            sleeper,
            registry: self.registry,
            window: self.window,
            settle_delay: self.settle_delay,
            query: self.query,
        }
    }

    /// Sets the pause taken before rescanning a wrapped window.
    #[must_use]
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Sets the options passed to every listener query.
    #[must_use]
    pub fn with_query_config(mut self, query: ListenerQueryConfig) -> Self {
        self.query = query;
        self
    }

    /// The configured window.
    #[must_use]
    pub fn window(&self) -> &PortRange {
        &self.window
    }

    /// The registry blocks are claimed into.
    #[must_use]
    pub fn registry(&self) -> &Arc<ReservationRegistry> {
        &self.registry
    }

    /// The listener source.
    #[must_use]
    pub fn listeners(&self) -> &L {
        &self.listeners
    }

    /// The settle pause.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Reserves `count` consecutive ports from the configured window.
    ///
    /// # Errors
    ///
    /// See [`reserve_in`](Self::reserve_in).
    pub fn reserve(&self, count: u16, cancel: &CancelToken) -> Result<PortRange> {
        self.reserve_in(self.window, count, cancel)
    }

    /// Reserves `count` consecutive ports from the configured window and wraps
    /// them in a lease that releases them when dropped.
    ///
    /// # Errors
    ///
    /// See [`reserve_in`](Self::reserve_in).
    pub fn lease(&self, count: u16, cancel: &CancelToken) -> Result<PortLease> {
        let block = self.reserve(count, cancel)?;
        Ok(PortLease::new(Arc::clone(&self.registry), block))
    }

    /// Reserves `count` consecutive ports from `window`.
    ///
    /// The returned block lies inside `window`, holds exactly `count` ports,
    /// and every port in it is now claimed in the registry.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] if `count` is zero
    /// - [`Error::WindowExhausted`] if no block could be claimed after the
    ///   window was scanned twice
    /// - [`Error::Cancelled`] if `cancel` fires; a claim in progress is rolled
    ///   back first
    /// - any error from the listener source
    pub fn reserve_in(&self, window: PortRange, count: u16, cancel: &CancelToken) -> Result<PortRange> {
        if count == 0 {
            return Err(Error::Validation {
                field: "count".into(),
                message: "block size must be at least 1".into(),
            });
        }
        let exhausted = || Error::WindowExhausted { window, count };
        let last_start = u32::from(window.last_block_start(count).ok_or_else(exhausted)?.value());
        let first = u32::from(window.start().value());

        let mut cursor = first;
        let mut cached: Option<ListenerSnapshot> = None;
        let mut wrapped = false;

        loop {
            cancel.check()?;

            let snapshot = match cached.take() {
                Some(snapshot) => snapshot,
                None => self.listeners.snapshot(&window, &self.query)?,
            };
            let claimed = self.registry.claimed_in(&window);
            let candidate = find_candidate(cursor, last_start, count, &snapshot, &claimed);
            cached = Some(snapshot);

            if let Some(start) = candidate {
                let block = PortRange::from_start(start, count).ok_or_else(exhausted)?;
                let outcome = self.registry.claim_block(block, cancel, |block| {
                    self.listeners.snapshot(block, &self.query)
                })?;

                match outcome {
                    ClaimOutcome::Claimed(block) => {
                        log::debug!("claimed block {block} from window {window}");
                        return Ok(block);
                    }
                    ClaimOutcome::Collision { port, reason } => {
                        log::debug!("claim of {block} lost at port {port} ({reason:?})");
                        cursor = u32::from(start.value()) + 1;
                        if cursor <= last_start {
                            continue;
                        }
                    }
                }
            }

            if wrapped {
                log::debug!("no block of {count} left in {window} after rescan");
                return Err(exhausted());
            }
            wrapped = true;
            cursor = first;
            cached = None;
            log::debug!(
                "window {window} scanned without a claim; rescanning after {:?}",
                self.settle_delay
            );
            self.sleeper.sleep(self.settle_delay, cancel)?;
        }
    }

    /// Releases one port. Releasing a port that is not claimed does nothing.
    pub fn release(&self, port: Port) -> bool {
        self.registry.release(port)
    }
}

/// Finds the lowest block start in `cursor..=last_start` whose `count` ports
/// are all unbound and unclaimed.
///
/// When a busy port is hit, no block containing it can qualify, so the search
/// resumes just past it. This visits the same starts, in the same order, as
/// stepping one port at a time.
fn find_candidate(
    cursor: u32,
    last_start: u32,
    count: u16,
    snapshot: &ListenerSnapshot,
    claimed: &HashSet<Port>,
) -> Option<Port> {
    let mut start = cursor;
    'starts: while start <= last_start {
        for value in start..start + u32::from(count) {
            let port = port_at(value)?;
            if snapshot.is_bound(port) || claimed.contains(&port) {
                start = value + 1;
                continue 'starts;
            }
        }
        return port_at(start);
    }
    None
}

fn port_at(value: u32) -> Option<Port> {
    u16::try_from(value)
        .ok()
        .and_then(|value| Port::try_from(value).ok())
}

/// Builds an allocator for the host from configuration.
///
/// # Errors
///
/// Returns an error if the configured window is invalid.
pub fn allocator_from_config(
    config: &Config,
    registry: Arc<ReservationRegistry>,
) -> Result<BlockAllocator<SystemListenerSource>> {
    let window = config.window_range()?;
    Ok(BlockAllocator::new(SystemListenerSource, registry, window)
        .with_settle_delay(config.settle_delay())
        .with_query_config(config.listener_query()))
}
