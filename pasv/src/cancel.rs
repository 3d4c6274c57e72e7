//! Cooperative cancellation and interruptible sleeping.
//!
//! The allocator's settle pause and the poller's inter-attempt delay are the
//! only places pasv blocks. Both go through a [`Sleeper`] so that tests can
//! replace wall-clock waits, and both wake early when a [`CancelToken`] fires.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::{Error, Result};

/// A cloneable cancellation signal with an optional deadline.
///
/// All clones share the same state. Cancelling any clone wakes every thread
/// currently sleeping on the token.
///
/// # Examples
///
/// ```
/// use pasv::CancelToken;
/// use std::time::Duration;
///
/// let token = CancelToken::new();
/// let remote = token.clone();
/// remote.cancel();
/// assert!(token.is_cancelled());
/// assert!(token.check().is_err());
///
/// // A deadline behaves like a cancel that fires on its own.
/// let expired = CancelToken::with_timeout(Duration::ZERO);
/// assert!(expired.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
    deadline: Option<Instant>,
    #[cfg(test)]
    checks_left: Option<Arc<std::sync::atomic::AtomicUsize>>,
}

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    signal: Condvar,
}

impl CancelToken {
    /// Creates a token that only fires when [`cancel`](Self::cancel) is called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that also fires once `timeout` has elapsed.
    ///
    /// A timeout too large to represent as an [`Instant`] sets no deadline.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::default()
        }
    }

    /// A token that passes `checks` calls to `is_cancelled` and fires on the
    /// next one.
    #[cfg(test)]
    pub(crate) fn firing_after(checks: usize) -> Self {
        Self {
            checks_left: Some(Arc::new(std::sync::atomic::AtomicUsize::new(checks))),
            ..Self::default()
        }
    }

    /// Returns the deadline, if one was set.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fires the token and wakes all sleepers.
    pub fn cancel(&self) {
        let mut cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.state.signal.notify_all();
    }

    /// Returns `true` if the token was cancelled or its deadline has passed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        #[cfg(test)]
        if let Some(left) = &self.checks_left {
            use std::sync::atomic::Ordering;
            if left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_err()
            {
                return true;
            }
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return true;
        }
        *self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns [`Error::Cancelled`] if the token has fired.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when [`is_cancelled`](Self::is_cancelled)
    /// is `true`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Blocks for up to `duration` without spinning.
    ///
    /// Returns `true` if the wait ended because the token fired, `false` if
    /// the full duration elapsed.
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        // `None` means the wait is unbounded.
        let requested_end = Instant::now().checked_add(duration);
        let end = match (self.deadline, requested_end) {
            (Some(deadline), Some(requested)) => Some(deadline.min(requested)),
            (Some(deadline), None) => Some(deadline),
            (None, requested) => requested,
        };

        let mut cancelled = self
            .state
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        loop {
            if *cancelled {
                return true;
            }
            cancelled = match end {
                Some(end) => {
                    let now = Instant::now();
                    if now >= end {
                        // Hitting the deadline counts as cancellation, hitting the
                        // requested duration does not.
                        return requested_end.map_or(true, |requested| end < requested);
                    }
                    self.state
                        .signal
                        .wait_timeout(cancelled, end - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                None => self
                    .state
                    .signal
                    .wait(cancelled)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }
}

/// Something that can pause the current thread.
///
/// Implementations must return [`Error::Cancelled`] rather than sleeping
/// through a fired token.
pub trait Sleeper: Send + Sync {
    /// Pauses for `duration` unless `cancel` fires first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if the token fires before or during the
    /// pause.
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<()>;
}

/// Production sleeper: a condition-variable wait on the cancel token.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancellableSleeper;

impl Sleeper for CancellableSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        if cancel.wait_timeout(duration) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Sleeper that returns immediately and records every requested pause.
///
/// Used by tests to assert on backoff behavior without waiting.
///
/// ```
/// use pasv::{CancelToken, RecordingSleeper, Sleeper};
/// use std::time::Duration;
///
/// let sleeper = RecordingSleeper::new();
/// sleeper.sleep(Duration::from_secs(5), &CancelToken::new()).unwrap();
/// assert_eq!(sleeper.pauses(), vec![Duration::from_secs(5)]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    pauses: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every pause requested so far, in order.
    #[must_use]
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration, cancel: &CancelToken) -> Result<()> {
        cancel.check()?;
        self.pauses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(duration);
        Ok(())
    }
}
