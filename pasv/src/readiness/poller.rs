//! The retry loop around a [`ReadinessProbe`].

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::cancel::{CancelToken, CancellableSleeper, Sleeper};
use crate::config::Config;
use crate::error::{Error, Result};

use super::probe::{ConfiguredProbe, EchoProbe, FtpTransferProbe};
use super::{Endpoint, ProbeFailure, ProbeKind, ReadinessProbe};

/// Default number of probe attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Default pause between probe attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How many times to probe and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    ///
    /// ```
    /// use pasv::readiness::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// assert!(RetryPolicy::new(5, Duration::from_millis(10)).is_ok());
    /// assert!(RetryPolicy::new(0, Duration::from_millis(10)).is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if `max_attempts` is zero.
    pub fn new(max_attempts: u32, delay: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::Validation {
                field: "max_attempts".into(),
                message: "at least one attempt is required".into(),
            });
        }
        Ok(Self {
            max_attempts,
            delay,
        })
    }

    /// Number of attempts before giving up.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Pause between attempts.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

/// What the poller does after one attempt.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The probe succeeded.
    Ready,
    /// The probe failed and the budget allows another attempt.
    Retry(ProbeFailure),
    /// The probe failed on the last allowed attempt.
    GiveUp(ProbeFailure),
}

/// Summary of a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReadyReport {
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Wall-clock time spent waiting.
    pub elapsed: Duration,
}

/// Polls an endpoint until a probe succeeds.
///
/// Attempts are strictly sequential. The poller sleeps only between attempts,
/// never after the final one.
///
/// # Examples
///
/// ```
/// use pasv::readiness::{Endpoint, ProbeFailure, ReadinessPoller, ReadinessProbe, RetryPolicy};
/// use pasv::{CancelToken, Port, RecordingSleeper};
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// struct ThirdTimeLucky(AtomicU32);
///
/// impl ReadinessProbe for ThirdTimeLucky {
///     fn probe(&self, _: &Endpoint) -> Result<(), ProbeFailure> {
///         if self.0.fetch_add(1, Ordering::SeqCst) < 2 {
///             Err(ProbeFailure::Protocol("starting".into()))
///         } else {
///             Ok(())
///         }
///     }
/// }
///
/// let policy = RetryPolicy::new(5, Duration::from_millis(100)).unwrap();
/// let poller = ReadinessPoller::new(ThirdTimeLucky(AtomicU32::new(0)), policy)
///     .with_sleeper(RecordingSleeper::new());
///
/// let endpoint = Endpoint::localhost(Port::try_from(30000).unwrap());
/// let report = poller.wait_until_ready(&endpoint, &CancelToken::new()).unwrap();
/// assert_eq!(report.attempts, 3);
/// ```
#[derive(Debug)]
pub struct ReadinessPoller<P: ReadinessProbe, S: Sleeper = CancellableSleeper> {
    probe: P,
    sleeper: S,
    policy: RetryPolicy,
}

impl<P: ReadinessProbe> ReadinessPoller<P, CancellableSleeper> {
    /// Creates a poller that sleeps on the wall clock.
    pub fn new(probe: P, policy: RetryPolicy) -> Self {
        Self {
            probe,
            sleeper: CancellableSleeper,
            policy,
        }
    }
}

impl<P: ReadinessProbe, S: Sleeper> ReadinessPoller<P, S> {
    /// Replaces the sleeper used between attempts.
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> ReadinessPoller<P, T> {
        ReadinessPoller {
            probe: self.probe,
            sleeper,
            policy: self.policy,
        }
    }

    /// The retry policy.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The probe.
    #[must_use]
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Blocks until a probe against `endpoint` succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadinessTimeout`] after exactly `max_attempts` consecutive
    ///   failures, carrying the last failure
    /// - [`Error::Cancelled`] if `cancel` fires before or between attempts
    pub fn wait_until_ready(&self, endpoint: &Endpoint, cancel: &CancelToken) -> Result<ReadyReport> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            cancel.check()?;
            attempt += 1;

            match self.attempt(endpoint, attempt) {
                ProbeOutcome::Ready => {
                    log::debug!("{endpoint} ready after {attempt} attempt(s)");
                    return Ok(ReadyReport {
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                }
                ProbeOutcome::Retry(failure) => {
                    log::debug!(
                        "{endpoint} not ready (attempt {attempt}/{}): {failure}",
                        self.policy.max_attempts
                    );
                    self.sleeper.sleep(self.policy.delay, cancel)?;
                }
                ProbeOutcome::GiveUp(failure) => {
                    return Err(Error::ReadinessTimeout {
                        endpoint: endpoint.clone(),
                        attempts: attempt,
                        last_failure: failure,
                    });
                }
            }
        }
    }

    /// Runs attempt number `attempt` (1-based) and classifies the result.
    pub fn attempt(&self, endpoint: &Endpoint, attempt: u32) -> ProbeOutcome {
        match self.probe.probe(endpoint) {
            Ok(()) => ProbeOutcome::Ready,
            Err(failure) if attempt >= self.policy.max_attempts => ProbeOutcome::GiveUp(failure),
            Err(failure) => ProbeOutcome::Retry(failure),
        }
    }
}

/// Builds the configured probe and poller.
///
/// # Errors
///
/// Returns an error if the configured retry policy is invalid.
pub fn poller_from_config(config: &Config) -> Result<ReadinessPoller<ConfiguredProbe>> {
    let timeout = config.connect_timeout();
    let probe = match config.probe_kind() {
        ProbeKind::Echo => ConfiguredProbe::Echo(EchoProbe::new().with_timeout(timeout)),
        ProbeKind::Ftp => {
            let (username, password) = config.ftp_credentials();
            ConfiguredProbe::Ftp(FtpTransferProbe::new(username, password).with_timeout(timeout))
        }
    };
    Ok(ReadinessPoller::new(probe, config.retry_policy()?))
}
