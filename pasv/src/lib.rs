#![deny(missing_docs, unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # pasv
//!
//! Consecutive free-port blocks for test fixtures, and a readiness poller
//! that waits until the service on those ports answers.
//!
//! ## Core Types
//!
//! - [`Port`] and [`PortRange`]: Network port types with validation
//! - [`BlockAllocator`] and [`ReservationRegistry`]: Block reservation
//! - [`ReadinessPoller`] and [`ReadinessProbe`]: Bounded readiness checks
//! - [`Fixture`]: Reserve, launch, wait, and tear down in one value
//! - [`Error`] and [`Result`]: Error handling types
//! - [`Logger`] and [`LogLevel`]: Logging infrastructure
//!
//! ## Examples
//!
//! ```
//! use std::collections::HashSet;
//! use std::sync::Arc;
//! use pasv::{BlockAllocator, CancelToken, MockListenerSource, Port, PortRange, ReservationRegistry};
//!
//! let window = PortRange::new(
//!     Port::try_from(40000).unwrap(),
//!     Port::try_from(40009).unwrap(),
//! )
//! .unwrap();
//! let registry = Arc::new(ReservationRegistry::new());
//! let allocator = BlockAllocator::new(MockListenerSource::new(HashSet::new()), registry, window);
//!
//! let block = allocator.reserve(4, &CancelToken::new()).unwrap();
//! assert_eq!(block.to_string(), "40000-40003");
//! assert!(allocator.release(block.start()));
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod fixture;
pub mod logging;
pub mod port;
pub mod readiness;

// Re-export key types at crate root for convenience
pub use cancel::{CancelToken, CancellableSleeper, RecordingSleeper, Sleeper};
pub use config::{Config, ConfigBuilder};
pub use error::{Error, Result};
pub use fixture::{BoxError, Fixture, RunningService, ServiceLauncher};
pub use logging::{init_logger, LogLevel, Logger};
pub use port::allocator::{allocator_from_config, BlockAllocator};
pub use port::lease::PortLease;
pub use port::listeners::{
    ListenerQueryConfig, ListenerSnapshot, ListenerSource, MockListenerSource,
    SystemListenerSource,
};
pub use port::registry::{ClaimOutcome, CollisionReason, ReservationRegistry};
pub use port::{Port, PortRange};
pub use readiness::{
    poller_from_config, ConfiguredProbe, EchoProbe, Endpoint, FtpTransferProbe, ProbeFailure,
    ProbeKind, ReadinessPoller, ReadinessProbe, ReadyReport, RetryPolicy,
};
