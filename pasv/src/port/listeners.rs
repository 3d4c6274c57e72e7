//! Live listener snapshots of the host's port state.
//!
//! The allocator never trusts its own registry alone: a port may be bound by
//! an unrelated process at any time. [`ListenerSource`] abstracts the OS query
//! so the allocator can be driven by a deterministic source in tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::OccupancyConfig;
use crate::{Port, PortRange, Result};

/// Options for a listener query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerQueryConfig {
    /// Treat every port as unbound. Useful on hosts where bind probing is
    /// not permitted.
    pub skip: bool,
    /// Also count ports with a UDP socket bound as in use.
    pub include_udp: bool,
}

impl From<&OccupancyConfig> for ListenerQueryConfig {
    fn from(config: &OccupancyConfig) -> Self {
        Self {
            skip: config.skip.unwrap_or(false),
            include_udp: config.include_udp.unwrap_or(false),
        }
    }
}

/// A point-in-time set of ports found bound on the host.
///
/// Snapshots are never mutated after capture. A stale snapshot is replaced,
/// not updated.
#[derive(Debug, Clone)]
pub struct ListenerSnapshot {
    bound: HashSet<Port>,
    taken_at: Instant,
}

impl ListenerSnapshot {
    /// Wraps a set of bound ports captured now.
    #[must_use]
    pub fn new(bound: HashSet<Port>) -> Self {
        Self {
            bound,
            taken_at: Instant::now(),
        }
    }

    /// A snapshot with nothing bound.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(HashSet::new())
    }

    /// Returns `true` if the port had a listener when the snapshot was taken.
    #[must_use]
    pub fn is_bound(&self, port: Port) -> bool {
        self.bound.contains(&port)
    }

    /// Returns the bound ports, in no particular order.
    #[must_use]
    pub fn bound_ports(&self) -> &HashSet<Port> {
        &self.bound
    }

    /// Returns the bound ports inside `range`, ascending.
    #[must_use]
    pub fn bound_in(&self, range: &PortRange) -> Vec<Port> {
        let mut ports: Vec<Port> = self
            .bound
            .iter()
            .copied()
            .filter(|port| range.contains(*port))
            .collect();
        ports.sort_unstable();
        ports
    }

    /// When the snapshot was captured.
    #[must_use]
    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    /// Returns the maximal runs of unbound ports inside `window`, ascending.
    ///
    /// ```
    /// use pasv::port::listeners::ListenerSnapshot;
    /// use pasv::{Port, PortRange};
    /// use std::collections::HashSet;
    ///
    /// let bound: HashSet<Port> = [30002].into_iter().map(|p| Port::try_from(p).unwrap()).collect();
    /// let window = PortRange::new(Port::try_from(30000).unwrap(), Port::try_from(30004).unwrap()).unwrap();
    ///
    /// let runs = ListenerSnapshot::new(bound).free_runs(&window);
    /// let runs: Vec<String> = runs.iter().map(ToString::to_string).collect();
    /// assert_eq!(runs, vec!["30000-30001", "30003-30004"]);
    /// ```
    #[must_use]
    pub fn free_runs(&self, window: &PortRange) -> Vec<PortRange> {
        let mut runs = Vec::new();
        let mut run_start: Option<Port> = None;
        let mut previous: Option<Port> = None;

        for port in *window {
            if self.is_bound(port) {
                if let (Some(start), Some(end)) = (run_start.take(), previous) {
                    runs.extend(PortRange::new(start, end).ok());
                }
            } else if run_start.is_none() {
                run_start = Some(port);
            }
            previous = Some(port);
        }
        if let Some(start) = run_start {
            runs.extend(PortRange::new(start, window.end()).ok());
        }
        runs
    }
}

/// Source of live listener state.
///
/// # Examples
///
/// ```
/// use pasv::port::listeners::{ListenerQueryConfig, ListenerSource, MockListenerSource};
/// use pasv::{Port, PortRange};
///
/// let source = MockListenerSource::empty();
/// source.mark_bound(Port::try_from(30001).unwrap());
///
/// let window = PortRange::new(Port::try_from(30000).unwrap(), Port::try_from(30004).unwrap()).unwrap();
/// let snapshot = source.snapshot(&window, &ListenerQueryConfig::default()).unwrap();
/// assert!(snapshot.is_bound(Port::try_from(30001).unwrap()));
/// ```
pub trait ListenerSource: Send + Sync {
    /// Returns `Ok(true)` if something is bound to `port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS query itself fails.
    fn is_bound(&self, port: Port, config: &ListenerQueryConfig) -> Result<bool>;

    /// Captures the bound ports inside `range`.
    ///
    /// The default implementation probes each port. A port whose probe fails
    /// is recorded as bound so that a broken query can never hand out a port
    /// that might be in use.
    ///
    /// # Errors
    ///
    /// Implementations may return an error if the query cannot run at all.
    fn snapshot(&self, range: &PortRange, config: &ListenerQueryConfig) -> Result<ListenerSnapshot> {
        let mut bound = HashSet::new();
        if config.skip {
            return Ok(ListenerSnapshot::new(bound));
        }
        for port in *range {
            match self.is_bound(port, config) {
                Ok(false) => {}
                Ok(true) => {
                    bound.insert(port);
                }
                Err(err) => {
                    log::debug!("listener query for {port} failed, treating as bound: {err}");
                    bound.insert(port);
                }
            }
        }
        Ok(ListenerSnapshot::new(bound))
    }
}

/// Production listener source.
///
/// A port counts as bound when a TCP bind on it fails, which is how the
/// `port-selector` crate tests availability.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemListenerSource;

impl ListenerSource for SystemListenerSource {
    fn is_bound(&self, port: Port, config: &ListenerQueryConfig) -> Result<bool> {
        if config.skip {
            return Ok(false);
        }
        let free = if config.include_udp {
            port_selector::is_free(port.value())
        } else {
            port_selector::is_free_tcp(port.value())
        };
        Ok(!free)
    }
}

/// Listener source backed by an explicit set of ports.
///
/// Interior mutability lets a test bind or free ports while an allocator
/// holds the source. Every snapshot is counted so tests can observe cache
/// refreshes.
#[derive(Debug, Default)]
pub struct MockListenerSource {
    bound: Mutex<HashSet<Port>>,
    snapshots: AtomicUsize,
}

impl MockListenerSource {
    /// Creates a source with the given ports bound.
    #[must_use]
    pub fn new(bound: HashSet<Port>) -> Self {
        Self {
            bound: Mutex::new(bound),
            snapshots: AtomicUsize::new(0),
        }
    }

    /// Creates a source with nothing bound.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Marks a port as bound.
    pub fn mark_bound(&self, port: Port) {
        self.lock().insert(port);
    }

    /// Marks a port as free.
    pub fn mark_free(&self, port: Port) {
        self.lock().remove(&port);
    }

    /// Number of snapshots taken so far.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.snapshots.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<Port>> {
        self.bound.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ListenerSource for MockListenerSource {
    fn is_bound(&self, port: Port, config: &ListenerQueryConfig) -> Result<bool> {
        Ok(!config.skip && self.lock().contains(&port))
    }

    fn snapshot(&self, range: &PortRange, config: &ListenerQueryConfig) -> Result<ListenerSnapshot> {
        self.snapshots.fetch_add(1, Ordering::SeqCst);
        if config.skip {
            return Ok(ListenerSnapshot::empty());
        }
        let bound = self
            .lock()
            .iter()
            .copied()
            .filter(|port| range.contains(*port))
            .collect();
        Ok(ListenerSnapshot::new(bound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn port(value: u16) -> Port {
        Port::try_from(value).unwrap()
    }

    fn range(start: u16, end: u16) -> PortRange {
        PortRange::new(port(start), port(end)).unwrap()
    }

    struct FailingSource;

    impl ListenerSource for FailingSource {
        fn is_bound(&self, port: Port, _config: &ListenerQueryConfig) -> Result<bool> {
            if port.value() % 2 == 0 {
                Err(Error::ListenerQueryFailed {
                    port,
                    source: "permission denied".into(),
                })
            } else {
                Ok(false)
            }
        }
    }

    #[test]
    fn test_query_config_from_occupancy_config() {
        let occupancy = OccupancyConfig {
            skip: Some(true),
            include_udp: None,
        };
        let config = ListenerQueryConfig::from(&occupancy);
        assert!(config.skip);
        assert!(!config.include_udp);
    }

    #[test]
    fn test_mock_snapshot_only_reports_ports_in_range() {
        let source = MockListenerSource::new([port(29999), port(30001)].into_iter().collect());
        let snapshot = source
            .snapshot(&range(30000, 30004), &ListenerQueryConfig::default())
            .unwrap();

        assert!(snapshot.is_bound(port(30001)));
        assert!(!snapshot.is_bound(port(29999)));
        assert_eq!(snapshot.bound_in(&range(30000, 30004)), vec![port(30001)]);
        assert_eq!(source.snapshot_count(), 1);
    }

    #[test]
    fn test_mock_mark_bound_and_free() {
        let source = MockListenerSource::empty();
        let config = ListenerQueryConfig::default();

        source.mark_bound(port(30000));
        assert!(source.is_bound(port(30000), &config).unwrap());

        source.mark_free(port(30000));
        assert!(!source.is_bound(port(30000), &config).unwrap());

        // Freeing an unbound port is harmless.
        source.mark_free(port(30001));
    }

    #[test]
    fn test_skip_reports_nothing_bound() {
        let source = MockListenerSource::new([port(30000)].into_iter().collect());
        let config = ListenerQueryConfig {
            skip: true,
            include_udp: false,
        };
        let snapshot = source.snapshot(&range(30000, 30001), &config).unwrap();
        assert!(snapshot.bound_ports().is_empty());
    }

    #[test]
    fn test_default_snapshot_fails_closed() {
        let snapshot = FailingSource
            .snapshot(&range(30000, 30003), &ListenerQueryConfig::default())
            .unwrap();
        assert_eq!(
            snapshot.bound_in(&range(30000, 30003)),
            vec![port(30000), port(30002)]
        );
    }

    #[test]
    fn test_free_runs_with_edges_bound() {
        let bound = [30000, 30003, 30004, 30009]
            .into_iter()
            .map(port)
            .collect();
        let runs = ListenerSnapshot::new(bound).free_runs(&range(30000, 30009));
        assert_eq!(runs, vec![range(30001, 30002), range(30005, 30008)]);
    }

    #[test]
    fn test_free_runs_all_free_and_all_bound() {
        let window = range(30000, 30004);
        assert_eq!(ListenerSnapshot::empty().free_runs(&window), vec![window]);

        let all: HashSet<Port> = window.iter().collect();
        assert!(ListenerSnapshot::new(all).free_runs(&window).is_empty());
    }

    #[test]
    fn test_system_source_sees_real_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let bound = port(listener.local_addr().unwrap().port());

        let result = SystemListenerSource
            .is_bound(bound, &ListenerQueryConfig::default())
            .unwrap();
        assert!(result);
    }

    #[test]
    fn test_system_source_skip() {
        let config = ListenerQueryConfig {
            skip: true,
            include_udp: true,
        };
        assert!(!SystemListenerSource.is_bound(port(30000), &config).unwrap());
    }
}
