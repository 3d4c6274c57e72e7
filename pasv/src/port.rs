//! Port and port range types.
//!
//! [`PortRange`] is used both for the allocation window and for the blocks
//! handed out by the allocator. The submodules hold the allocation machinery.

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod allocator;
pub mod lease;
pub mod listeners;
pub mod registry;

#[cfg(test)]
mod allocator_proptests;

/// A valid network port number (1-65535).
///
/// Port 0 is rejected because binding to it asks the OS for an ephemeral port,
/// which makes no sense inside a reserved block.
///
/// # Examples
///
/// ```
/// use pasv::Port;
///
/// let port = Port::try_from(30000).unwrap();
/// assert_eq!(port.value(), 30000);
/// assert!(Port::try_from(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Port(u16);

impl Port {
    /// The minimum valid port number.
    pub const MIN: u16 = 1;

    /// The maximum valid port number.
    pub const MAX: u16 = 65535;

    /// Returns the underlying port number.
    #[must_use]
    pub const fn value(self) -> u16 {
        self.0
    }

    /// Returns the port `offset` positions above this one, if it is still valid.
    ///
    /// ```
    /// use pasv::Port;
    ///
    /// let port = Port::try_from(65534).unwrap();
    /// assert_eq!(port.checked_add(1).map(Port::value), Some(65535));
    /// assert!(port.checked_add(2).is_none());
    /// ```
    #[must_use]
    pub fn checked_add(self, offset: u16) -> Option<Self> {
        self.0.checked_add(offset).map(Self)
    }
}

impl TryFrom<u16> for Port {
    type Error = InvalidPortError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value == 0 {
            Err(InvalidPortError {
                value,
                reason: "port 0 is invalid".into(),
            })
        } else {
            Ok(Self(value))
        }
    }
}

impl From<Port> for u16 {
    fn from(port: Port) -> Self {
        port.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for invalid port numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPortError {
    /// The invalid port value.
    pub value: u16,
    /// The reason the port is invalid.
    pub reason: String,
}

impl fmt::Display for InvalidPortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid port {}: {}", self.value, self.reason)
    }
}

impl std::error::Error for InvalidPortError {}

/// A closed, contiguous interval of ports.
///
/// # Examples
///
/// ```
/// use pasv::{Port, PortRange};
///
/// let start = Port::try_from(30000).unwrap();
/// let end = Port::try_from(30004).unwrap();
/// let window = PortRange::new(start, end).unwrap();
///
/// assert_eq!(window.len(), 5);
/// assert!(window.contains(Port::try_from(30002).unwrap()));
/// assert_eq!(window.to_string(), "30000-30004");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PortRange {
    start: Port,
    end: Port,
}

impl PortRange {
    /// Creates a range covering `start..=end`.
    ///
    /// # Errors
    ///
    /// Returns an error if `end` is less than `start`.
    pub fn new(start: Port, end: Port) -> Result<Self, InvalidPortRangeError> {
        if end < start {
            Err(InvalidPortRangeError {
                start,
                end,
                reason: "end must be greater than or equal to start".into(),
            })
        } else {
            Ok(Self { start, end })
        }
    }

    /// Creates the block of `count` consecutive ports beginning at `start`.
    ///
    /// Returns `None` when `count` is zero or the block would run past 65535.
    ///
    /// ```
    /// use pasv::{Port, PortRange};
    ///
    /// let block = PortRange::from_start(Port::try_from(30010).unwrap(), 3).unwrap();
    /// assert_eq!(block.end().value(), 30012);
    /// assert!(PortRange::from_start(Port::try_from(65535).unwrap(), 2).is_none());
    /// ```
    #[must_use]
    pub fn from_start(start: Port, count: u16) -> Option<Self> {
        if count == 0 {
            return None;
        }
        let end = start.checked_add(count - 1)?;
        Some(Self { start, end })
    }

    /// Returns the first port in the range.
    #[must_use]
    pub const fn start(&self) -> Port {
        self.start
    }

    /// Returns the last port in the range.
    #[must_use]
    pub const fn end(&self) -> Port {
        self.end
    }

    /// Returns `true` if the range contains the given port.
    #[must_use]
    pub const fn contains(&self, port: Port) -> bool {
        port.value() >= self.start.value() && port.value() <= self.end.value()
    }

    /// Returns `true` if every port of `other` lies inside this range.
    #[must_use]
    pub const fn encloses(&self, other: &PortRange) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }

    /// Returns `true` if the two ranges share at least one port.
    #[must_use]
    pub const fn overlaps(&self, other: &PortRange) -> bool {
        self.start.value() <= other.end.value() && other.start.value() <= self.end.value()
    }

    /// Returns the number of ports in the range.
    ///
    /// This is a `u32` because the full range 1-65535 has 65535 ports, and a
    /// window count is routinely compared against block sizes.
    #[must_use]
    pub const fn len(&self) -> u32 {
        (self.end.value() - self.start.value()) as u32 + 1
    }

    /// Always `false`; a valid range holds at least one port.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Returns the last port at which a block of `count` ports can still
    /// start without leaving the range, or `None` if it cannot fit at all.
    ///
    /// ```
    /// use pasv::{Port, PortRange};
    ///
    /// let window = PortRange::new(Port::try_from(30000).unwrap(), Port::try_from(30004).unwrap()).unwrap();
    /// assert_eq!(window.last_block_start(5).map(Port::value), Some(30000));
    /// assert_eq!(window.last_block_start(2).map(Port::value), Some(30003));
    /// assert!(window.last_block_start(6).is_none());
    /// ```
    #[must_use]
    pub fn last_block_start(&self, count: u16) -> Option<Port> {
        if count == 0 || u32::from(count) > self.len() {
            return None;
        }
        Some(Port(self.end.value() - (count - 1)))
    }

    /// Returns an iterator over all ports in this range, ascending.
    #[must_use]
    pub fn iter(self) -> PortRangeIter {
        PortRangeIter {
            next: Some(self.start.value()),
            end: self.end.value(),
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl IntoIterator for PortRange {
    type Item = Port;
    type IntoIter = PortRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over ports in a [`PortRange`].
#[derive(Debug)]
pub struct PortRangeIter {
    next: Option<u16>,
    end: u16,
}

impl Iterator for PortRangeIter {
    type Item = Port;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        // Ranges may end at 65535, so the successor is tracked as an Option.
        self.next = if current < self.end {
            Some(current + 1)
        } else {
            None
        };
        Some(Port(current))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .next
            .map_or(0, |current| usize::from(self.end - current) + 1);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PortRangeIter {}

/// Error type for invalid port ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPortRangeError {
    /// The first port of the rejected range.
    pub start: Port,
    /// The last port of the rejected range.
    pub end: Port,
    /// The reason the range is invalid.
    pub reason: String,
}

impl fmt::Display for InvalidPortRangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid port range {}-{}: {}",
            self.start, self.end, self.reason
        )
    }
}

impl std::error::Error for InvalidPortRangeError {}
