//! Time stamps for sensor data.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Nanosecond-precision acquisition time.
///
/// Stamps are copied from the inbound frame onto every observation set
/// produced from it, so consumers can age out stale observations.
///
/// # Example
///
/// ```
/// use sensor_types::Timestamp;
///
/// let ts = Timestamp::from_secs_nanos(12, 500_000_000);
/// assert!((ts.as_secs_f64() - 12.5).abs() < 1e-9);
/// assert_eq!(ts, Timestamp::from_nanos(12_500_000_000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timestamp {
    /// Nanoseconds since epoch (or driver start).
    nanos: u64,
}

impl Timestamp {
    /// Creates a timestamp from nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self { nanos }
    }

    /// Creates a timestamp from the split `sec` / `nsec` form used by
    /// message headers. Saturates at `u64::MAX` nanoseconds.
    #[must_use]
    pub const fn from_secs_nanos(secs: u64, nanos: u32) -> Self {
        Self {
            nanos: secs
                .saturating_mul(1_000_000_000)
                .saturating_add(nanos as u64),
        }
    }

    /// Creates a timestamp from seconds (floating point). Negative input clamps to zero.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    pub fn from_secs_f64(secs: f64) -> Self {
        Self {
            nanos: (secs * 1e9).max(0.0) as u64,
        }
    }

    /// Returns the timestamp as nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> u64 {
        self.nanos
    }

    /// Returns the timestamp as seconds (floating point).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(self) -> f64 {
        self.nanos as f64 / 1e9
    }

    /// Returns the zero timestamp.
    #[must_use]
    pub const fn zero() -> Self {
        Self { nanos: 0 }
    }

    /// Checks if this is the zero timestamp (stamp never set).
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.nanos == 0
    }
}
