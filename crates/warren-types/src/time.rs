//! Microsecond time arithmetic.
//!
//! Record expirations and session deadlines are 64-bit microsecond counts.
//! `u64::MAX` is the "never" sentinel; all arithmetic saturates there so a
//! never-expiring record stays never-expiring through relative→absolute
//! conversion.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// An absolute point in time, microseconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbsoluteTime(pub u64);

/// A relative time span in microseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelativeTime(pub u64);

impl AbsoluteTime {
    /// The beginning of time.
    pub const ZERO: Self = Self(0);

    /// The "never" sentinel: compares greater than every real time.
    pub const NEVER: Self = Self(u64::MAX);

    /// Current wall-clock time.
    ///
    /// A clock before the Unix epoch collapses to [`AbsoluteTime::ZERO`].
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(micros)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// Add a relative span, saturating at [`AbsoluteTime::NEVER`].
    pub fn saturating_add(self, rel: RelativeTime) -> Self {
        Self(self.0.saturating_add(rel.0))
    }

    /// Span from `earlier` to `self`; zero if `earlier` is in the future.
    pub fn saturating_duration_since(self, earlier: Self) -> RelativeTime {
        RelativeTime(self.0.saturating_sub(earlier.0))
    }

    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    pub fn max(self, other: Self) -> Self {
        Self(self.0.max(other.0))
    }
}

impl RelativeTime {
    pub const ZERO: Self = Self(0);

    /// The "forever" span.
    pub const FOREVER: Self = Self(u64::MAX);

    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    pub const fn from_minutes(minutes: u64) -> Self {
        Self::from_secs(minutes * 60)
    }

    pub const fn from_hours(hours: u64) -> Self {
        Self::from_secs(hours * 3600)
    }

    pub fn as_micros(self) -> u64 {
        self.0
    }

    /// Convert to a `std::time::Duration` for timer arming.
    pub fn to_duration(self) -> Duration {
        Duration::from_micros(self.0)
    }
}
