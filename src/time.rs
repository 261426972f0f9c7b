//! Monotonic millisecond timestamps.
//!
//! Every timer in the firmware is a [`Millis`] read from the
//! [`Clock`](crate::app::ports::Clock) port.  The counter is a `u32` that
//! wraps after ~49.7 days, so elapsed time is always computed with
//! `wrapping_sub` and compared as a duration — never by comparing two raw
//! timestamps.  Durations up to `u32::MAX / 2` ms (~24.8 days) are measured
//! correctly across a wrap.

use serde::{Deserialize, Serialize};

/// A point on the monotonic millisecond clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Millis(pub u32);

impl Millis {
    pub const ZERO: Self = Self(0);

    /// Milliseconds elapsed from `earlier` to `self`, tolerant of wraparound.
    pub const fn since(self, earlier: Millis) -> u32 {
        self.0.wrapping_sub(earlier.0)
    }

    /// True once at least `duration_ms` has passed since `earlier`.
    pub const fn has_elapsed(self, earlier: Millis, duration_ms: u32) -> bool {
        self.since(earlier) >= duration_ms
    }

    /// Timestamp `ms` milliseconds after `self` (wrapping).
    #[must_use]
    pub const fn add_ms(self, ms: u32) -> Self {
        Self(self.0.wrapping_add(ms))
    }

    /// Seconds as a float, for log output only.
    pub fn as_secs_f32(self) -> f32 {
        self.0 as f32 / 1000.0
    }
}

/// Convert a whole-second config value to milliseconds, saturating.
pub const fn secs_to_ms(secs: u32) -> u32 {
    secs.saturating_mul(1000)
}
