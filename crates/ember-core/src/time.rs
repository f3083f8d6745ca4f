//! Simulation time

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Simulation time in whole milliseconds since the last system reset.
///
/// Stored as `i64`, so it does not wrap for roughly 292 million years.
/// Conversion to seconds goes through `f64`, which is exact for every
/// millisecond value below 2^53.
#[derive(
    Clone, Copy, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(pub i64);

impl SimTime {
    pub const ZERO: Self = Self(0);

    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Round a time in seconds to the nearest millisecond (half away from zero)
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(rounded_millis(secs))
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

/// Round seconds to whole milliseconds, the key space of expiry bookkeeping
pub fn rounded_millis(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

impl Add<i64> for SimTime {
    type Output = Self;
    fn add(self, ms: i64) -> Self {
        Self(self.0 + ms)
    }
}

impl Sub for SimTime {
    type Output = i64;
    fn sub(self, other: Self) -> i64 {
        self.0 - other.0
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}
