// ============================================================================
// Simulated Time
// ============================================================================

use std::fmt;
use std::ops::Add;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Point in simulated time, in integer ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Self = Self(0);
    pub const MAX: Self = Self(i64::MAX);

    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Timestamp `delay` ticks later, saturating at `MAX`.
    pub fn plus(self, delay: i64) -> Self {
        Self(self.0.saturating_add(delay))
    }
}

impl Add<i64> for Timestamp {
    type Output = Self;

    fn add(self, rhs: i64) -> Self::Output {
        self.plus(rhs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Target time for a scheduled activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    /// Collapses to the clock's current time at scheduling
    Immediate,
    At(Timestamp),
}

impl When {
    /// `Immediate` for a zero delay, `At(now + delay)` otherwise.
    pub fn after(now: Timestamp, delay: i64) -> Self {
        if delay == 0 {
            When::Immediate
        } else {
            When::At(now.plus(delay))
        }
    }

    pub fn resolve(self, now: Timestamp) -> Timestamp {
        match self {
            When::Immediate => now,
            When::At(ts) => ts,
        }
    }
}

impl From<Timestamp> for When {
    fn from(ts: Timestamp) -> Self {
        When::At(ts)
    }
}
