//! Simulation Time
//!
//! Discrete tick counter and half-open tick spans.

use std::fmt;
use serde::{Serialize, Deserialize};

/// A discrete simulation tick.
pub type WorldTime = u64;

/// Half-open span of ticks `[start, end)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    /// First tick of the span
    pub start: WorldTime,
    /// Tick at which the span is over
    pub end: WorldTime,
}

impl Span {
    /// Create a span. No ordering is enforced here, see `is_valid`.
    #[inline]
    pub const fn new(start: WorldTime, end: WorldTime) -> Self {
        Self { start, end }
    }

    /// Number of ticks covered.
    #[inline]
    pub fn duration(&self) -> WorldTime {
        self.end.saturating_sub(self.start)
    }

    /// True when `end > start`.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    /// Check whether `t` lies in `[start, end]`.
    #[inline]
    pub fn contains(&self, t: WorldTime) -> bool {
        t >= self.start && t <= self.end
    }

    /// Smallest span covering both spans.
    pub fn union(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    /// Clamp a tick into `[start, end]`.
    #[inline]
    pub fn clamp(&self, t: WorldTime) -> WorldTime {
        t.max(self.start).min(self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Monotonic simulation clock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Clock(pub WorldTime);

impl Clock {
    /// Current tick.
    #[inline]
    pub fn now(self) -> WorldTime {
        self.0
    }

    /// The clock one tick later.
    #[inline]
    pub fn tick(self) -> Clock {
        Clock(self.0 + 1)
    }
}
