//! Discrete simulation ticks shared by client and server.
//!
//! Ticks wrap at `u32::MAX`, so ordering always goes through
//! [`Tick::is_newer_than`] rather than raw integer comparison.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A fixed-size simulation step index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Tick(pub u32);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub fn next(self) -> Tick {
        Tick(self.0.wrapping_add(1))
    }

    pub fn offset(self, ticks: u32) -> Tick {
        Tick(self.0.wrapping_add(ticks))
    }

    pub fn back(self, ticks: u32) -> Tick {
        Tick(self.0.wrapping_sub(ticks))
    }

    /// Returns true if `self` is strictly after `other` on the wrapping timeline.
    pub fn is_newer_than(self, other: Tick) -> bool {
        (self.0.wrapping_sub(other.0) as i32) > 0
    }

    /// Returns true if `self` is `other` or comes after it.
    pub fn is_at_or_after(self, other: Tick) -> bool {
        self == other || self.is_newer_than(other)
    }

    /// Signed number of ticks from `other` to `self`.
    pub fn ticks_since(self, other: Tick) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic tick counter with a fixed delta time.
///
/// The server owns one of these and advances it once per simulation step;
/// every phase reads the same tick and delta time for the whole step.
#[derive(Debug, Clone)]
pub struct TickClock {
    tick: Tick,
    delta_time: f32,
}

impl TickClock {
    /// Creates a clock stepping at `tick_rate` Hz, starting at tick 0.
    pub fn new(tick_rate: u32) -> Self {
        Self::with_delta_time(1.0 / tick_rate.max(1) as f32)
    }

    pub fn with_delta_time(delta_time: f32) -> Self {
        Self {
            tick: Tick::ZERO,
            delta_time,
        }
    }

    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f32(self.delta_time)
    }

    /// Moves to the next tick and returns it.
    pub fn advance(&mut self) -> Tick {
        self.tick = self.tick.next();
        self.tick
    }

    pub fn set(&mut self, tick: Tick) {
        self.tick = tick;
    }
}
