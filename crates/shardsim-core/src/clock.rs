//! Virtual clock for discrete-event simulation.
//!
//! The [`SimClock`] tracks simulation time independently of wall-clock time,
//! advancing only when events are processed. Time is held as integer
//! microseconds so event ordering never depends on float rounding.

use serde::{Deserialize, Serialize};

/// Convert simulated seconds to whole microseconds (rounded to nearest).
pub fn secs_to_us(secs: f64) -> u64 {
    (secs * 1_000_000.0).round().max(0.0) as u64
}

/// Convert simulated milliseconds to whole microseconds (rounded to nearest).
pub fn ms_to_us(ms: f64) -> u64 {
    (ms * 1_000.0).round().max(0.0) as u64
}

/// Virtual simulation clock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimClock {
    /// Current simulation time in microseconds.
    current_us: u64,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    pub fn new() -> Self {
        Self { current_us: 0 }
    }

    /// Current time in microseconds.
    pub fn now_us(&self) -> u64 {
        self.current_us
    }

    /// Current time in milliseconds.
    pub fn now_ms(&self) -> f64 {
        self.current_us as f64 / 1_000.0
    }

    /// Current time in seconds.
    pub fn now_secs(&self) -> f64 {
        self.current_us as f64 / 1_000_000.0
    }

    /// Advance the clock to a specific time in microseconds.
    ///
    /// # Panics
    ///
    /// Panics in debug mode if `us` is in the past.
    pub fn advance_to_us(&mut self, us: u64) {
        debug_assert!(
            us >= self.current_us,
            "Cannot move clock backwards: current={}us, target={}us",
            self.current_us,
            us,
        );
        self.current_us = us;
    }
}
