//! Monotonic time sources.
//!
//! All scheduler timing is expressed in seconds as `f64` read from a
//! [`Clock`]. Wall-clock time is never used, so nothing absolute is ever
//! persisted and adjusting the system clock cannot disturb running timers.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// A non-decreasing source of seconds.
pub trait Clock: Send + Sync {
    /// Current time in seconds.
    fn now(&self) -> f64;
}

/// Clock shared between a scheduler, its loop thread and its callers.
pub type SharedClock = Arc<dyn Clock>;

/// Process-local monotonic clock anchored at construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Creates a clock reading zero now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Creates a shared handle to a fresh monotonic clock.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to.
///
/// Used by tests and deterministic simulations. `set` refuses to move
/// backwards so the clock stays monotonic.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Creates a manual clock at `start` seconds.
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock to `seconds` if that is not in the past.
    pub fn set(&self, seconds: f64) {
        let mut now = self.now.lock();
        if seconds > *now {
            *now = seconds;
        }
    }

    /// Advances the clock by `delta` seconds (negative deltas are ignored).
    pub fn advance(&self, delta: f64) {
        if delta > 0.0 {
            *self.now.lock() += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}
