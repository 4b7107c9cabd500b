//! Time source abstraction.
//!
//! Freshness, staleness, and age are all comparisons against "now". The engine
//! takes its notion of now from a [`Clock`] so that expiry behavior is
//! deterministic under test; production use wants [`SystemClock`].

use std::time::SystemTime;

/// A process-wide source of wall-clock time.
pub trait Clock: Send + Sync {
    /// The current time according to this clock.
    fn now(&self) -> SystemTime;
}

/// A [`Clock`] that reads the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
