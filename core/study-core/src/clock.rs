//! Wall-clock sampling.
//!
//! Every consumer reads "now" through [`Clock`] so tests can pin time with
//! `ManualClock` (behind the `test-helpers` feature). [`ClockSource`] adds the
//! tick interval and clamps samples so a wall-clock step backwards never makes
//! elapsed time shrink.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|_| Utc::now())
    }
}

/// Samples a [`Clock`] on a fixed interval, never returning an earlier instant
/// than a previous sample.
pub struct ClockSource {
    clock: Arc<dyn Clock>,
    interval: Duration,
    last: Mutex<Option<DateTime<Utc>>>,
}

impl ClockSource {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock), DEFAULT_TICK_INTERVAL)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Reads the clock fresh and returns `max(previous sample, now)`.
    pub fn sample(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        match self.last.lock() {
            Ok(mut last) => {
                let sampled = match *last {
                    Some(previous) if previous > now => previous,
                    _ => now,
                };
                *last = Some(sampled);
                sampled
            }
            Err(_) => now,
        }
    }
}

impl std::fmt::Debug for ClockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockSource")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
