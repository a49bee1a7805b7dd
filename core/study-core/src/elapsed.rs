//! Elapsed-time derivation for the session timer.
//!
//! [`derive`] is pure: the same (start, now) always yields the same label.
//! [`ElapsedTicker`] re-samples the clock on each tick while a start time is
//! present and parks without a timer while it is absent. Each tick reads the
//! clock fresh, so timer jitter never accumulates into the displayed value.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::ClockSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Elapsed {
    pub seconds: u64,
    pub label: String,
}

impl Elapsed {
    pub fn zero() -> Self {
        Self {
            seconds: 0,
            label: format_label(0),
        }
    }
}

impl Default for Elapsed {
    fn default() -> Self {
        Self::zero()
    }
}

/// `max(0, floor((now - start) / 1s))`.
pub fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = now.signed_duration_since(start).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis / 1000) as u64
    }
}

/// `"{h}h {m}m {s}s"` from one hour up, `"{m}m {s}s"` below.
pub fn format_label(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{}h {}m {}s", h, m, s)
    } else {
        format!("{}m {}s", m, s)
    }
}

pub fn derive(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Elapsed {
    match start {
        Some(start) => {
            let seconds = elapsed_seconds(start, now);
            Elapsed {
                seconds,
                label: format_label(seconds),
            }
        }
        None => Elapsed::zero(),
    }
}

/// Coarse "how long ago" label used for cached-result badges.
pub fn human_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = elapsed_seconds(then, now);
    if diff < 60 {
        return format!("{}s ago", diff);
    }
    let m = diff / 60;
    if m < 60 {
        return format!("{}m ago", m);
    }
    let h = m / 60;
    if h < 24 {
        return format!("{}h ago", h);
    }
    format!("{}d ago", h / 24)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Ticker
// ═══════════════════════════════════════════════════════════════════════════════

/// Background task publishing an [`Elapsed`] value per tick.
pub struct ElapsedTicker;

impl ElapsedTicker {
    /// Spawns the ticker on the current tokio runtime.
    ///
    /// `start_of` extracts the start timestamp from whatever state the caller
    /// watches (typically the session snapshot). The task exits when either the
    /// watched sender or every output receiver is dropped.
    pub fn spawn<T, F>(
        source: Arc<ClockSource>,
        watched: watch::Receiver<T>,
        start_of: F,
    ) -> (watch::Receiver<Elapsed>, JoinHandle<()>)
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> Option<DateTime<Utc>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(Elapsed::zero());
        let handle = tokio::spawn(run(source, watched, start_of, tx));
        (rx, handle)
    }
}

async fn run<T, F>(
    source: Arc<ClockSource>,
    mut watched: watch::Receiver<T>,
    start_of: F,
    tx: watch::Sender<Elapsed>,
) where
    F: Fn(&T) -> Option<DateTime<Utc>>,
{
    let mut start = start_of(&*watched.borrow_and_update());
    loop {
        let Some(current) = start else {
            if tx.send(Elapsed::zero()).is_err() {
                return;
            }
            if watched.changed().await.is_err() {
                return;
            }
            start = start_of(&*watched.borrow_and_update());
            continue;
        };

        let mut interval = tokio::time::interval(source.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if tx.send(derive(Some(current), source.sample())).is_err() {
                        return;
                    }
                }
                changed = watched.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let next = start_of(&*watched.borrow_and_update());
                    if next != start {
                        start = next;
                        break;
                    }
                }
            }
        }
    }
}
