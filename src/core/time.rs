//! Wall-clock abstraction for lease expiry.
//!
//! Lease lifetimes are measured in whole seconds since the Unix epoch.
//! Expiry is evaluated on access (reads filter, Compact sweeps); there
//! are no background timers, so the only time dependency in the crate
//! is this one seam. Tests substitute a [`ManualClock`] to step time
//! deterministically.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current wall-clock time in whole seconds.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_seconds(&self) -> i64;
}

/// Clock backed by [`std::time::SystemTime`].
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_seconds(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock reading the given time.
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::Release);
    }

    /// Advance the current time by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_seconds(&self) -> i64 {
        self.now.load(Ordering::Acquire)
    }
}
