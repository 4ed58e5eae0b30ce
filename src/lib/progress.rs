//! Progress tracking for long record loops.
//!
//! Readers in fuse, cleric and juliet feed every consumed record through a
//! [`ProgressTracker`], which logs a line each time the count crosses an interval boundary.

use log::info;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe progress tracker.
///
/// # Example
/// ```
/// use minorseq_lib::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new("Read records").with_interval(100);
/// for _ in 0..250 {
///     tracker.log_if_needed(1); // logs at 100 and 200
/// }
/// tracker.log_final(); // logs "Read records 250 (complete)"
/// assert_eq!(tracker.count(), 250);
/// ```
pub struct ProgressTracker {
    interval: u64,
    message: String,
    count: AtomicU64,
}

impl ProgressTracker {
    /// Creates a tracker with a default interval of 10,000.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self { interval: 10_000, message: message.into(), count: AtomicU64::new(0) }
    }

    /// Sets the logging interval. Zero is treated as one.
    #[must_use]
    pub fn with_interval(mut self, interval: u64) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Adds `additional` to the count and logs once per interval boundary crossed.
    ///
    /// Returns `true` if the resulting count sits exactly on an interval boundary.
    pub fn log_if_needed(&self, additional: u64) -> bool {
        if additional == 0 {
            let count = self.count.load(Ordering::Relaxed);
            return count > 0 && count % self.interval == 0;
        }

        let prev = self.count.fetch_add(additional, Ordering::Relaxed);
        let new_count = prev + additional;
        for i in (prev / self.interval + 1)..=(new_count / self.interval) {
            info!("{} {}", self.message, i * self.interval);
        }
        new_count % self.interval == 0
    }

    /// Logs the final count unless the last boundary already reported it.
    pub fn log_final(&self) {
        if !self.log_if_needed(0) {
            let count = self.count.load(Ordering::Relaxed);
            if count > 0 {
                info!("{} {} (complete)", self.message, count);
            }
        }
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}
