//! Degraded-health tracking for sink failures

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts consecutive sink failures; any success clears the count
#[derive(Debug, Default)]
pub struct HealthState {
    consecutive_failures: AtomicU64,
    total_failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl HealthState {
    /// Create a healthy state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sink failure
    pub fn record_failure(&self, error: impl Into<String>) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error.into());
        }
    }

    /// Record a sink success, clearing the degraded state
    pub fn record_success(&self) {
        if self.consecutive_failures.swap(0, Ordering::Relaxed) > 0
            && let Ok(mut last) = self.last_error.lock()
        {
            *last = None;
        }
    }

    /// Whether the latest sink write failed
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures.load(Ordering::Relaxed) > 0
    }

    /// Failures since the last success
    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Failures since startup
    pub fn total_failures(&self) -> u64 {
        self.total_failures.load(Ordering::Relaxed)
    }

    /// Message of the most recent failure while degraded
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|last| last.clone())
    }
}
