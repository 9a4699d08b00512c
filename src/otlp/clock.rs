//! Time source used for record timestamps and file names

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Source of the current UTC time
pub trait Clock: Send + Sync + Debug {
    /// Current instant in UTC
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
