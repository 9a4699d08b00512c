//! Record filters
//!
//! A sink registered with several filters only receives a record when every
//! filter accepts it.

use std::fmt::Debug;
use std::sync::Arc;

use crate::otlp::{Signal, TelemetryRecord};

/// Predicate deciding whether a sink should receive a record
pub trait TelemetryFilter: Send + Sync + Debug {
    /// `true` to let the record through
    fn should_write(&self, record: &TelemetryRecord) -> bool;
}

/// Accepts every record; used when a sink is registered without filters
#[derive(Debug, Clone, Copy, Default)]
pub struct AllSignalsFilter;

impl TelemetryFilter for AllSignalsFilter {
    fn should_write(&self, _record: &TelemetryRecord) -> bool {
        true
    }
}

/// Accepts only records flagged as errors
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorsOnlyFilter;

impl TelemetryFilter for ErrorsOnlyFilter {
    fn should_write(&self, record: &TelemetryRecord) -> bool {
        record.is_error()
    }
}

/// Accepts only records of one signal
#[derive(Debug, Clone, Copy)]
pub struct SignalFilter {
    signal: Signal,
}

impl SignalFilter {
    /// Create a filter that lets only `signal` through
    pub fn new(signal: Signal) -> Self {
        Self { signal }
    }
}

impl TelemetryFilter for SignalFilter {
    fn should_write(&self, record: &TelemetryRecord) -> bool {
        record.signal() == self.signal
    }
}

/// AND-composition over a filter set; an empty set accepts everything
pub(crate) fn all_pass(filters: &[Arc<dyn TelemetryFilter>], record: &TelemetryRecord) -> bool {
    filters.iter().all(|filter| filter.should_write(record))
}
