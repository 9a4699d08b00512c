//! Fan-out pipeline for decoded OTLP requests
//!
//! Every request is serialized once, classified once and turned into an
//! immutable [`TelemetryRecord`], then offered to each registered sink whose
//! filters all accept it. A failing sink is logged and skipped; it never
//! prevents delivery to the others.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{OtlpPipelineError, OtlpSinkError};
use crate::otlp::filter::all_pass;
use crate::otlp::{
    AllSignalsFilter, Clock, HealthState, JsonSerializer, Signal, SystemClock, TelemetryFilter,
    TelemetryMessage, TelemetryRecord, TelemetrySink, classifier,
};

#[derive(Debug, Clone)]
struct RegisteredSink {
    sink: Arc<dyn TelemetrySink>,
    filters: Arc<[Arc<dyn TelemetryFilter>]>,
}

/// Outcome of one pipeline write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Sinks that accepted the record
    pub delivered: usize,
    /// Durable sinks that accepted the record
    pub persisted: usize,
    /// Sinks whose write failed
    pub failed: usize,
    /// Sinks whose filters rejected the record
    pub skipped: usize,
    /// Sinks abandoned while waiting for their lock
    pub cancelled: usize,
    /// Error classification of the record
    pub is_error: bool,
}

impl WriteReport {
    /// Whether a sink failed and no durable sink stored the record
    pub fn all_failed(&self) -> bool {
        self.failed > 0 && self.persisted == 0
    }

    /// Whether cancellation left the record unpersisted
    pub fn interrupted(&self) -> bool {
        self.cancelled > 0 && self.persisted == 0
    }
}

/// Orchestrates serialization, classification and fan-out
#[derive(Debug)]
pub struct Pipeline {
    sinks: RwLock<Vec<RegisteredSink>>,
    serializer: JsonSerializer,
    clock: Arc<dyn Clock>,
    health: Arc<HealthState>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(JsonSerializer::default())
    }
}

impl Pipeline {
    /// Create a pipeline with no sinks
    pub fn new(serializer: JsonSerializer) -> Self {
        Self {
            sinks: RwLock::new(Vec::new()),
            serializer,
            clock: Arc::new(SystemClock),
            health: Arc::new(HealthState::new()),
        }
    }

    /// Replace the time source used for record timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share an externally owned health tracker
    pub fn with_health(mut self, health: Arc<HealthState>) -> Self {
        self.health = health;
        self
    }

    /// Health tracker updated on every sink outcome
    pub fn health(&self) -> Arc<HealthState> {
        self.health.clone()
    }

    /// Register a sink; with no filters it receives every record
    pub fn register(&self, sink: Arc<dyn TelemetrySink>, filters: Vec<Arc<dyn TelemetryFilter>>) {
        let filters: Vec<Arc<dyn TelemetryFilter>> = if filters.is_empty() {
            vec![Arc::new(AllSignalsFilter)]
        } else {
            filters
        };

        debug!(sink = sink.name(), filters = filters.len(), "Registering sink");

        let registered = RegisteredSink {
            sink,
            filters: filters.into(),
        };

        match self.sinks.write() {
            Ok(mut sinks) => sinks.push(registered),
            Err(poisoned) => poisoned.into_inner().push(registered),
        }
    }

    /// Number of registered sinks
    pub fn sink_count(&self) -> usize {
        self.snapshot().len()
    }

    /// Write a request, inferring the signal from its type
    pub async fn write_message(
        &self,
        message: &TelemetryMessage,
        cancel: &CancellationToken,
    ) -> Result<WriteReport, OtlpPipelineError> {
        self.write(message, message.signal(), cancel).await
    }

    /// Write a request declared as `signal` to every matching sink
    ///
    /// Fails only on contract violations: an unspecified signal, a payload of
    /// another signal, or a serialization failure. Sink failures and
    /// cancellations are counted in the returned report.
    pub async fn write(
        &self,
        message: &TelemetryMessage,
        signal: Signal,
        cancel: &CancellationToken,
    ) -> Result<WriteReport, OtlpPipelineError> {
        if signal == Signal::Unspecified {
            return Err(OtlpPipelineError::UnspecifiedSignal);
        }
        if message.signal() != signal {
            return Err(OtlpPipelineError::SignalMismatch {
                expected: signal,
                actual: message.signal(),
            });
        }

        let line = self.serializer.serialize_line(message)?;
        let is_error = classifier::contains_error(message);
        let record = TelemetryRecord::new(signal, line, is_error, self.clock.now_utc())?;

        Ok(self.dispatch(&record, cancel).await)
    }

    /// Offer an already built record to every matching sink
    pub async fn dispatch(
        &self,
        record: &TelemetryRecord,
        cancel: &CancellationToken,
    ) -> WriteReport {
        let mut report = WriteReport {
            is_error: record.is_error(),
            ..WriteReport::default()
        };

        for registered in self.snapshot() {
            if !all_pass(&registered.filters, record) {
                report.skipped += 1;
                continue;
            }

            let sink = &registered.sink;
            let outcome = AssertUnwindSafe(async { sink.write(record, cancel).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(OtlpSinkError::Failed("sink panicked".to_string())));

            match outcome {
                Ok(()) => {
                    report.delivered += 1;
                    if sink.is_durable() {
                        report.persisted += 1;
                    }
                }
                Err(OtlpSinkError::Cancelled) => {
                    debug!(sink = sink.name(), signal = %record.signal(), "Sink write cancelled");
                    report.cancelled += 1;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        sink = sink.name(),
                        signal = %record.signal(),
                        error = %e,
                        "Sink write failed, continuing with remaining sinks"
                    );
                    self.health.record_failure(format!("{}: {}", sink.name(), e));
                }
            }
        }

        // A best-effort success must not hide a durable failure
        if report.failed == 0 && report.persisted > 0 {
            self.health.record_success();
        }

        report
    }

    fn snapshot(&self) -> Vec<RegisteredSink> {
        match self.sinks.read() {
            Ok(sinks) => sinks.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
