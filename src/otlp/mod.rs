//! OpenTelemetry Protocol (OTLP) module
//!
//! Provides the ingestion pipeline, its sinks and filters, file rotation and
//! the transport adapters that feed decoded OTLP requests into the pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;

use crate::error::OtlpPipelineError;

/// Telemetry category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Signal {
    /// Sentinel for "not yet known"; never valid for a write
    #[default]
    Unspecified,
    /// OpenTelemetry trace data
    Traces,
    /// OpenTelemetry log data
    Logs,
    /// OpenTelemetry metric data
    Metrics,
}

impl Signal {
    /// Every concrete signal, in a stable order
    pub const ALL: [Signal; 3] = [Signal::Traces, Signal::Logs, Signal::Metrics];

    /// Lowercase name used in file names and console output
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Unspecified => "unspecified",
            Signal::Traces => "traces",
            Signal::Logs => "logs",
            Signal::Metrics => "metrics",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded OTLP export request
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    /// `ExportTraceServiceRequest`
    Traces(ExportTraceServiceRequest),
    /// `ExportLogsServiceRequest`
    Logs(ExportLogsServiceRequest),
    /// `ExportMetricsServiceRequest`
    Metrics(ExportMetricsServiceRequest),
}

impl TelemetryMessage {
    /// Signal carried by this payload
    pub fn signal(&self) -> Signal {
        match self {
            TelemetryMessage::Traces(_) => Signal::Traces,
            TelemetryMessage::Logs(_) => Signal::Logs,
            TelemetryMessage::Metrics(_) => Signal::Metrics,
        }
    }
}

impl From<ExportTraceServiceRequest> for TelemetryMessage {
    fn from(request: ExportTraceServiceRequest) -> Self {
        TelemetryMessage::Traces(request)
    }
}

impl From<ExportLogsServiceRequest> for TelemetryMessage {
    fn from(request: ExportLogsServiceRequest) -> Self {
        TelemetryMessage::Logs(request)
    }
}

impl From<ExportMetricsServiceRequest> for TelemetryMessage {
    fn from(request: ExportMetricsServiceRequest) -> Self {
        TelemetryMessage::Metrics(request)
    }
}

/// One processed request, shared read-only by every sink
///
/// Fields are only reachable through accessors so no sink can alter the line
/// or the error flag after the pipeline built it.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    signal: Signal,
    serialized_line: String,
    is_error: bool,
    timestamp: DateTime<Utc>,
}

impl TelemetryRecord {
    /// Build a record, rejecting the unspecified signal
    pub fn new(
        signal: Signal,
        serialized_line: impl Into<String>,
        is_error: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, OtlpPipelineError> {
        if signal == Signal::Unspecified {
            return Err(OtlpPipelineError::UnspecifiedSignal);
        }

        Ok(Self {
            signal,
            serialized_line: serialized_line.into(),
            is_error,
            timestamp,
        })
    }

    /// Signal of the originating request
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// NDJSON line including its trailing newline
    pub fn serialized_line(&self) -> &str {
        &self.serialized_line
    }

    /// Whether the classifier flagged the request as containing an error
    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// UTC instant the record was created
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

pub mod classifier;
pub mod clock;
pub mod console_sink;
pub mod file_sink;
pub mod filter;
pub mod health;
pub mod http;
pub mod pipeline;
pub mod rotation;
pub mod serializer;
pub mod server;
pub mod sink;

pub use classifier::contains_error;
pub use clock::{Clock, SystemClock};
pub use console_sink::ConsoleSink;
pub use file_sink::{DiskSpaceProbe, FileSink, FileSinkKind, VolumeSpaceProbe};
pub use filter::{AllSignalsFilter, ErrorsOnlyFilter, SignalFilter, TelemetryFilter};
pub use health::HealthState;
pub use http::{OtlpHttpState, otlp_http_router};
pub use pipeline::{Pipeline, WriteReport};
pub use rotation::RotationManager;
pub use serializer::JsonSerializer;
pub use server::{LogsServiceImpl, MetricsServiceImpl, OtlpGrpcServer, TraceServiceImpl};
pub use sink::TelemetrySink;
