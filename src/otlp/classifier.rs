//! Error classification for decoded OTLP requests
//!
//! Pure functions: a request "contains an error" when any span reports an
//! `ERROR` status or an `exception` event, or when any log record is at
//! ERROR severity or carries an exception attribute. Metrics never classify
//! as errors. Absent nested messages are treated as "no error".

use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::logs::v1::LogRecord;
use opentelemetry_proto::tonic::trace::v1::Span;
use opentelemetry_proto::tonic::trace::v1::status::StatusCode;

use crate::otlp::TelemetryMessage;

/// Lowest severity number in the ERROR range (ERROR..FATAL4 are 17..=24)
pub const ERROR_SEVERITY_THRESHOLD: i32 = 17;

/// Span event name recorded for exceptions by OpenTelemetry SDKs
pub const EXCEPTION_EVENT_NAME: &str = "exception";

/// Log attribute keys from the exception semantic conventions
pub const EXCEPTION_ATTRIBUTE_KEYS: [&str; 3] = [
    "exception.type",
    "exception.message",
    "exception.stacktrace",
];

/// Whether the request carries at least one error
pub fn contains_error(message: &TelemetryMessage) -> bool {
    match message {
        TelemetryMessage::Traces(request) => trace_contains_error(request),
        TelemetryMessage::Logs(request) => logs_contain_error(request),
        TelemetryMessage::Metrics(_) => false,
    }
}

/// Stops at the first span with an error status or exception event
pub fn trace_contains_error(request: &ExportTraceServiceRequest) -> bool {
    request
        .resource_spans
        .iter()
        .flat_map(|resource| resource.scope_spans.iter())
        .flat_map(|scope| scope.spans.iter())
        .any(span_is_error)
}

/// Stops at the first record at ERROR severity or with exception attributes
pub fn logs_contain_error(request: &ExportLogsServiceRequest) -> bool {
    request
        .resource_logs
        .iter()
        .flat_map(|resource| resource.scope_logs.iter())
        .flat_map(|scope| scope.log_records.iter())
        .any(log_record_is_error)
}

fn span_is_error(span: &Span) -> bool {
    let error_status = span
        .status
        .as_ref()
        .is_some_and(|status| status.code == StatusCode::Error as i32);

    error_status
        || span
            .events
            .iter()
            .any(|event| event.name == EXCEPTION_EVENT_NAME)
}

fn log_record_is_error(record: &LogRecord) -> bool {
    record.severity_number >= ERROR_SEVERITY_THRESHOLD
        || record
            .attributes
            .iter()
            .any(|kv| EXCEPTION_ATTRIBUTE_KEYS.contains(&kv.key.as_str()))
}
