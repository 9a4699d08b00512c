//! Sink abstraction for processed telemetry records

use std::fmt::Debug;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::OtlpSinkError;
use crate::otlp::TelemetryRecord;

/// Consumer of processed records that performs a side effect
///
/// Implementations must be safe to call concurrently. A returned error is
/// logged by the pipeline and never stops delivery to other sinks.
pub trait TelemetrySink: Send + Sync + Debug {
    /// Short name used in log output
    fn name(&self) -> &str;

    /// Whether a successful write means the record is persisted
    ///
    /// Only durable sinks acknowledge a request or clear degraded health.
    fn is_durable(&self) -> bool {
        true
    }

    /// Consume one record
    fn write<'a>(
        &'a self,
        record: &'a TelemetryRecord,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), OtlpSinkError>>;
}
