//! gRPC server for receiving OTLP messages
//!
//! Implements OTLP TraceService, LogsService and MetricsService using the tonic
//! gRPC framework. Every request goes through the shared [`Pipeline`].

use crate::error::OtlpServerError;
use crate::otlp::{Pipeline, Signal, TelemetryMessage, WriteReport};
use opentelemetry_proto::tonic::collector::logs::v1::{
    ExportLogsServiceRequest, ExportLogsServiceResponse,
    logs_service_server::{LogsService, LogsServiceServer},
};
use opentelemetry_proto::tonic::collector::metrics::v1::{
    ExportMetricsServiceRequest, ExportMetricsServiceResponse,
    metrics_service_server::{MetricsService, MetricsServiceServer},
};
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
    trace_service_server::{TraceService, TraceServiceServer},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::{error, info, warn};

/// gRPC server for OTLP messages
#[derive(Debug, Clone)]
pub struct OtlpGrpcServer {
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
}

impl OtlpGrpcServer {
    /// Create a new gRPC server writing into `pipeline`
    pub fn new(pipeline: Arc<Pipeline>, cancel: CancellationToken) -> Self {
        Self { pipeline, cancel }
    }

    /// Serve on the specified address until the cancellation token fires
    pub async fn start(&self, addr: std::net::SocketAddr) -> Result<(), OtlpServerError> {
        info!("Starting OTLP gRPC server on {}", addr);

        let trace_service = TraceServiceImpl::new(self.pipeline.clone(), self.cancel.clone());

        let logs_service = LogsServiceImpl::new(self.pipeline.clone(), self.cancel.clone());

        let metrics_service = MetricsServiceImpl::new(self.pipeline.clone(), self.cancel.clone());

        let cancel = self.cancel.clone();
        Server::builder()
            .add_service(TraceServiceServer::new(trace_service))
            .add_service(LogsServiceServer::new(logs_service))
            .add_service(MetricsServiceServer::new(metrics_service))
            .serve_with_shutdown(addr, async move { cancel.cancelled().await })
            .await
            .map_err(|e| OtlpServerError::StartupError(e.to_string()))?;

        Ok(())
    }
}

/// Trace service implementation
#[derive(Debug, Clone)]
pub struct TraceServiceImpl {
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
}

impl TraceServiceImpl {
    /// Create a service writing into `pipeline`
    pub fn new(pipeline: Arc<Pipeline>, cancel: CancellationToken) -> Self {
        Self { pipeline, cancel }
    }
}

#[tonic::async_trait]
impl TraceService for TraceServiceImpl {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        let message = TelemetryMessage::from(request.into_inner());
        write_to_pipeline(&self.pipeline, &message, Signal::Traces, &self.cancel).await?;

        Ok(Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}

/// Logs service implementation
#[derive(Debug, Clone)]
pub struct LogsServiceImpl {
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
}

impl LogsServiceImpl {
    /// Create a service writing into `pipeline`
    pub fn new(pipeline: Arc<Pipeline>, cancel: CancellationToken) -> Self {
        Self { pipeline, cancel }
    }
}

#[tonic::async_trait]
impl LogsService for LogsServiceImpl {
    async fn export(
        &self,
        request: Request<ExportLogsServiceRequest>,
    ) -> Result<Response<ExportLogsServiceResponse>, Status> {
        let message = TelemetryMessage::from(request.into_inner());
        write_to_pipeline(&self.pipeline, &message, Signal::Logs, &self.cancel).await?;

        Ok(Response::new(ExportLogsServiceResponse {
            partial_success: None,
        }))
    }
}

/// Metrics service implementation
#[derive(Debug, Clone)]
pub struct MetricsServiceImpl {
    pipeline: Arc<Pipeline>,
    cancel: CancellationToken,
}

impl MetricsServiceImpl {
    /// Create a service writing into `pipeline`
    pub fn new(pipeline: Arc<Pipeline>, cancel: CancellationToken) -> Self {
        Self { pipeline, cancel }
    }
}

#[tonic::async_trait]
impl MetricsService for MetricsServiceImpl {
    async fn export(
        &self,
        request: Request<ExportMetricsServiceRequest>,
    ) -> Result<Response<ExportMetricsServiceResponse>, Status> {
        let message = TelemetryMessage::from(request.into_inner());
        write_to_pipeline(&self.pipeline, &message, Signal::Metrics, &self.cancel).await?;

        Ok(Response::new(ExportMetricsServiceResponse {
            partial_success: None,
        }))
    }
}

async fn write_to_pipeline(
    pipeline: &Pipeline,
    message: &TelemetryMessage,
    signal: Signal,
    cancel: &CancellationToken,
) -> Result<WriteReport, Status> {
    let report = pipeline.write(message, signal, cancel).await.map_err(|e| {
        error!(signal = %signal, error = %e, "Rejected OTLP request");
        Status::internal(format!("Failed to process {}: {}", signal, e))
    })?;

    if report.all_failed() {
        error!(signal = %signal, failed = report.failed, "Every sink failed");
        return Err(Status::internal(format!(
            "Failed to persist {}: all sinks failed",
            signal
        )));
    }

    if report.interrupted() {
        warn!(signal = %signal, "Request cancelled before it was persisted");
        return Err(Status::unavailable(format!(
            "Shutting down, {} were not persisted",
            signal
        )));
    }

    Ok(report)
}
