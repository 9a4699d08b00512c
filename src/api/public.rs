//! Public API for embedded library usage
//!
//! Wires the pipeline, the two file sinks and the optional console sink from
//! a [`Config`], and offers programmatic export without going through HTTP
//! or gRPC.

use crate::config::Config;
use crate::error::{OtlpError, OtlpSinkError};
use crate::otlp::{
    ConsoleSink, ErrorsOnlyFilter, FileSink, FileSinkKind, HealthState, JsonSerializer, Pipeline,
    RotationManager, Signal, TelemetryMessage, WriteReport,
};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Main library instance for embedded usage
///
/// # Example
///
/// ```no_run
/// use otlp_ndjson_library::{Config, OtlpLibrary};
/// use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
///
/// # async fn example() -> Result<(), otlp_ndjson_library::OtlpError> {
/// let library = OtlpLibrary::new(Config::default()).await?;
///
/// library.export_traces(ExportTraceServiceRequest::default()).await?;
///
/// library.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct OtlpLibrary {
    config: Config,
    pipeline: Arc<Pipeline>,
    rotation: Arc<RotationManager>,
    cancel: CancellationToken,
}

impl OtlpLibrary {
    /// Create a new library instance with the provided configuration
    ///
    /// Returns `Err(OtlpError)` if configuration validation fails or the
    /// output directory cannot be created.
    pub async fn new(config: Config) -> Result<Self, OtlpError> {
        Self::with_rotation(config, Arc::new(RotationManager::new())).await
    }

    /// Create a library instance around an existing rotation manager
    pub async fn with_rotation(
        config: Config,
        rotation: Arc<RotationManager>,
    ) -> Result<Self, OtlpError> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.output_dir)
            .await
            .map_err(|e| {
                OtlpError::Io(std::io::Error::other(format!(
                    "Failed to create output directory {}: {}",
                    config.output_dir.display(),
                    e
                )))
            })?;

        let pipeline = Arc::new(Pipeline::new(JsonSerializer::new(config.pretty_json)));

        let all_records = FileSink::new(
            FileSinkKind::AllRecords,
            config.output_dir.clone(),
            config.max_file_size_mb,
            rotation.clone(),
        );
        pipeline.register(Arc::new(all_records), Vec::new());

        let errors_only = FileSink::new(
            FileSinkKind::ErrorsOnly,
            config.output_dir.clone(),
            config.max_file_size_mb,
            rotation.clone(),
        );
        pipeline.register(Arc::new(errors_only), vec![Arc::new(ErrorsOnlyFilter)]);

        if config.console.enabled {
            let console = ConsoleSink::new().colored(config.console.colored);
            pipeline.register(Arc::new(console), Vec::new());
        }

        info!(
            output_dir = %config.output_dir.display(),
            max_file_size_mb = config.max_file_size_mb,
            sinks = pipeline.sink_count(),
            "Initialized OTLP NDJSON pipeline"
        );

        Ok(Self {
            config,
            pipeline,
            rotation,
            cancel: CancellationToken::new(),
        })
    }

    /// Configuration the library was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory NDJSON files are written to
    pub fn output_dir(&self) -> PathBuf {
        self.config.output_dir.clone()
    }

    /// Shared pipeline, for registering extra sinks or transport adapters
    pub fn pipeline(&self) -> Arc<Pipeline> {
        self.pipeline.clone()
    }

    /// Shared rotation manager
    pub fn rotation(&self) -> Arc<RotationManager> {
        self.rotation.clone()
    }

    /// Health tracker fed by sink outcomes
    pub fn health(&self) -> Arc<HealthState> {
        self.pipeline.health()
    }

    /// Token cancelled by [`OtlpLibrary::shutdown`]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Write any decoded request
    pub async fn export(&self, message: TelemetryMessage) -> Result<WriteReport, OtlpError> {
        Ok(self.pipeline.write_message(&message, &self.cancel).await?)
    }

    /// Write a trace export request
    pub async fn export_traces(
        &self,
        request: ExportTraceServiceRequest,
    ) -> Result<WriteReport, OtlpError> {
        self.export(request.into()).await
    }

    /// Write a logs export request
    pub async fn export_logs(
        &self,
        request: ExportLogsServiceRequest,
    ) -> Result<WriteReport, OtlpError> {
        self.export(request.into()).await
    }

    /// Write a metrics export request
    pub async fn export_metrics(
        &self,
        request: ExportMetricsServiceRequest,
    ) -> Result<WriteReport, OtlpError> {
        self.export(request.into()).await
    }

    /// Delete written files for one signal, or all signals when `None`
    pub async fn clear(&self, signal: Option<Signal>) -> Result<usize, OtlpSinkError> {
        self.rotation.clear(&self.config.output_dir, signal).await
    }

    /// Files written for a signal, oldest first
    pub async fn list_files(&self, signal: Signal) -> Result<Vec<PathBuf>, OtlpSinkError> {
        RotationManager::list_files(&self.config.output_dir, signal).await
    }

    /// Stop accepting writes and dispose rotation state
    pub async fn shutdown(&self) -> Result<(), OtlpError> {
        info!("Shutting down OTLP NDJSON pipeline");
        self.cancel.cancel();
        self.rotation.shutdown();
        Ok(())
    }
}
