//! OTLP NDJSON Library
//!
//! A local OpenTelemetry Protocol (OTLP) receiver that converts traces, logs
//! and metrics export requests to newline-delimited JSON and persists them to
//! rotating files, with a parallel errors-only file per signal.
//!
//! # Features
//!
//! - OTLP/HTTP (protobuf and JSON) and optional OTLP/gRPC reception
//! - Per-signal NDJSON files rotated by size, written fully in parallel across signals
//! - Error classification of spans and log records into `.errors.ndjson` files
//! - Disk-space preflight that keeps a safety buffer free on the volume
//! - Optional colored console tail of received records
//! - Configurable via YAML, environment variables, or programmatic API
//!
//! # Example
//!
//! ```no_run
//! use otlp_ndjson_library::{Config, OtlpLibrary};
//!
//! # async fn example() -> Result<(), otlp_ndjson_library::OtlpError> {
//! let library = OtlpLibrary::new(Config::default()).await?;
//!
//! // library.export_traces(request).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod otlp;

// Re-export public API
pub use api::public::OtlpLibrary;
pub use config::{Config, ConfigBuilder, ConfigLoader};
pub use error::{OtlpConfigError, OtlpError, OtlpPipelineError, OtlpServerError, OtlpSinkError};
pub use otlp::{Signal, TelemetryMessage, TelemetryRecord};

use tracing_subscriber::EnvFilter;

/// Initialize structured logging
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
}
