//! Error types for the OTLP NDJSON library
//!
//! Contract violations (`OtlpPipelineError`) propagate to the caller, while
//! per-sink failures (`OtlpSinkError`) are isolated by the pipeline and only
//! logged.

use std::path::PathBuf;

use thiserror::Error;

use crate::otlp::Signal;

/// Main error type for the OTLP NDJSON library
#[derive(Error, Debug)]
pub enum OtlpError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] OtlpConfigError),

    /// Pipeline contract violations
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] OtlpPipelineError),

    /// Sink write failures
    #[error("Sink error: {0}")]
    Sink(#[from] OtlpSinkError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server-related errors
    #[error("Server error: {0}")]
    Server(#[from] OtlpServerError),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum OtlpConfigError {
    /// Invalid output directory path
    #[error("Invalid output directory: {0}")]
    InvalidOutputDir(String),

    /// Invalid maximum file size
    #[error("Invalid file size: {0}")]
    InvalidFileSize(String),

    /// Invalid port or bind address
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// Configuration file could not be read
    #[error("Failed to read configuration: {0}")]
    ReadFailed(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Programmer/contract errors raised by the pipeline before any sink runs
#[derive(Error, Debug)]
pub enum OtlpPipelineError {
    /// The unspecified signal sentinel was passed in
    #[error("Signal must be specified")]
    UnspecifiedSignal,

    /// The payload type does not belong to the declared signal
    #[error("Message of type {actual} cannot be written as {expected}")]
    SignalMismatch {
        /// Signal declared by the caller
        expected: Signal,
        /// Signal the payload actually carries
        actual: Signal,
    },

    /// JSON serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Failures reported by an individual sink
#[derive(Error, Debug)]
pub enum OtlpSinkError {
    /// Not enough free space on the target volume
    #[error(
        "Insufficient disk space for {}: {available} bytes available, {required} bytes required",
        path.display()
    )]
    InsufficientDiskSpace {
        /// File that would have been written
        path: PathBuf,
        /// Free bytes reported for the volume
        available: u64,
        /// Line length plus the safety buffer
        required: u64,
    },

    /// File system operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being operated on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Cancelled while waiting for the signal lock
    #[error("Write cancelled before it started")]
    Cancelled,

    /// The rotation state was disposed by shutdown
    #[error("File output has been shut down")]
    ShutDown,

    /// Any other sink-specific failure
    #[error("Sink failed: {0}")]
    Failed(String),
}

impl OtlpSinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OtlpSinkError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Server-related errors
#[derive(Error, Debug)]
pub enum OtlpServerError {
    /// Failed to bind server address
    #[error("Failed to bind server address: {0}")]
    BindError(String),

    /// Failed to start server
    #[error("Failed to start server: {0}")]
    StartupError(String),

    /// Server shutdown error
    #[error("Server shutdown error: {0}")]
    ShutdownError(String),
}
