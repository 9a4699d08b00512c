//! Durable NDJSON file sink
//!
//! Appends each record to the active file of its signal, rotating by size and
//! refusing writes that would bring the volume within
//! [`DISK_SPACE_SAFETY_BUFFER`] of full. Two instances usually share one
//! [`RotationManager`]: one writing `.ndjson`, one writing `.errors.ndjson`.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::error::OtlpSinkError;
use crate::otlp::rotation::{ERRORS_NDJSON_EXTENSION, NDJSON_EXTENSION};
use crate::otlp::{RotationManager, TelemetryRecord, TelemetrySink};

/// Free space that must remain on the volume after a write (100 MB)
pub const DISK_SPACE_SAFETY_BUFFER: u64 = 100 * 1024 * 1024;

/// Query for free bytes on the volume holding a path
pub trait DiskSpaceProbe: Send + Sync + Debug {
    /// Bytes available to the current user on the volume containing `path`
    fn available_space(&self, path: &Path) -> std::io::Result<u64>;
}

/// Reads free space from the file system
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeSpaceProbe;

impl DiskSpaceProbe for VolumeSpaceProbe {
    fn available_space(&self, path: &Path) -> std::io::Result<u64> {
        fs2::available_space(path)
    }
}

/// Which file stream a sink writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSinkKind {
    /// `{signal}.{timestamp}.ndjson`
    AllRecords,
    /// `{signal}.{timestamp}.errors.ndjson`
    ErrorsOnly,
}

impl FileSinkKind {
    /// File suffix written by this kind
    pub fn extension(&self) -> &'static str {
        match self {
            FileSinkKind::AllRecords => NDJSON_EXTENSION,
            FileSinkKind::ErrorsOnly => ERRORS_NDJSON_EXTENSION,
        }
    }

    fn sink_name(&self) -> &'static str {
        match self {
            FileSinkKind::AllRecords => "file",
            FileSinkKind::ErrorsOnly => "file-errors",
        }
    }
}

/// Appends records to rotating per-signal NDJSON files
#[derive(Debug, Clone)]
pub struct FileSink {
    kind: FileSinkKind,
    output_dir: PathBuf,
    max_file_size_mb: u64,
    rotation: Arc<RotationManager>,
    disk_space: Arc<dyn DiskSpaceProbe>,
}

impl FileSink {
    /// Create a file sink writing into `output_dir`
    pub fn new(
        kind: FileSinkKind,
        output_dir: impl Into<PathBuf>,
        max_file_size_mb: u64,
        rotation: Arc<RotationManager>,
    ) -> Self {
        Self {
            kind,
            output_dir: output_dir.into(),
            max_file_size_mb,
            rotation,
            disk_space: Arc::new(VolumeSpaceProbe),
        }
    }

    /// Replace the free-space query
    pub fn with_disk_space_probe(mut self, probe: Arc<dyn DiskSpaceProbe>) -> Self {
        self.disk_space = probe;
        self
    }

    /// File stream this sink writes
    pub fn kind(&self) -> FileSinkKind {
        self.kind
    }

    /// Directory files are written to
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn write_record(
        &self,
        record: &TelemetryRecord,
        cancel: &CancellationToken,
    ) -> Result<(), OtlpSinkError> {
        let signal = record.signal();
        let mut lease = self
            .rotation
            .lock_signal(&self.output_dir, signal, cancel)
            .await?;

        let base = lease.get_or_create_file_path().await?;
        let mut target = RotationManager::derive_path(&base, self.kind.extension());

        if RotationManager::should_rotate(&target, self.max_file_size_mb).await {
            let base = lease.rotate_file();
            target = RotationManager::derive_path(&base, self.kind.extension());
        }

        let line = record.serialized_line().as_bytes();
        self.ensure_disk_space(&target, line.len() as u64).await?;
        append(&target, line).await?;

        trace!(
            signal = %signal,
            file = %target.display(),
            bytes = line.len(),
            "Appended record"
        );

        Ok(())
    }

    async fn ensure_disk_space(&self, target: &Path, line_len: u64) -> Result<(), OtlpSinkError> {
        let volume_path = target.parent().unwrap_or(&self.output_dir).to_path_buf();
        let probe = self.disk_space.clone();
        let query_path = volume_path.clone();

        // statvfs can stall on network volumes
        let available = tokio::task::spawn_blocking(move || probe.available_space(&query_path))
            .await
            .map_err(|e| OtlpSinkError::Failed(format!("Disk space query aborted: {}", e)))?
            .map_err(|e| OtlpSinkError::io(&volume_path, e))?;
        let required = line_len.saturating_add(DISK_SPACE_SAFETY_BUFFER);

        if available < required {
            warn!(
                file = %target.display(),
                available_bytes = available,
                required_bytes = required,
                "Refusing write, disk space below safety buffer"
            );
            return Err(OtlpSinkError::InsufficientDiskSpace {
                path: target.to_path_buf(),
                available,
                required,
            });
        }

        Ok(())
    }
}

impl TelemetrySink for FileSink {
    fn name(&self) -> &str {
        self.kind.sink_name()
    }

    fn write<'a>(
        &'a self,
        record: &'a TelemetryRecord,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), OtlpSinkError>> {
        self.write_record(record, cancel).boxed()
    }
}

async fn append(path: &Path, line: &[u8]) -> Result<(), OtlpSinkError> {
    let mut file = match open_append(path).await {
        Ok(file) => file,
        // Directory removed externally since the path was cached
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| OtlpSinkError::io(parent, e))?;
            }
            open_append(path)
                .await
                .map_err(|e| OtlpSinkError::io(path, e))?
        }
        Err(e) => return Err(OtlpSinkError::io(path, e)),
    };

    file.write_all(line)
        .await
        .map_err(|e| OtlpSinkError::io(path, e))?;
    file.flush().await.map_err(|e| OtlpSinkError::io(path, e))?;

    Ok(())
}

async fn open_append(path: &Path) -> std::io::Result<tokio::fs::File> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}
