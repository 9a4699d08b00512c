//! Active file tracking and size-based rotation
//!
//! Each (output directory, signal) pair owns one lazily created async mutex
//! guarding its active base path. Holding a [`SignalLease`] serializes every
//! read and replacement of that path, while other signals proceed in
//! parallel. Base paths are named `{signal}.{yyyyMMdd_HHmmss_fff}.ndjson`; the
//! errors-only counterpart swaps the suffix for `.errors.ndjson`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::OtlpSinkError;
use crate::otlp::{Clock, Signal, SystemClock};

/// Suffix of the all-records file
pub const NDJSON_EXTENSION: &str = ".ndjson";

/// Suffix of the errors-only file
pub const ERRORS_NDJSON_EXTENSION: &str = ".errors.ndjson";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";
const DELETE_ATTEMPTS: u32 = 3;
const DELETE_RETRY_DELAY: std::time::Duration = std::time::Duration::from_millis(100);

type SlotKey = (PathBuf, Signal);

#[derive(Debug, Default)]
struct SignalSlot {
    active: Option<PathBuf>,
}

/// Owner of the active file path per (output directory, signal)
#[derive(Debug)]
pub struct RotationManager {
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<SlotKey, Arc<AsyncMutex<SignalSlot>>>>,
    closed: AtomicBool,
}

impl Default for RotationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationManager {
    /// Create a manager using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a manager with an injected time source
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Wait for exclusive access to one signal's active path
    ///
    /// Returns [`OtlpSinkError::Cancelled`] without touching any state if
    /// `cancel` fires before the lock is acquired.
    pub async fn lock_signal(
        &self,
        output_dir: &Path,
        signal: Signal,
        cancel: &CancellationToken,
    ) -> Result<SignalLease, OtlpSinkError> {
        if signal == Signal::Unspecified {
            return Err(OtlpSinkError::Failed(
                "Cannot resolve a file for the unspecified signal".to_string(),
            ));
        }

        let slot = self.slot(output_dir, signal)?;

        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OtlpSinkError::Cancelled),
            guard = slot.lock_owned() => guard,
        };

        Ok(SignalLease {
            output_dir: output_dir.to_path_buf(),
            signal,
            clock: self.clock.clone(),
            guard,
        })
    }

    /// Cached active path for the signal, creating directory and name on first use
    pub async fn get_or_create_file_path(
        &self,
        output_dir: &Path,
        signal: Signal,
    ) -> Result<PathBuf, OtlpSinkError> {
        let mut lease = self
            .lock_signal(output_dir, signal, &CancellationToken::new())
            .await?;
        lease.get_or_create_file_path().await
    }

    /// Replace the signal's active path with a freshly named one
    pub async fn rotate_file(
        &self,
        output_dir: &Path,
        signal: Signal,
    ) -> Result<PathBuf, OtlpSinkError> {
        let mut lease = self
            .lock_signal(output_dir, signal, &CancellationToken::new())
            .await?;
        Ok(lease.rotate_file())
    }

    /// Whether `path` exists and is larger than `max_size_mb` megabytes
    pub async fn should_rotate(path: &Path, max_size_mb: u64) -> bool {
        let limit = max_size_mb.saturating_mul(1024 * 1024);
        match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len() > limit,
            Err(_) => false,
        }
    }

    /// Deterministic base path for a signal at the given instant
    pub fn generate_new_file_path(
        output_dir: &Path,
        signal: Signal,
        now: DateTime<Utc>,
    ) -> PathBuf {
        output_dir.join(format!(
            "{}.{}{}",
            signal,
            now.format(TIMESTAMP_FORMAT),
            NDJSON_EXTENSION
        ))
    }

    /// Swap the `.ndjson` suffix of a base path for `extension`
    pub fn derive_path(base: &Path, extension: &str) -> PathBuf {
        let base_str = base.to_string_lossy();
        match base_str.strip_suffix(NDJSON_EXTENSION) {
            Some(stem) => PathBuf::from(format!("{stem}{extension}")),
            None => PathBuf::from(format!("{base_str}{extension}")),
        }
    }

    /// Errors-only counterpart of a base path
    pub fn errors_file_path(base: &Path) -> PathBuf {
        Self::derive_path(base, ERRORS_NDJSON_EXTENSION)
    }

    /// Files written for `signal` in `output_dir`, oldest first
    pub async fn list_files(
        output_dir: &Path,
        signal: Signal,
    ) -> Result<Vec<PathBuf>, OtlpSinkError> {
        let prefix = format!("{signal}.");
        let mut entries = match tokio::fs::read_dir(output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(OtlpSinkError::io(output_dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OtlpSinkError::io(output_dir, e))?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(NDJSON_EXTENSION) {
                files.push(entry.path());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Delete the files of one or every signal and forget their active paths
    ///
    /// Each signal is cleared while holding its lock, so no write for that
    /// signal can interleave with the deletion. Returns the number of files
    /// removed.
    pub async fn clear(
        &self,
        output_dir: &Path,
        signal: Option<Signal>,
    ) -> Result<usize, OtlpSinkError> {
        let signals = match signal {
            Some(signal) => vec![signal],
            None => Signal::ALL.to_vec(),
        };

        let mut deleted = 0;
        for signal in signals {
            let mut lease = self
                .lock_signal(output_dir, signal, &CancellationToken::new())
                .await?;
            lease.forget();

            for path in Self::list_files(output_dir, signal).await? {
                remove_with_retry(&path).await?;
                deleted += 1;
            }
        }

        info!(
            output_dir = %output_dir.display(),
            deleted = deleted,
            "Cleared telemetry files"
        );

        Ok(deleted)
    }

    /// Release every per-signal lock and forget all active paths
    ///
    /// Leases still held by in-flight writes stay valid until dropped; new
    /// lock requests fail with [`OtlpSinkError::ShutDown`].
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut slots) = self.slots.lock() {
            debug!(slots = slots.len(), "Disposing rotation state");
            slots.clear();
        }
    }

    fn slot(
        &self,
        output_dir: &Path,
        signal: Signal,
    ) -> Result<Arc<AsyncMutex<SignalSlot>>, OtlpSinkError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(OtlpSinkError::ShutDown);
        }

        let mut slots = self
            .slots
            .lock()
            .map_err(|_| OtlpSinkError::Failed("rotation state lock poisoned".to_string()))?;

        Ok(slots
            .entry((output_dir.to_path_buf(), signal))
            .or_default()
            .clone())
    }
}

/// Exclusive access to one signal's active path, released on drop
#[derive(Debug)]
pub struct SignalLease {
    output_dir: PathBuf,
    signal: Signal,
    clock: Arc<dyn Clock>,
    guard: OwnedMutexGuard<SignalSlot>,
}

impl SignalLease {
    /// Signal this lease guards
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Currently cached base path, if any
    pub fn active_path(&self) -> Option<&Path> {
        self.guard.active.as_deref()
    }

    /// Cached base path, creating the directory and a first name if needed
    pub async fn get_or_create_file_path(&mut self) -> Result<PathBuf, OtlpSinkError> {
        if let Some(path) = &self.guard.active {
            return Ok(path.clone());
        }

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| OtlpSinkError::io(&self.output_dir, e))?;

        let path = RotationManager::generate_new_file_path(
            &self.output_dir,
            self.signal,
            self.clock.now_utc(),
        );

        info!(
            signal = %self.signal,
            file = %path.display(),
            "Opened new telemetry file"
        );

        self.guard.active = Some(path.clone());
        Ok(path)
    }

    /// Generate a new base path, distinct from the current one, and cache it
    pub fn rotate_file(&mut self) -> PathBuf {
        let mut now = self.clock.now_utc();
        let mut path = RotationManager::generate_new_file_path(&self.output_dir, self.signal, now);

        while self.guard.active.as_deref() == Some(path.as_path()) {
            now += Duration::milliseconds(1);
            path = RotationManager::generate_new_file_path(&self.output_dir, self.signal, now);
        }

        info!(
            signal = %self.signal,
            previous = ?self.guard.active,
            file = %path.display(),
            "Rotated telemetry file"
        );

        self.guard.active = Some(path.clone());
        path
    }

    fn forget(&mut self) {
        self.guard.active = None;
    }
}

async fn remove_with_retry(path: &Path) -> Result<(), OtlpSinkError> {
    let mut attempt = 1;
    loop {
        match tokio::fs::remove_file(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if attempt < DELETE_ATTEMPTS => {
                warn!(
                    file = %path.display(),
                    attempt = attempt,
                    error = %e,
                    "Failed to delete telemetry file, retrying"
                );
                attempt += 1;
                tokio::time::sleep(DELETE_RETRY_DELAY).await;
            }
            Err(e) => return Err(OtlpSinkError::io(path, e)),
        }
    }
}
