//! Integration tests for NDJSON file writing, rotation and disk-space preflight

use chrono::{DateTime, Duration, TimeZone, Utc};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use otlp_ndjson_library::error::OtlpSinkError;
use otlp_ndjson_library::otlp::file_sink::DISK_SPACE_SAFETY_BUFFER;
use otlp_ndjson_library::otlp::{
    Clock, ConsoleSink, DiskSpaceProbe, ErrorsOnlyFilter, FileSink, FileSinkKind, JsonSerializer,
    Pipeline, RotationManager, TelemetrySink,
};
use otlp_ndjson_library::{Signal, TelemetryRecord};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Clock that only moves when told to
#[derive(Debug)]
struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    fn new() -> Arc<Self> {
        let start = Utc
            .with_ymd_and_hms(2024, 6, 1, 12, 0, 0)
            .single()
            .unwrap();
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    fn advance_ms(&self, ms: i64) {
        *self.now.lock().unwrap() += Duration::milliseconds(ms);
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Disk-space probe reporting a fixed number of free bytes
#[derive(Debug)]
struct FixedSpace(u64);

impl DiskSpaceProbe for FixedSpace {
    fn available_space(&self, _path: &Path) -> std::io::Result<u64> {
        Ok(self.0)
    }
}

/// Disk-space probe that takes a while to answer
#[derive(Debug)]
struct SlowSpace(std::time::Duration);

impl DiskSpaceProbe for SlowSpace {
    fn available_space(&self, _path: &Path) -> std::io::Result<u64> {
        std::thread::sleep(self.0);
        Ok(u64::MAX)
    }
}

fn record(signal: Signal, body: &str, is_error: bool) -> TelemetryRecord {
    TelemetryRecord::new(signal, format!("{{\"body\":\"{}\"}}\n", body), is_error, Utc::now())
        .unwrap()
}

fn sink(kind: FileSinkKind, dir: &Path, max_mb: u64, rotation: &Arc<RotationManager>) -> FileSink {
    FileSink::new(kind, dir, max_mb, rotation.clone())
        .with_disk_space_probe(Arc::new(FixedSpace(u64::MAX)))
}

async fn normal_files(dir: &Path, signal: Signal) -> Vec<PathBuf> {
    RotationManager::list_files(dir, signal)
        .await
        .unwrap()
        .into_iter()
        .filter(|path| !path.to_string_lossy().ends_with(".errors.ndjson"))
        .collect()
}

fn pad_past_one_megabyte(path: &Path) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(path)
        .unwrap();
    let filler = format!("{}\n", "f".repeat(1024));
    for _ in 0..1100 {
        file.write_all(filler.as_bytes()).unwrap();
    }
}

fn file_pipeline(dir: &Path, max_mb: u64, rotation: &Arc<RotationManager>) -> Pipeline {
    let pipeline = Pipeline::new(JsonSerializer::new(false));
    pipeline.register(
        Arc::new(sink(FileSinkKind::AllRecords, dir, max_mb, rotation)),
        Vec::new(),
    );
    pipeline.register(
        Arc::new(sink(FileSinkKind::ErrorsOnly, dir, max_mb, rotation)),
        vec![Arc::new(ErrorsOnlyFilter)],
    );
    pipeline
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_first_write_creates_timestamped_file() {
    let temp_dir = TempDir::new().unwrap();
    let output_dir = temp_dir.path().join("nested/out");
    let rotation = Arc::new(RotationManager::with_clock(ManualClock::new()));
    let sink = sink(FileSinkKind::AllRecords, &output_dir, 100, &rotation);

    sink.write(&record(Signal::Logs, "hello", false), &CancellationToken::new())
        .await
        .unwrap();

    let expected = output_dir.join("logs.20240601_120000_000.ndjson");
    assert!(expected.exists(), "Expected {}", expected.display());
    assert_eq!(read_lines(&expected), vec!["{\"body\":\"hello\"}".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_to_one_signal_are_not_interleaved() {
    let temp_dir = TempDir::new().unwrap();
    let rotation = Arc::new(RotationManager::new());
    let sink = Arc::new(sink(FileSinkKind::AllRecords, temp_dir.path(), 100, &rotation));

    let writers = 100;
    let mut join_set = JoinSet::new();
    for i in 0..writers {
        let sink = sink.clone();
        join_set.spawn(async move {
            // Large enough that a torn write would be visible
            let body = format!("writer-{}-{}", i, "x".repeat(8 * 1024));
            sink.write(&record(Signal::Traces, &body, false), &CancellationToken::new())
                .await
        });
    }

    while let Some(result) = join_set.join_next().await {
        result.expect("Task join error").expect("Write failed");
    }

    let files = normal_files(temp_dir.path(), Signal::Traces).await;
    assert_eq!(files.len(), 1);

    let lines = read_lines(&files[0]);
    assert_eq!(lines.len(), writers);

    let mut writers_seen: Vec<usize> = lines
        .iter()
        .map(|line| {
            let json: serde_json::Value = serde_json::from_str(line).expect("Corrupted line");
            let body = json["body"].as_str().unwrap();
            body.split('-').nth(1).unwrap().parse().unwrap()
        })
        .collect();
    writers_seen.sort();
    assert_eq!(writers_seen, (0..writers).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_signals_do_not_block_each_other() {
    let temp_dir = TempDir::new().unwrap();
    let rotation = Arc::new(RotationManager::new());
    let sink = sink(FileSinkKind::AllRecords, temp_dir.path(), 100, &rotation);
    let cancel = CancellationToken::new();

    // Hold the traces lock for the whole test
    let _traces_lease = rotation
        .lock_signal(temp_dir.path(), Signal::Traces, &cancel)
        .await
        .unwrap();

    let logs = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sink.write(&record(Signal::Logs, "log", false), &cancel),
    )
    .await;
    assert!(matches!(logs, Ok(Ok(()))), "Logs write should not wait on traces");

    let metrics = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sink.write(&record(Signal::Metrics, "metric", false), &cancel),
    )
    .await;
    assert!(matches!(metrics, Ok(Ok(()))));

    let traces = tokio::time::timeout(
        std::time::Duration::from_millis(200),
        sink.write(&record(Signal::Traces, "trace", false), &cancel),
    )
    .await;
    assert!(traces.is_err(), "Traces write must wait for the held lock");
}

#[tokio::test]
async fn test_cancelled_lock_wait_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let rotation = Arc::new(RotationManager::new());
    let sink = sink(FileSinkKind::AllRecords, temp_dir.path(), 100, &rotation);

    let lease = rotation
        .lock_signal(temp_dir.path(), Signal::Traces, &CancellationToken::new())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = sink
        .write(&record(Signal::Traces, "late", false), &cancel)
        .await;

    assert!(matches!(result, Err(OtlpSinkError::Cancelled)));
    drop(lease);
    assert!(normal_files(temp_dir.path(), Signal::Traces).await.is_empty());
}

#[tokio::test]
async fn test_oversized_file_rotates_to_new_later_file() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let rotation = Arc::new(RotationManager::with_clock(clock.clone()));
    let sink = sink(FileSinkKind::AllRecords, temp_dir.path(), 1, &rotation);
    let cancel = CancellationToken::new();

    sink.write(&record(Signal::Traces, "first", false), &cancel)
        .await
        .unwrap();
    let first = normal_files(temp_dir.path(), Signal::Traces).await.remove(0);

    // Push the active file past 1 MB
    {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&first)
            .unwrap();
        let filler = format!("{}\n", "f".repeat(1024));
        for _ in 0..1100 {
            file.write_all(filler.as_bytes()).unwrap();
        }
    }
    let size_before = std::fs::metadata(&first).unwrap().len();
    assert!(size_before > 1024 * 1024);
    assert!(RotationManager::should_rotate(&first, 1).await);

    clock.advance_ms(5);
    sink.write(&record(Signal::Traces, "second", false), &cancel)
        .await
        .unwrap();

    let files = normal_files(temp_dir.path(), Signal::Traces).await;
    assert_eq!(files.len(), 2);
    assert_eq!(files[0], first);
    assert!(files[1].file_name() > files[0].file_name());
    assert_eq!(
        files[1],
        temp_dir.path().join("traces.20240601_120000_005.ndjson")
    );

    assert_eq!(std::fs::metadata(&first).unwrap().len(), size_before);
    assert_eq!(read_lines(&files[1]), vec!["{\"body\":\"second\"}".to_string()]);
}

#[tokio::test]
async fn test_rotation_within_same_millisecond_still_gets_new_name() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let rotation = RotationManager::with_clock(clock);

    let first = rotation
        .get_or_create_file_path(temp_dir.path(), Signal::Metrics)
        .await
        .unwrap();
    let second = rotation
        .rotate_file(temp_dir.path(), Signal::Metrics)
        .await
        .unwrap();

    assert_ne!(first, second);
    assert!(second > first);
}

#[tokio::test]
async fn test_error_record_lands_in_both_files_of_same_window() {
    let temp_dir = TempDir::new().unwrap();
    let rotation = Arc::new(RotationManager::with_clock(ManualClock::new()));
    let pipeline = Pipeline::new(JsonSerializer::new(false));
    pipeline.register(
        Arc::new(sink(FileSinkKind::AllRecords, temp_dir.path(), 100, &rotation)),
        Vec::new(),
    );
    pipeline.register(
        Arc::new(sink(FileSinkKind::ErrorsOnly, temp_dir.path(), 100, &rotation)),
        vec![Arc::new(ErrorsOnlyFilter)],
    );
    let cancel = CancellationToken::new();

    let error = record(Signal::Traces, "boom", true);
    let fine = record(Signal::Traces, "fine", false);
    pipeline.dispatch(&fine, &cancel).await;
    pipeline.dispatch(&error, &cancel).await;

    let normal = temp_dir.path().join("traces.20240601_120000_000.ndjson");
    let errors = temp_dir
        .path()
        .join("traces.20240601_120000_000.errors.ndjson");

    assert_eq!(
        read_lines(&normal),
        vec![
            "{\"body\":\"fine\"}".to_string(),
            "{\"body\":\"boom\"}".to_string()
        ]
    );
    assert_eq!(read_lines(&errors), vec!["{\"body\":\"boom\"}".to_string()]);
}

#[tokio::test]
async fn test_insufficient_disk_space_fails_without_touching_file() {
    let temp_dir = TempDir::new().unwrap();
    let rotation = Arc::new(RotationManager::new());
    let roomy = sink(FileSinkKind::AllRecords, temp_dir.path(), 100, &rotation);
    let cancel = CancellationToken::new();

    roomy
        .write(&record(Signal::Logs, "kept", false), &cancel)
        .await
        .unwrap();
    let file = normal_files(temp_dir.path(), Signal::Logs).await.remove(0);
    let length_before = std::fs::metadata(&file).unwrap().len();

    let rejected = record(Signal::Logs, "rejected", false);
    let required = rejected.serialized_line().len() as u64 + DISK_SPACE_SAFETY_BUFFER;
    let cramped = FileSink::new(FileSinkKind::AllRecords, temp_dir.path(), 100, rotation.clone())
        .with_disk_space_probe(Arc::new(FixedSpace(required - 1)));

    let result = cramped.write(&rejected, &cancel).await;

    match result {
        Err(OtlpSinkError::InsufficientDiskSpace {
            available,
            required: needed,
            ..
        }) => {
            assert_eq!(available, required - 1);
            assert_eq!(needed, required);
        }
        other => panic!("Expected InsufficientDiskSpace, got {:?}", other),
    }
    assert_eq!(std::fs::metadata(&file).unwrap().len(), length_before);
}

#[tokio::test]
async fn test_exactly_enough_disk_space_is_accepted() {
    let temp_dir = TempDir::new().unwrap();
    let rotation = Arc::new(RotationManager::new());
    let accepted = record(Signal::Metrics, "edge", false);
    let required = accepted.serialized_line().len() as u64 + DISK_SPACE_SAFETY_BUFFER;
    let sink = FileSink::new(FileSinkKind::AllRecords, temp_dir.path(), 100, rotation)
        .with_disk_space_probe(Arc::new(FixedSpace(required)));

    sink.write(&accepted, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(normal_files(temp_dir.path(), Signal::Metrics).await.len(), 1);
}

#[tokio::test]
async fn test_oversized_errors_file_rotates_independently() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let rotation = Arc::new(RotationManager::with_clock(clock.clone()));
    let pipeline = file_pipeline(temp_dir.path(), 1, &rotation);
    let cancel = CancellationToken::new();
    let dir = temp_dir.path();

    pipeline
        .dispatch(&record(Signal::Traces, "first", true), &cancel)
        .await;

    let normal_t1 = dir.join("traces.20240601_120000_000.ndjson");
    let errors_t1 = dir.join("traces.20240601_120000_000.errors.ndjson");
    pad_past_one_megabyte(&errors_t1);
    let errors_t1_size = std::fs::metadata(&errors_t1).unwrap().len();

    clock.advance_ms(7);
    pipeline
        .dispatch(&record(Signal::Traces, "second", true), &cancel)
        .await;

    // The small normal file keeps its window; only the errors file rotates
    let normal_t2 = dir.join("traces.20240601_120000_007.ndjson");
    let errors_t2 = dir.join("traces.20240601_120000_007.errors.ndjson");
    assert_eq!(
        read_lines(&normal_t1),
        vec![
            "{\"body\":\"first\"}".to_string(),
            "{\"body\":\"second\"}".to_string()
        ]
    );
    assert_eq!(std::fs::metadata(&errors_t1).unwrap().len(), errors_t1_size);
    assert_eq!(read_lines(&errors_t2), vec!["{\"body\":\"second\"}".to_string()]);
    assert!(!normal_t2.exists());

    // The rotated base is shared, so the next record pairs up again
    pipeline
        .dispatch(&record(Signal::Traces, "third", true), &cancel)
        .await;

    assert_eq!(read_lines(&normal_t2), vec!["{\"body\":\"third\"}".to_string()]);
    assert_eq!(
        read_lines(&errors_t2),
        vec![
            "{\"body\":\"second\"}".to_string(),
            "{\"body\":\"third\"}".to_string()
        ]
    );
    assert_eq!(read_lines(&normal_t1).len(), 2);
}

#[tokio::test]
async fn test_oversized_normal_file_does_not_rotate_small_errors_file_early() {
    let temp_dir = TempDir::new().unwrap();
    let clock = ManualClock::new();
    let rotation = Arc::new(RotationManager::with_clock(clock.clone()));
    let pipeline = file_pipeline(temp_dir.path(), 1, &rotation);
    let cancel = CancellationToken::new();
    let dir = temp_dir.path();

    pipeline
        .dispatch(&record(Signal::Logs, "first", true), &cancel)
        .await;
    pad_past_one_megabyte(&dir.join("logs.20240601_120000_000.ndjson"));

    clock.advance_ms(3);
    pipeline
        .dispatch(&record(Signal::Logs, "second", true), &cancel)
        .await;

    // The normal sink rotated the base first, the errors sink follows it
    assert_eq!(
        read_lines(&dir.join("logs.20240601_120000_003.ndjson")),
        vec!["{\"body\":\"second\"}".to_string()]
    );
    assert_eq!(
        read_lines(&dir.join("logs.20240601_120000_003.errors.ndjson")),
        vec!["{\"body\":\"second\"}".to_string()]
    );
    assert_eq!(
        read_lines(&dir.join("logs.20240601_120000_000.errors.ndjson")),
        vec!["{\"body\":\"first\"}".to_string()]
    );
}

#[tokio::test]
async fn test_console_success_does_not_mask_full_disk() {
    let temp_dir = TempDir::new().unwrap();
    let rotation = Arc::new(RotationManager::new());
    let pipeline = Pipeline::new(JsonSerializer::new(false));
    let full_disk = FileSink::new(FileSinkKind::AllRecords, temp_dir.path(), 100, rotation)
        .with_disk_space_probe(Arc::new(FixedSpace(0)));
    pipeline.register(Arc::new(full_disk), Vec::new());
    pipeline.register(Arc::new(ConsoleSink::new().colored(false)), Vec::new());

    let report = pipeline
        .write_message(
            &ExportLogsServiceRequest::default().into(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(report.persisted, 0);
    assert!(report.all_failed());
    assert!(pipeline.health().is_degraded());
    assert!(
        pipeline
            .health()
            .last_error()
            .unwrap()
            .contains("Insufficient disk space")
    );
}

#[tokio::test]
async fn test_cancelled_file_write_is_reported_as_interrupted() {
    let temp_dir = TempDir::new().unwrap();
    let rotation = Arc::new(RotationManager::new());
    let pipeline = file_pipeline(temp_dir.path(), 100, &rotation);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = pipeline
        .write_message(&ExportLogsServiceRequest::default().into(), &cancel)
        .await
        .unwrap();

    assert_eq!(report.cancelled, 1);
    assert_eq!(report.persisted, 0);
    assert!(report.interrupted());
    assert!(!pipeline.health().is_degraded());
    assert!(normal_files(temp_dir.path(), Signal::Logs).await.is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn test_slow_disk_space_query_does_not_block_runtime() {
    let temp_dir = TempDir::new().unwrap();
    let rotation = Arc::new(RotationManager::new());
    let sink = FileSink::new(FileSinkKind::AllRecords, temp_dir.path(), 100, rotation)
        .with_disk_space_probe(Arc::new(SlowSpace(std::time::Duration::from_millis(500))));
    let started = tokio::time::Instant::now();

    let (write_done, ticker_done) = tokio::join!(
        async {
            sink.write(&record(Signal::Metrics, "slow", false), &CancellationToken::new())
                .await
                .unwrap();
            started.elapsed()
        },
        async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            started.elapsed()
        }
    );

    assert!(write_done >= std::time::Duration::from_millis(500));
    assert!(ticker_done < std::time::Duration::from_millis(400));
}
