//! Live console sink for tailing received telemetry
//!
//! Prints `[{local timestamp}] [{signal}] {json}` per record, colored by
//! signal, or red for errors. Output failures are ignored.

use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::Local;
use futures::future::BoxFuture;
use futures::FutureExt;
use termcolor::{Buffer, BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};
use tokio_util::sync::CancellationToken;

use crate::error::OtlpSinkError;
use crate::otlp::{Signal, TelemetryRecord, TelemetrySink};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Writes records to `stdout`
pub struct ConsoleSink {
    writer: Arc<Mutex<BufferWriter>>,
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink").finish_non_exhaustive()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    /// Console sink using colors when the terminal supports them
    pub fn new() -> Self {
        ConsoleSink {
            writer: Arc::new(Mutex::new(BufferWriter::stdout(ColorChoice::Auto))),
        }
    }

    /// Force colors on or off
    pub fn colored(self, colored: bool) -> Self {
        let choice = if colored {
            ColorChoice::Always
        } else {
            ColorChoice::Never
        };

        ConsoleSink {
            writer: Arc::new(Mutex::new(BufferWriter::stdout(choice))),
        }
    }

    /// Render one record without color, as printed between the color codes
    pub fn format_line(record: &TelemetryRecord) -> String {
        format!(
            "[{}] [{}] {}",
            record
                .timestamp()
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT),
            record.signal(),
            record.serialized_line().trim_end_matches(['\r', '\n'])
        )
    }

    /// Color used for a record
    pub fn color_for(record: &TelemetryRecord) -> Color {
        if record.is_error() {
            return Color::Red;
        }

        match record.signal() {
            Signal::Traces => Color::Cyan,
            Signal::Logs => Color::Green,
            Signal::Metrics => Color::Yellow,
            Signal::Unspecified => Color::White,
        }
    }

    async fn print(&self, record: &TelemetryRecord) {
        let line = Self::format_line(record);
        let color = Self::color_for(record);
        let writer = self.writer.clone();

        // A blocked stdout pipe must not stall a runtime worker
        let _ = tokio::task::spawn_blocking(move || {
            // One writer at a time so lines never interleave
            let Ok(writer) = writer.lock() else {
                return;
            };

            let mut buf = writer.buffer();
            write_fg(&mut buf, line, color);
            let _ = writeln!(buf);
            let _ = writer.print(&buf);
        })
        .await;
    }
}

impl TelemetrySink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn write<'a>(
        &'a self,
        record: &'a TelemetryRecord,
        _cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), OtlpSinkError>> {
        async move {
            self.print(record).await;
            Ok(())
        }
        .boxed()
    }
}

fn write_fg(buf: &mut Buffer, v: impl std::fmt::Display, color: Color) {
    let _ = buf.set_color(ColorSpec::new().set_fg(Some(color)));
    let _ = write!(buf, "{}", v);
    let _ = buf.reset();
}
