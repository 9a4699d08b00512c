//! OTLP/JSON serialization of decoded requests into NDJSON lines

use serde::Serialize;

use crate::error::OtlpPipelineError;
use crate::otlp::TelemetryMessage;

/// Serializes requests using the OTLP/JSON mapping of the protobuf types
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    /// Create a serializer; `pretty` switches to indented output
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Whether output is indented
    pub fn is_pretty(&self) -> bool {
        self.pretty
    }

    /// Serialize to a single JSON document without a line terminator
    pub fn serialize(&self, message: &TelemetryMessage) -> Result<String, OtlpPipelineError> {
        match message {
            TelemetryMessage::Traces(request) => self.to_json(request),
            TelemetryMessage::Logs(request) => self.to_json(request),
            TelemetryMessage::Metrics(request) => self.to_json(request),
        }
    }

    /// Serialize and append the `\n` terminator
    pub fn serialize_line(&self, message: &TelemetryMessage) -> Result<String, OtlpPipelineError> {
        let mut line = self.serialize(message)?;
        line.push('\n');
        Ok(line)
    }

    fn to_json<T: Serialize>(&self, value: &T) -> Result<String, OtlpPipelineError> {
        let result = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };

        result.map_err(|e| OtlpPipelineError::Serialization(e.to_string()))
    }
}
