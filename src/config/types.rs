//! Configuration type definitions
//!
//! Defines all configuration structures for the OTLP NDJSON library.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::OtlpConfigError;

/// Largest accepted rotation threshold (10 GB)
pub const MAX_FILE_SIZE_MB_LIMIT: u64 = 10 * 1024;

/// Configuration for the inbound transports (OTLP/HTTP and OTLP/gRPC)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Whether the OTLP/HTTP receiver is enabled (default: true)
    #[serde(default = "default_http_enabled")]
    pub http_enabled: bool,

    /// Port for OTLP/HTTP (default: 4318, standard OTLP/HTTP port)
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Whether the OTLP/gRPC receiver is enabled (default: false)
    #[serde(default)]
    pub grpc_enabled: bool,

    /// Port for OTLP/gRPC (default: 4317, standard OTLP port)
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,

    /// Address both receivers bind to (default: 127.0.0.1)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Maximum accepted HTTP request body in bytes (default: 16 MiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            http_enabled: default_http_enabled(),
            http_port: default_http_port(),
            grpc_enabled: false,
            grpc_port: default_grpc_port(),
            bind_address: default_bind_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ProtocolConfig {
    /// Validate protocol configuration
    pub fn validate(&self) -> Result<(), OtlpConfigError> {
        if !self.http_enabled && !self.grpc_enabled {
            return Err(OtlpConfigError::ValidationFailed(
                "At least one protocol must be enabled".to_string(),
            ));
        }

        if self.http_port == 0 {
            return Err(OtlpConfigError::InvalidPort(
                "HTTP port must be between 1 and 65535".to_string(),
            ));
        }

        if self.grpc_port == 0 {
            return Err(OtlpConfigError::InvalidPort(
                "gRPC port must be between 1 and 65535".to_string(),
            ));
        }

        if self.http_enabled && self.grpc_enabled && self.http_port == self.grpc_port {
            return Err(OtlpConfigError::InvalidPort(
                "HTTP and gRPC ports must be different when both protocols are enabled"
                    .to_string(),
            ));
        }

        if self.bind_address.parse::<std::net::IpAddr>().is_err() {
            return Err(OtlpConfigError::ValidationFailed(format!(
                "Bind address is not an IP address: {}",
                self.bind_address
            )));
        }

        if self.max_body_bytes == 0 {
            return Err(OtlpConfigError::ValidationFailed(
                "Maximum body size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration for the live console sink
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsoleConfig {
    /// Print every received record to stdout (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Always color output; when false colors are disabled (default: true)
    #[serde(default = "default_console_colored")]
    pub colored: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            colored: default_console_colored(),
        }
    }
}

/// Main configuration structure for the OTLP NDJSON library
///
/// # Configuration Sources
///
/// Configuration can be loaded from:
/// - YAML files
/// - Environment variables (with `OTLP_*` prefix)
/// - Programmatic API (using `ConfigBuilder`)
///
/// # Default Values
///
/// - `output_dir`: `./telemetry`
/// - `max_file_size_mb`: `100`
/// - `pretty_json`: `false`
/// - `console`: disabled
/// - `protocols`: OTLP/HTTP on 127.0.0.1:4318, gRPC disabled
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = otlp_ndjson_library::ConfigBuilder::new()
///     .output_dir("./custom_output")
///     .max_file_size_mb(10)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Output directory for NDJSON files (default: ./telemetry)
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Size in MB after which a signal's file is rotated (default: 100)
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,

    /// Write indented JSON instead of one document per line (default: false)
    #[serde(default)]
    pub pretty_json: bool,

    /// Live console output
    #[serde(default)]
    pub console: ConsoleConfig,

    /// Inbound protocol configuration
    #[serde(default)]
    pub protocols: ProtocolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            max_file_size_mb: default_max_file_size_mb(),
            pretty_json: false,
            console: ConsoleConfig::default(),
            protocols: ProtocolConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), OtlpConfigError> {
        let path_str = self.output_dir.to_string_lossy();
        if path_str.is_empty() {
            return Err(OtlpConfigError::InvalidOutputDir(
                "Output directory cannot be empty".to_string(),
            ));
        }

        if path_str.len() > 4096 {
            return Err(OtlpConfigError::InvalidOutputDir(format!(
                "Output directory path is too long ({} characters, max 4096)",
                path_str.len()
            )));
        }

        if path_str.contains('\0') {
            return Err(OtlpConfigError::InvalidOutputDir(
                "Output directory path cannot contain null bytes".to_string(),
            ));
        }

        if self.max_file_size_mb == 0 {
            return Err(OtlpConfigError::InvalidFileSize(
                "Maximum file size must be greater than 0".to_string(),
            ));
        }

        if self.max_file_size_mb > MAX_FILE_SIZE_MB_LIMIT {
            return Err(OtlpConfigError::InvalidFileSize(format!(
                "Maximum file size must be at most {} MB",
                MAX_FILE_SIZE_MB_LIMIT
            )));
        }

        self.protocols.validate()?;

        Ok(())
    }
}

/// Builder for creating configurations programmatically
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Set rotation threshold in MB
    pub fn max_file_size_mb(mut self, size_mb: u64) -> Self {
        self.config.max_file_size_mb = size_mb;
        self
    }

    /// Enable or disable indented JSON
    pub fn pretty_json(mut self, pretty: bool) -> Self {
        self.config.pretty_json = pretty;
        self
    }

    /// Enable or disable the console sink
    pub fn console_enabled(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Set protocol configuration
    pub fn protocols(mut self, protocols: ProtocolConfig) -> Self {
        self.config.protocols = protocols;
        self
    }

    /// Enable or disable OTLP/HTTP
    pub fn http_enabled(mut self, enabled: bool) -> Self {
        self.config.protocols.http_enabled = enabled;
        self
    }

    /// Set OTLP/HTTP port
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.protocols.http_port = port;
        self
    }

    /// Enable or disable OTLP/gRPC
    pub fn grpc_enabled(mut self, enabled: bool) -> Self {
        self.config.protocols.grpc_enabled = enabled;
        self
    }

    /// Set OTLP/gRPC port
    pub fn grpc_port(mut self, port: u16) -> Self {
        self.config.protocols.grpc_port = port;
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<Config, OtlpConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// Default value functions
fn default_output_dir() -> PathBuf {
    PathBuf::from("./telemetry")
}

fn default_max_file_size_mb() -> u64 {
    100
}

fn default_console_colored() -> bool {
    true
}

fn default_http_enabled() -> bool {
    true
}

fn default_http_port() -> u16 {
    4318
}

fn default_grpc_port() -> u16 {
    4317
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}
