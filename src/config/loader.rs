//! Configuration loader
//!
//! Loads configuration from YAML files, environment variables, or programmatic API.
//! Priority: environment variables > provided config > defaults

use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::types::Config;
use crate::error::OtlpConfigError;
use tracing::{debug, info, warn};

/// Environment variable naming an optional YAML configuration file
pub const CONFIG_FILE_ENV: &str = "OTLP_CONFIG_FILE";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from YAML file
    pub fn from_yaml(path: impl AsRef<std::path::Path>) -> Result<Config, OtlpConfigError> {
        let path = path.as_ref();
        info!(
            config_path = %path.display(),
            "Loading configuration from YAML file"
        );

        let content = std::fs::read_to_string(path).map_err(|e| {
            warn!(
                config_path = %path.display(),
                error = %e,
                "Failed to read configuration file"
            );
            OtlpConfigError::ReadFailed(format!("{}: {}", path.display(), e))
        })?;

        let mut config: Config = serde_yaml::from_str(&content).map_err(|e| {
            warn!(
                config_path = %path.display(),
                error = %e,
                "Failed to parse YAML configuration"
            );
            OtlpConfigError::ValidationFailed(format!("Failed to parse YAML: {}", e))
        })?;

        debug!(
            config_path = %path.display(),
            "Parsed YAML configuration successfully"
        );

        Self::apply_env_overrides(&mut config);
        Self::validated(config)
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Config, OtlpConfigError> {
        info!("Loading configuration from environment variables");

        let mut config = Config::default();
        Self::apply_env_overrides(&mut config);
        Self::validated(config)
    }

    /// Load configuration with priority: environment variables > provided config > defaults
    ///
    /// Without a provided config, the YAML file named by `OTLP_CONFIG_FILE`
    /// is used when set.
    pub fn load(provided: Option<Config>) -> Result<Config, OtlpConfigError> {
        match provided {
            Some(mut config) => {
                info!("Loading configuration with provided config and environment variable overrides");
                Self::apply_env_overrides(&mut config);
                Self::validated(config)
            }
            None => match env::var(CONFIG_FILE_ENV) {
                Ok(path) if !path.is_empty() => Self::from_yaml(path),
                _ => Self::from_env(),
            },
        }
    }

    fn validated(config: Config) -> Result<Config, OtlpConfigError> {
        config.validate().map_err(|e| {
            warn!(error = %e, "Configuration validation failed");
            e
        })?;

        info!(
            output_dir = %config.output_dir.display(),
            max_file_size_mb = config.max_file_size_mb,
            http_enabled = config.protocols.http_enabled,
            grpc_enabled = config.protocols.grpc_enabled,
            console_enabled = config.console.enabled,
            "Configuration loaded and validated successfully"
        );

        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(config: &mut Config) {
        if let Ok(dir) = env::var("OTLP_OUTPUT_DIR") {
            debug!(
                env_var = "OTLP_OUTPUT_DIR",
                value = %dir,
                "Applying environment variable override"
            );
            config.output_dir = PathBuf::from(dir);
        }

        if let Some(size) = parse_env::<u64>("OTLP_MAX_FILE_SIZE_MB") {
            config.max_file_size_mb = size;
        }

        if let Some(pretty) = parse_env::<bool>("OTLP_PRETTY_JSON") {
            config.pretty_json = pretty;
        }

        if let Some(enabled) = parse_env::<bool>("OTLP_CONSOLE_ENABLED") {
            config.console.enabled = enabled;
        }

        if let Some(colored) = parse_env::<bool>("OTLP_CONSOLE_COLORED") {
            config.console.colored = colored;
        }

        if let Some(enabled) = parse_env::<bool>("OTLP_HTTP_ENABLED") {
            config.protocols.http_enabled = enabled;
        }

        if let Some(port) = parse_env::<u16>("OTLP_HTTP_PORT") {
            config.protocols.http_port = port;
        }

        if let Some(enabled) = parse_env::<bool>("OTLP_GRPC_ENABLED") {
            config.protocols.grpc_enabled = enabled;
        }

        if let Some(port) = parse_env::<u16>("OTLP_GRPC_PORT") {
            config.protocols.grpc_port = port;
        }

        if let Ok(address) = env::var("OTLP_BIND_ADDRESS") {
            debug!(
                env_var = "OTLP_BIND_ADDRESS",
                value = %address,
                "Applying environment variable override"
            );
            config.protocols.bind_address = address;
        }
    }
}

fn parse_env<T>(name: &'static str) -> Option<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    let raw = env::var(name).ok()?;
    match raw.parse::<T>() {
        Ok(value) => {
            debug!(
                env_var = name,
                value = %value,
                "Applying environment variable override"
            );
            Some(value)
        }
        Err(e) => {
            warn!(
                env_var = name,
                value = %raw,
                error = %e,
                "Failed to parse environment variable, ignoring"
            );
            None
        }
    }
}
