//! Application Configuration Module
//!
//! Settings for the mentor host come from environment variables (and an
//! optional `.env` file). Command-line flags take precedence where both
//! exist.

use std::env;
use tracing::Level;

// --- Application Constants ---

/// Frames per buffer requested from the input device.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// Frames per buffer requested from the output device.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// Seconds of device-rate audio the output ring can hold.
pub const OUTPUT_BUFFER_SECONDS: usize = 10;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint_url: Option<String>,
    pub voice_name: Option<String>,
    pub context_source: Option<String>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `MENTOR_ENDPOINT_URL`: (Optional) WebSocket URL of the mentoring service. Required unless passed on the command line.
    // *   `MENTOR_VOICE`: (Optional) Voice id for the mentor. Defaults to "Puck".
    // *   `MENTOR_CONTEXT_SOURCE`: (Optional) Context source identifier. Defaults to "general".
    // *   `MENTOR_INPUT_DEVICE` / `MENTOR_OUTPUT_DEVICE`: (Optional) Device names. Defaults to the host defaults.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Blank values count as unset.
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            endpoint_url: var("MENTOR_ENDPOINT_URL"),
            voice_name: var("MENTOR_VOICE"),
            context_source: var("MENTOR_CONTEXT_SOURCE"),
            input_device: var("MENTOR_INPUT_DEVICE"),
            output_device: var("MENTOR_OUTPUT_DEVICE"),
            log_level,
        })
    }

    /// The endpoint from the command line, falling back to the environment.
    pub fn resolve_endpoint(&self, cli: Option<String>) -> Result<String, ConfigError> {
        cli.or_else(|| self.endpoint_url.clone()).ok_or_else(|| {
            ConfigError::MissingVar(
                "MENTOR_ENDPOINT_URL must be set when no endpoint is given".to_string(),
            )
        })
    }
}
