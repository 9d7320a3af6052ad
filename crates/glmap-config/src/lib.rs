//! Configuration management for glmap
//!
//! This module handles loading, validation, and management of
//! glmap configuration from YAML files.

pub mod error;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use error::ConfigError;
use error::ConfigResult;

/// Largest supported number of decimal places for rounding
pub const MAX_DECIMAL_PLACES: u32 = 10;

// ==================== Configuration Types ====================

/// Rounding precision for allocation output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundingConfig {
    /// Decimal places for allocated amounts (2 = cents)
    #[serde(default = "default_decimal_places")]
    pub amount_decimal_places: u32,
    /// Decimal places for percentage shares
    #[serde(default = "default_decimal_places")]
    pub percent_decimal_places: u32,
}

impl Default for RoundingConfig {
    fn default() -> Self {
        Self {
            amount_decimal_places: default_decimal_places(),
            percent_decimal_places: default_decimal_places(),
        }
    }
}

fn default_decimal_places() -> u32 {
    2
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Output formatting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Pretty-print JSON responses
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { pretty: true }
    }
}

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Rounding settings
    #[serde(default)]
    pub rounding: RoundingConfig,
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            },
            _ => ConfigError::IoError,
        })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        let config: Config = serde_yaml::from_str(content).map_err(|e| ConfigError::InvalidYaml {
            message: e.to_string(),
        })?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.rounding.amount_decimal_places > MAX_DECIMAL_PLACES {
            return Err(ConfigError::InvalidValue {
                field: "rounding.amount_decimal_places".to_string(),
                reason: format!("Decimal places must be between 0 and {}", MAX_DECIMAL_PLACES),
            });
        }

        if self.rounding.percent_decimal_places > MAX_DECIMAL_PLACES {
            return Err(ConfigError::InvalidValue {
                field: "rounding.percent_decimal_places".to_string(),
                reason: format!("Decimal places must be between 0 and {}", MAX_DECIMAL_PLACES),
            });
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" | "off" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "logging.level".to_string(),
                    reason: format!("Unknown log level: {}", other),
                })
            }
        }

        Ok(())
    }

    /// Generate a default configuration file
    pub fn generate_default() -> &'static str {
        include_str!("../templates/default_config.yaml")
    }

    /// Default location of the configuration file
    pub fn default_path() -> PathBuf {
        PathBuf::from("glmap.yaml")
    }
}
