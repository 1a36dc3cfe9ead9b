//! Application configuration
//!
//! Loads the three named settings from the process environment, optionally
//! via a `.env` file as a convenience (`dotenvy`, mirroring the original
//! Python tool's `python-dotenv`).

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid log level {0:?}, expected DEBUG, INFO, WARNING, or ERROR")]
    InvalidLogLevel(String),
}

/// Complete application settings, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Connection string for the reference database. Required.
    pub reference_dsn: String,
    /// Connection string for the target database. Required.
    pub target_dsn: String,
    /// One of DEBUG|INFO|WARNING|ERROR, default INFO, case-insensitive.
    pub log_level: Level,
}

impl Settings {
    /// Load settings from environment variables, loading a `.env` file
    /// first if one exists. Errors loading the `.env` file itself are
    /// ignored: a missing file is the common case, not a failure.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let reference_dsn = require_var("TEST_DB_DSN")?;
        let target_dsn = require_var("PROD_DB_DSN")?;
        let log_level = std::env::var("LOG_LEVEL")
            .ok()
            .map(|raw| parse_log_level(&raw))
            .transpose()?
            .unwrap_or(Level::INFO);

        Ok(Self {
            reference_dsn,
            target_dsn,
            log_level,
        })
    }
}

fn require_var(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn parse_log_level(raw: &str) -> Result<Level, ConfigError> {
    match raw.to_ascii_uppercase().as_str() {
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        // tracing has no WARNING variant; WARNING maps onto WARN.
        "WARNING" => Ok(Level::WARN),
        "ERROR" => Ok(Level::ERROR),
        other => Level::from_str(other).map_err(|_| ConfigError::InvalidLogLevel(raw.to_string())),
    }
}
