//! Typed configuration from environment variables or a TOML file.
//!
//! Every field has a default, so an empty environment yields a usable
//! config. In local dev, call `dotenvy::dotenv().ok()` before `from_env`.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue_name: String,
    pub unfinished_work_period_ms: u64,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_name: "workq".to_string(),
            unfinished_work_period_ms: 500,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults; a variable that is set but
    /// cannot be parsed is an error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            queue_name: std::env::var("WORKQ_QUEUE_NAME").unwrap_or(defaults.queue_name),
            unfinished_work_period_ms: parsed_var(
                "WORKQ_UNFINISHED_WORK_PERIOD_MS",
                defaults.unfinished_work_period_ms,
            )?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn unfinished_work_period(&self) -> Duration {
        Duration::from_millis(self.unfinished_work_period_ms)
    }
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid value for {name}: {raw:?} ({e})"))),
        Err(_) => Ok(default),
    }
}
