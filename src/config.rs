//! Application configuration.
//!
//! Settings are layered from an optional TOML file and `BENCH_DAQ_*`
//! environment variables via the `config` crate. Every field has a default,
//! so a missing file yields a usable configuration for the common
//! 9600-baud, newline-terminated bench setup.
//!
//! ```toml
//! log_level = "info"
//!
//! [bus]
//! baud_rate = 9600
//! timeout = "1s"
//! handshake_timeout = "250ms"
//! read_terminator = "\n"
//! write_terminator = "\n"
//!
//! [storage]
//! default_path = "./measurements"
//! ```

use crate::error::AppResult;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Link parameters applied to every session the bus opens.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub baud_rate: u32,
    /// Default timeout for command round-trips.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Shorter timeout used for the `*IDN?` discovery handshake, so one dead
    /// address does not stall the whole enumeration pass.
    #[serde(with = "humantime_serde")]
    pub handshake_timeout: Duration,
    pub read_terminator: String,
    pub write_terminator: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_millis(250),
            read_terminator: "\n".to_string(),
            write_terminator: "\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory where report files are written.
    pub default_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            default_path: "./measurements".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bus: BusSettings,
    pub storage: StorageSettings,
    pub log_level: LogLevel,
}

/// Log verbosity, settable from the configuration file instead of a global.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl Settings {
    /// Load settings from `path` (if given) layered with environment
    /// variables, e.g. `BENCH_DAQ_BUS__BAUD_RATE=115200`.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix("BENCH_DAQ").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
