//! Logging setup
//!
//! The crate itself only emits `tracing` events. Applications that have no
//! subscriber of their own can call [`init`].

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Log verbosity, from silent to everything
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Off,
    Fatal,
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
    All,
}

impl LogLevel {
    /// Look up a level by name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        let level = match name.trim().to_ascii_uppercase().as_str() {
            "OFF" => Self::Off,
            "FATAL" => Self::Fatal,
            "ERROR" => Self::Error,
            "WARN" | "WARNING" => Self::Warn,
            "INFO" => Self::Info,
            "DEBUG" => Self::Debug,
            "TRACE" => Self::Trace,
            "ALL" => Self::All,
            _ => return None,
        };
        Some(level)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Fatal => "FATAL",
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Debug => "DEBUG",
            Self::Trace => "TRACE",
            Self::All => "ALL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| Error::invalid_value("log_level", format!("unknown level '{s}'")))
    }
}

// FATAL has no tracing counterpart; it shares ERROR.
impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Fatal | LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace | LogLevel::All => LevelFilter::TRACE,
        }
    }
}

/// Build the filter used by [`init`]
///
/// `RUST_LOG` directives are added on top of the default level.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::from(level).into())
        .from_env_lossy()
}

/// Install a global fmt subscriber
///
/// Fails if a global subscriber is already set.
pub fn init(level: LogLevel) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .try_init()
        .map_err(|e| Error::config(format!("Failed to install log subscriber: {e}")))
}
