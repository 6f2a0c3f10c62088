//! Paging configuration
//!
//! Settings shared by [`BufferedCursor`](crate::pagination::BufferedCursor)
//! and [`BackpressureStream`](crate::pagination::BackpressureStream). They
//! can be built in code or loaded from YAML/JSON.
//!
//! ```yaml
//! release_on_exhaustion: true
//! batch_size: 250
//! log_items: false
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default advisory page size
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Configuration for cursors and streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Call `close_cursor` as soon as the result has been fully drained
    pub release_on_exhaustion: bool,
    /// Advisory number of items per page, for fetcher implementations
    pub batch_size: u32,
    /// Emit a trace event for every item handed to the caller
    pub log_items: bool,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            release_on_exhaustion: true,
            batch_size: DEFAULT_BATCH_SIZE,
            log_items: false,
        }
    }
}

impl PagingConfig {
    /// Create a new config builder
    pub fn builder() -> PagingConfigBuilder {
        PagingConfigBuilder::default()
    }

    /// Load from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config {
            message: format!("Failed to parse JSON: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` files are read as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("Failed to read config file '{}': {e}", path.display()),
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            _ => Self::from_yaml_str(&contents),
        }
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::invalid_value("batch_size", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for [`PagingConfig`]
#[derive(Default)]
pub struct PagingConfigBuilder {
    config: PagingConfig,
}

impl PagingConfigBuilder {
    /// Release the server cursor on exhaustion
    pub fn release_on_exhaustion(mut self, release: bool) -> Self {
        self.config.release_on_exhaustion = release;
        self
    }

    /// Set the advisory page size
    pub fn batch_size(mut self, size: u32) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Trace every surfaced item
    pub fn log_items(mut self, enabled: bool) -> Self {
        self.config.log_items = enabled;
        self
    }

    /// Build the config
    pub fn build(self) -> PagingConfig {
        self.config
    }
}
