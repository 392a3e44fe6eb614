//! Typed configuration.
//!
//! Process settings come from environment variables and load once at
//! startup. Pipeline tuning lives in an optional TOML file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default in-flight render ceiling.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 3;

/// Image value a renderer reports when an attempt failed.
pub const DEFAULT_FAILURE_MARKER: &str = "data:,";

/// Default number of engine events retained in memory.
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

#[derive(Debug)]
pub struct Config {
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub pipeline_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            pipeline_path: optional_var("MASSMINT_PIPELINE").map(PathBuf::from),
        })
    }

    /// Pipeline settings from `MASSMINT_PIPELINE`, or defaults when unset.
    pub fn pipeline(&self) -> Result<PipelineConfig> {
        match &self.pipeline_path {
            Some(path) => PipelineConfig::load(path),
            None => Ok(PipelineConfig::default()),
        }
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Tuning for the render pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Maximum number of items rendering at once.
    pub max_in_flight: usize,
    /// Regenerations allowed per item before it is marked failed.
    /// `None` retries forever.
    pub max_regenerations: Option<u32>,
    /// Content type tag passed to metadata assembly.
    pub content_type: String,
    /// Image value that marks a failed render.
    pub failure_marker: String,
    /// Engine events kept in memory; older ones are dropped.
    pub event_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            max_regenerations: None,
            content_type: "text/html".to_string(),
            failure_marker: DEFAULT_FAILURE_MARKER.to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML pipeline file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read pipeline config {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            Error::Config(format!("bad pipeline config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate pipeline settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(Error::Config("max_in_flight must be at least 1".to_string()));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        if self.failure_marker.is_empty() {
            return Err(Error::Config("failure_marker must not be empty".to_string()));
        }
        Ok(())
    }
}
