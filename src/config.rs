//! Core configuration.
//!
//! Everything the core needs at startup: transport buffer sizing, which
//! built-in descriptions start enabled, any description files to load,
//! and an optional initial byte source. All fields default sensibly so
//! `CoreConfig::default()` starts a fully idle core.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::source::SourceConfig;
use crate::transport::{DEFAULT_CAPACITY, READ_CHUNK};
use crate::{CoreError, Result};

/// Transport-buffer sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Ring capacity in bytes.
    pub capacity: usize,
    /// Chunk size for source reads.
    pub read_chunk: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_CAPACITY, read_chunk: READ_CHUNK }
    }
}

/// Startup configuration for the telemetry core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Transport buffer sizing.
    pub transport: TransportConfig,
    /// Built-in descriptions enabled at startup, by name.
    pub builtins: Vec<String>,
    /// Description files loaded at startup.
    pub dbc_files: Vec<PathBuf>,
    /// Byte source activated at startup, if any.
    pub source: Option<SourceConfig>,
}

impl CoreConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml_ng::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| CoreError::file_error(path.to_path_buf(), err))?;
        Self::from_yaml(&text)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.transport.capacity == 0 {
            return Err(CoreError::config_error("transport capacity must be non-zero"));
        }
        if self.transport.read_chunk == 0 {
            return Err(CoreError::config_error("transport read_chunk must be non-zero"));
        }
        Ok(())
    }
}
