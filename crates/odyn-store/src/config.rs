//! Configuration file.
//!
//! ```toml
//! [storage]
//! engine = "fs"
//! root = "/var/lib/odyn"
//!
//! [log]
//! file = "/var/log/odyn/server.log"
//! filter = "info"
//! ```
//!
//! Every key is optional; missing keys take their defaults. `file = "-"`
//! logs to stdout.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::{FsEngine, MemoryEngine, StorageEngine};

/// Environment variable overriding the log filter.
pub const LOG_ENV: &str = "ODYN_LOG";

const DEFAULT_ROOT: &str = "/var/lib/odyn";
const DEFAULT_LOG_FILE: &str = "/var/log/odyn/server.log";
const DEFAULT_FILTER: &str = "info";
const STDOUT_MARKER: &str = "-";

/// Error loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Which storage engine to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Fs,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub engine: EngineKind,
    /// Root directory; the fs engine owns `<root>/data`.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::Fs,
            root: PathBuf::from(DEFAULT_ROOT),
        }
    }
}

impl StorageConfig {
    pub fn build_engine(&self) -> Arc<dyn StorageEngine> {
        match self.engine {
            EngineKind::Fs => Arc::new(FsEngine::new(&self.root)),
            EngineKind::Memory => Arc::new(MemoryEngine::new()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// Log file; `None` or `-` logs to stdout.
    pub file: Option<PathBuf>,
    /// `EnvFilter` directive.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
            filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LogConfig {
    /// The file to log to, or `None` for stdout.
    pub fn log_file(&self) -> Option<&Path> {
        self.file
            .as_deref()
            .filter(|file| file.as_os_str() != STDOUT_MARKER)
    }

    /// The filter to use: `ODYN_LOG` if set, else the configured one.
    pub fn effective_filter(&self) -> String {
        std::env::var(LOG_ENV)
            .ok()
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| self.filter.clone())
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OdynConfig {
    pub storage: StorageConfig,
    pub log: LogConfig,
}

impl OdynConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
