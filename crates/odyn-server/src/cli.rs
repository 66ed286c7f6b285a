//! Command-line arguments.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use odyn_store::OdynConfig;
use odyn_telemetry::LogSettings;

#[derive(Parser, Debug)]
#[command(name = "odyn-server")]
#[command(about = "Prepare, inspect and query an Odyn resource store")]
pub struct Args {
    /// TOML config file (defaults apply when omitted)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override the storage root
    #[arg(long)]
    pub storage_root: Option<PathBuf>,

    /// Override the log file; `-` logs to stdout
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the storage layout (idempotent)
    Prep,

    /// Remove all stored resources
    Erase {
        /// Required: confirm the erase
        #[arg(long)]
        yes: bool,
    },

    /// Migrate storage between schema versions
    Migrate { from: String, to: String },

    /// Print a resource document
    Show {
        path: String,

        /// Print password values instead of masking them
        #[arg(long)]
        reveal: bool,
    },

    /// Delete a resource
    Delete { path: String },

    /// Evaluate a permission
    Check {
        /// Acting resource, e.g. `user/Leela`
        actor: String,

        /// Target resource, e.g. `device/Leela/Toaster`
        path: String,

        /// Right letter: g, s, m, c, d or G
        right: char,

        /// Dotted property path, e.g. `system.password`
        #[arg(short, long)]
        property: Option<String>,

        /// Application acting on the actor's behalf
        #[arg(long)]
        app: Option<String>,

        /// Evaluation time as YYYYMMDDHHMMSS (UTC); defaults to now
        #[arg(long)]
        at: Option<String>,
    },
}

impl Args {
    /// Load the config file (if any) and apply command-line overrides.
    pub fn resolve_config(&self) -> anyhow::Result<OdynConfig> {
        let mut config = match &self.config {
            Some(path) => OdynConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => OdynConfig::default(),
        };
        if let Some(root) = &self.storage_root {
            config.storage.root = root.clone();
        }
        if let Some(file) = &self.log_file {
            config.log.file = (file.as_os_str() != "-").then(|| file.clone());
        }
        Ok(config)
    }
}

/// Logging settings for a resolved config, honouring `ODYN_LOG`.
pub fn log_settings(config: &OdynConfig) -> LogSettings {
    LogSettings {
        file: config.log.log_file().map(Path::to_path_buf),
        filter: config.log.effective_filter(),
    }
}

// ============================================================================
// Tests
// ============================================================================
