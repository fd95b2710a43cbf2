//! Bootstrap configuration loading
//!
//! Services read a single TOML file at startup. Lookup order:
//! 1. Explicit path (command-line argument or environment variable)
//! 2. User config: `~/.config/physiovision/<module>.toml`
//! 3. System config: `/etc/physiovision/<module>.toml`
//! 4. Compiled defaults
//!
//! A missing file never prevents startup: a warning is logged and defaults are used.
//! A file that exists but cannot be parsed is an error.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Directory name used under the platform config directories
pub const CONFIG_DIR_NAME: &str = "physiovision";

/// Logging section shared by every service config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Service log level when `RUST_LOG` is not set (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "debug".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    /// Reject levels `tracing_subscriber::EnvFilter` would not understand as a bare level
    pub fn validate(&self) -> Result<()> {
        match self.level.to_ascii_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(Error::Config(format!("Unknown log level: {}", other))),
        }
    }
}

/// Candidate config file locations for a module, highest priority first
///
/// Does not include the explicit path; see [`resolve_config_path`].
pub fn config_file_candidates(module_name: &str) -> Vec<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let mut candidates = Vec::new();

    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(CONFIG_DIR_NAME).join(&file_name));
    }
    if cfg!(unix) {
        candidates.push(PathBuf::from("/etc").join(CONFIG_DIR_NAME).join(&file_name));
    }

    candidates
}

/// Resolve which config file to load
///
/// An explicit path is returned as-is even if it does not exist, so the
/// loader can warn about it. Otherwise the first existing candidate wins.
pub fn resolve_config_path(explicit: Option<&Path>, module_name: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    config_file_candidates(module_name)
        .into_iter()
        .find(|path| path.exists())
}

/// Load a TOML config file, falling back to `T::default()` when absent
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_toml_or_default<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        warn!("No configuration file found, using compiled defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Configuration file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}
