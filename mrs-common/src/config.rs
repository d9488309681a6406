//! Bootstrap configuration loading and server URL resolution
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--config`, `--server`)
//! 2. Environment variables (`MRS_CONFIG`, `MRS_SERVER_URL`)
//! 3. TOML configuration file (`<config_dir>/mrs/mrs-upload.toml`)
//! 4. Built-in defaults (code constants)
//!
//! A missing or unreadable TOML file never aborts startup: a warning is
//! logged and the compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default processing server (Flask development port)
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";

/// Acquisition type sent when nothing else is configured
pub const DEFAULT_DATATYPE: &str = "MEGA-PRESS";

/// Processing runs LCModel fits server-side and can take minutes
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "MRS_CONFIG";

/// Environment variable overriding the server base URL
pub const SERVER_URL_ENV_VAR: &str = "MRS_SERVER_URL";

/// What a merge does when a group label already names a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Last merge wins: the existing batch contents are replaced
    #[default]
    Replace,
    /// New files are appended to the existing batch
    Append,
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Base URL of the processing/classifier service
    ///
    /// If not specified, falls back to environment → compiled default
    #[serde(default)]
    pub server_url: Option<String>,

    /// Acquisition type sent in the `datatype` form field
    #[serde(default = "default_datatype")]
    pub datatype: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Same-label merge behavior
    #[serde(default)]
    pub merge_policy: MergePolicy,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_datatype() -> String {
    DEFAULT_DATATYPE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            datatype: default_datatype(),
            request_timeout_secs: default_request_timeout_secs(),
            merge_policy: MergePolicy::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Platform config file location (`~/.config/mrs/mrs-upload.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mrs").join("mrs-upload.toml"))
}

/// Locate the TOML config file
///
/// CLI path and `MRS_CONFIG` are returned even if the file is missing so the
/// caller can report it; the platform default is only returned if it exists.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    default_config_path().filter(|p| p.exists())
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {} ({})", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Load the config file if one can be found, otherwise compiled defaults
pub fn load_or_default(cli_arg: Option<&Path>) -> TomlConfig {
    let Some(path) = locate_config_file(cli_arg) else {
        debug!("No config file found, using compiled defaults");
        return TomlConfig::default();
    };

    match load_toml_config(&path) {
        Ok(config) => {
            info!(path = %path.display(), "Loaded configuration");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file unusable, using compiled defaults");
            TomlConfig::default()
        }
    }
}

/// Write config to disk, creating the parent directory
///
/// Writes to a temporary sibling first, then renames over the target.
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Resolve the server base URL: CLI → ENV → TOML → compiled default
///
/// Blank values are skipped and a trailing `/` is removed so endpoint paths
/// can be appended directly.
pub fn resolve_server_url(cli_arg: Option<&str>, config: &TomlConfig) -> String {
    let non_blank = |s: &str| {
        let trimmed = s.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    let url = cli_arg
        .and_then(non_blank)
        .or_else(|| std::env::var(SERVER_URL_ENV_VAR).ok().and_then(|v| non_blank(&v)))
        .or_else(|| config.server_url.as_deref().and_then(non_blank))
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

    url.trim_end_matches('/').to_string()
}
