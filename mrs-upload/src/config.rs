//! Client settings resolution for mrs-upload
//!
//! Combines command-line overrides with the bootstrap TOML file.
//!
//! **Priority:** CLI → ENV → TOML → compiled default

use mrs_common::config::{resolve_server_url, MergePolicy, TomlConfig, DEFAULT_DATATYPE};
use mrs_common::{Error, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Values supplied on the command line (already merged with their `env`
/// fallbacks by clap)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub server_url: Option<String>,
    pub datatype: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub merge_policy: Option<MergePolicy>,
}

/// Effective settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub datatype: String,
    pub request_timeout: Duration,
    pub merge_policy: MergePolicy,
}

impl ClientSettings {
    /// Resolve effective settings
    ///
    /// # Errors
    /// `Config` if the server URL is not http(s) or the timeout is zero.
    pub fn resolve(cli: &CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let server_url = resolve_server_url(cli.server_url.as_deref(), toml_config);
        if !(server_url.starts_with("http://") || server_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "Server URL must start with http:// or https:// (got '{}')",
                server_url
            )));
        }

        let datatype = match cli.datatype.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d.to_string(),
            _ => {
                let configured = toml_config.datatype.trim();
                if configured.is_empty() {
                    warn!("Blank datatype in config, using {}", DEFAULT_DATATYPE);
                    DEFAULT_DATATYPE.to_string()
                } else {
                    configured.to_string()
                }
            }
        };

        let timeout_secs = cli
            .request_timeout_secs
            .unwrap_or(toml_config.request_timeout_secs);
        if timeout_secs == 0 {
            return Err(Error::Config(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }

        let merge_policy = cli.merge_policy.unwrap_or(toml_config.merge_policy);

        let settings = Self {
            server_url,
            datatype,
            request_timeout: Duration::from_secs(timeout_secs),
            merge_policy,
        };
        debug!(?settings, "Resolved client settings");
        Ok(settings)
    }
}
