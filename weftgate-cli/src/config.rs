//! CLI configuration handling.
//!
//! Settings come from `config.toml` in the platform config directory, then
//! the `WEFTGATE_*` environment variables, then command-line flags, each
//! layer overriding the previous one.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use weftgate_core::ClientConfig;
use weftgate_core::config::{BASE_URL_ENV, TIMEOUT_ENV, parse_timeout, timeout_from_secs};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Base address of the portal API.
    pub api_url: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: Option<u64>,

    /// Keyring service the previous native client stored credentials under.
    pub legacy_keyring_service: Option<String>,

    /// Path of the previous client's session file.
    pub legacy_session_file: Option<PathBuf>,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl CliConfig {
    /// Resolve into a client configuration, applying environment overrides.
    pub fn client_config(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ClientConfig> {
        let api_url = lookup(BASE_URL_ENV)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.api_url.clone());

        let mut config = match api_url {
            Some(url) => ClientConfig::new(&url)?,
            None => ClientConfig::default(),
        };

        if let Some(raw) = lookup(TIMEOUT_ENV).filter(|v| !v.trim().is_empty()) {
            config.timeout = parse_timeout(&raw)?;
        } else if let Some(secs) = self.timeout_secs {
            config.timeout = timeout_from_secs(secs)
                .with_context(|| format!("timeout_secs in {:?}", self.config_path))?;
        }

        if let Some(service) = &self.legacy_keyring_service {
            config.legacy_keyring_service = service.clone();
        }

        Ok(config)
    }
}

/// Load configuration from the default location, or defaults if absent.
pub fn load_config() -> Result<CliConfig> {
    let config_path = project_dirs()
        .map(|d| d.config_dir().join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("weftgate.toml"));

    load_config_from(&config_path)
}

/// Load configuration from a specific file, or defaults if it doesn't exist.
pub fn load_config_from(config_path: &Path) -> Result<CliConfig> {
    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        CliConfig::default()
    };

    config.config_path = config_path.to_path_buf();
    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "weftgate", "weftgate")
}
