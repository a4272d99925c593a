//! Configuration types and loading
//!
//! Precedence: CLI args > env vars > config file > defaults.
//! `CLUB_API_URL` overrides `api.base_url` so one config file can point at
//! staging or production.

use club_api::ClientOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend location
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Session persistence
#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    /// Session file. Without one the session lives only as long as the process.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_api_prefix() -> String {
    String::from("/api")
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(url) = std::env::var("CLUB_API_URL") {
            config.api.base_url = url;
        }

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if !config.api.api_prefix.starts_with('/') {
            return Err(common::Error::Config(format!(
                "api_prefix must start with '/', got: {}",
                config.api.api_prefix
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CLUB_CONFIG env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CLUB_CONFIG") {
            return PathBuf::from(p);
        }
        PathBuf::from("clubctl.toml")
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::new(self.api.base_url.clone())
            .with_api_prefix(self.api.api_prefix.clone())
            .with_timeout(Duration::from_secs(self.api.timeout_secs))
    }
}
