//! Application configuration management.
//!
//! Configuration is stored at `~/.config/neighborly/config.json`; cached
//! entities, sync state and the session live under `~/.cache/neighborly`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::refresh::DEFAULT_BACKFILL_CONCURRENCY;
use crate::sync::SyncPolicy;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "neighborly";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding `api_base_url`
pub const API_URL_ENV: &str = "NEIGHBORLY_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_backfill_concurrency() -> usize {
    DEFAULT_BACKFILL_CONCURRENCY
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub sync: SyncPolicy,
    #[serde(default = "default_backfill_concurrency")]
    pub backfill_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            sync: SyncPolicy::default(),
            backfill_concurrency: DEFAULT_BACKFILL_CONCURRENCY,
        }
    }
}

impl Config {
    /// Load from the user config directory, falling back to defaults when
    /// no file exists yet. `NEIGHBORLY_API_URL` wins over the file.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_base_url = url;
            }
        }
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
