//! Configuration structures and loading logic.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::api::source::ClientOptions;
use crate::error::{Error, Result};
use crate::pipeline::PipelineOptions;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub account: AccountConfig,

    #[serde(default)]
    pub targets: TargetsConfig,

    #[serde(default)]
    pub options: OptionsConfig,

    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Session credentials lifted from a logged-in browser.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Full Cookie header value; must contain the ct0 CSRF cookie.
    #[serde(default)]
    pub cookie: String,

    /// Bearer token for the API.
    #[serde(default)]
    pub auth_token: String,
}

/// What to mirror.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetsConfig {
    /// Individual accounts, by handle.
    #[serde(default)]
    pub screen_names: Vec<String>,

    /// Explicit lists, by id.
    #[serde(default)]
    pub list_ids: Vec<u64>,

    /// Mirror everything these accounts follow.
    #[serde(default)]
    pub following_of: Vec<String>,
}

impl TargetsConfig {
    pub fn is_empty(&self) -> bool {
        self.screen_names.is_empty() && self.list_ids.is_empty() && self.following_of.is_empty()
    }
}

/// Mirror options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    /// Base directory for the mirror.
    #[serde(default)]
    pub download_directory: Option<PathBuf>,

    /// Concurrent download workers.
    #[serde(default = "default_download_workers")]
    pub max_download_workers: usize,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            download_directory: None,
            max_download_workers: default_download_workers(),
        }
    }
}

/// Network and rate-limit knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Retries for transient API request failures.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Fraction of each endpoint's quota held back as safety margin.
    #[serde(default = "default_reserve_fraction")]
    pub reserve_fraction: f64,

    /// Consecutive failed probes before an endpoint is treated as unlimited.
    #[serde(default = "default_probe_failure_limit")]
    pub probe_failure_limit: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            reserve_fraction: default_reserve_fraction(),
            probe_failure_limit: default_probe_failure_limit(),
        }
    }
}

fn default_download_workers() -> usize {
    8
}

fn default_retry_count() -> u32 {
    5
}

fn default_reserve_fraction() -> f64 {
    0.01
}

fn default_probe_failure_limit() -> u32 {
    5
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::Config(format!(
                    "Configuration file not found: {}. Create one from config.example.toml",
                    path.display()
                ))
            } else {
                Error::Io(e)
            }
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the effective mirror root directory.
    pub fn download_directory(&self) -> PathBuf {
        self.options
            .download_directory
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Where account directories live.
    pub fn users_directory(&self) -> PathBuf {
        self.download_directory().join("users")
    }

    /// Where list directories (of member symlinks) live.
    pub fn lists_directory(&self) -> PathBuf {
        self.download_directory().join("lists")
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            retry_count: self.limits.retry_count,
            reserve_fraction: self.limits.reserve_fraction,
            probe_failure_limit: self.limits.probe_failure_limit,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            max_download_workers: self.options.max_download_workers,
        }
    }
}
