//! Configuration loading and resolution
//!
//! Every setting resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const ENV_BASE_URL: &str = "LCF_BASE_URL";
pub const ENV_ACCESS_TOKEN: &str = "LCF_ACCESS_TOKEN";
pub const ENV_POLL_INTERVAL_SECS: &str = "LCF_POLL_INTERVAL_SECS";
pub const ENV_PAGE_SIZE: &str = "LCF_PAGE_SIZE";

/// Compiled defaults
pub mod defaults {
    pub const BASE_URL: &str = "http://127.0.0.1:8080";
    pub const POLL_INTERVAL_SECS: u64 = 10;
    pub const PAGE_SIZE: u32 = 50;
    pub const RECONNECT_DELAY_MS: u64 = 5000;
    pub const NEW_FLAG_MS: u64 = 3000;
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const EVENT_CAPACITY: usize = 1000;
    pub const LOG_LEVEL: &str = "info";
}

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    defaults::LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// On-disk TOML configuration; every key is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub page_size: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
    pub new_flag_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub event_capacity: Option<usize>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub poll_interval_secs: Option<u64>,
    pub page_size: Option<u32>,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    pub poll_interval: Duration,
    pub page_size: u32,
    pub reconnect_delay: Duration,
    pub new_flag_duration: Duration,
    pub request_timeout: Duration,
    pub event_capacity: usize,
    pub log_level: String,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            access_token: None,
            poll_interval: Duration::from_secs(defaults::POLL_INTERVAL_SECS),
            page_size: defaults::PAGE_SIZE,
            reconnect_delay: Duration::from_millis(defaults::RECONNECT_DELAY_MS),
            new_flag_duration: Duration::from_millis(defaults::NEW_FLAG_MS),
            request_timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
            event_capacity: defaults::EVENT_CAPACITY,
            log_level: defaults::LOG_LEVEL.to_string(),
        }
    }
}

impl FeedConfig {
    /// Resolve configuration from CLI, environment, TOML file and defaults
    ///
    /// `toml_path` overrides the platform config location. A missing file is
    /// not an error; a malformed one is.
    pub fn resolve(cli: &CliOverrides, toml_path: Option<&Path>) -> Result<Self> {
        let toml_config = match toml_path {
            Some(path) => load_toml_config(path)?,
            None => match default_config_path() {
                Some(path) => load_toml_config(&path)?,
                None => None,
            },
        }
        .unwrap_or_default();

        Self::from_sources(cli, &toml_config)
    }

    /// Merge already-loaded sources (CLI → ENV → TOML → default)
    pub fn from_sources(cli: &CliOverrides, toml_config: &TomlConfig) -> Result<Self> {
        let base = FeedConfig::default();

        let base_url = cli
            .base_url
            .clone()
            .or_else(|| env_string(ENV_BASE_URL))
            .or_else(|| toml_config.base_url.clone())
            .unwrap_or(base.base_url);

        let access_token = cli
            .access_token
            .clone()
            .or_else(|| env_string(ENV_ACCESS_TOKEN))
            .or_else(|| toml_config.access_token.clone())
            .filter(|token| !token.trim().is_empty());

        let poll_interval_secs = match cli.poll_interval_secs {
            Some(secs) => Some(secs),
            None => env_parsed::<u64>(ENV_POLL_INTERVAL_SECS)?,
        }
        .or(toml_config.poll_interval_secs);

        let page_size = match cli.page_size {
            Some(size) => Some(size),
            None => env_parsed::<u32>(ENV_PAGE_SIZE)?,
        }
        .or(toml_config.page_size)
        .unwrap_or(base.page_size);

        let config = FeedConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            poll_interval: poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(base.poll_interval),
            page_size,
            reconnect_delay: toml_config
                .reconnect_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(base.reconnect_delay),
            new_flag_duration: toml_config
                .new_flag_ms
                .map(Duration::from_millis)
                .unwrap_or(base.new_flag_duration),
            request_timeout: toml_config
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(base.request_timeout),
            event_capacity: toml_config.event_capacity.unwrap_or(base.event_capacity),
            log_level: toml_config.logging.level.clone(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("base_url must not be empty".to_string()));
        }
        if self.page_size == 0 {
            return Err(Error::Config("page_size must be at least 1".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Platform config file location (`<config_dir>/lcf/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lcf").join("config.toml"))
}

/// Load a TOML config file
///
/// Returns `Ok(None)` when the file does not exist so callers fall back to
/// defaults.
pub fn load_toml_config(path: &Path) -> Result<Option<TomlConfig>> {
    if !path.exists() {
        warn!("Config file not found at {}, using defaults", path.display());
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str::<TomlConfig>(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    debug!("Loaded config file {}", path.display());
    Ok(Some(config))
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Result<Option<T>> {
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value '{}'", name, raw))),
        None => Ok(None),
    }
}
