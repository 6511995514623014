//! YAML configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.restock/
//!   config.yaml      (optional: defaults apply when absent)
//!   state/           (default snapshot directory, see `restock-sync`)
//! ```
//!
//! # API pattern
//!
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::DeletionPolicy;
use crate::MAX_BATCH_SIZE;

pub const CONFIG_FILE: &str = "config.yaml";

pub const ENV_TARGET_URL: &str = "RESTOCK_TARGET_URL";
pub const ENV_INVENTORY: &str = "RESTOCK_INVENTORY";
pub const ENV_LOG: &str = "RESTOCK_LOG";

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Snapshot directory. Defaults to `~/.restock/state`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub source: SourceSettings,
    #[serde(default)]
    pub target: TargetSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Backoff schedule for transient target failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts per batch, first call included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSettings {
    /// JSON inventory export read by the file source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inventory_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_secs() -> u64 {
    1
}

fn default_max_delay_secs() -> u64 {
    8
}

fn default_token_env() -> String {
    "RESTOCK_TARGET_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: None,
            deletion_policy: DeletionPolicy::default(),
            batch_size: default_batch_size(),
            retry: RetrySettings::default(),
            source: SourceSettings::default(),
            target: TargetSettings::default(),
            log_level: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// `<home>/.restock/`
pub fn restock_root(home: &Path) -> PathBuf {
    home.join(".restock")
}

/// `<home>/.restock/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    restock_root(home).join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load `<home>/.restock/config.yaml`, falling back to defaults when absent.
///
/// The parsed document is validated before it is returned.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

/// Load a config document from an explicit path. A missing file yields defaults.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(source) => {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Reject values the engine cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_secs > self.retry.max_delay_secs {
            return Err(ConfigError::Invalid(format!(
                "retry.base_delay_secs ({}) exceeds retry.max_delay_secs ({})",
                self.retry.base_delay_secs, self.retry.max_delay_secs
            )));
        }
        Ok(())
    }

    /// Resolved snapshot directory.
    pub fn state_dir_at(&self, home: &Path) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| restock_root(home).join("state"))
    }

    /// Apply `RESTOCK_*` overrides. `lookup` is `std::env::var(..).ok()` in
    /// production and a map in tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_TARGET_URL).filter(|v| !v.is_empty()) {
            self.target.base_url = Some(url);
        }
        if let Some(path) = lookup(ENV_INVENTORY).filter(|v| !v.is_empty()) {
            self.source.inventory_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.is_empty()) {
            self.log_level = Some(level);
        }
    }
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
