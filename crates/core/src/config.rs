//! Application configuration loaded from `settings.toml` and `SRTGO_*` variables.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::store::FileBackend;

/// Directory under the user's config dir holding every SRTGo file.
pub const APP_DIR: &str = "srtgo";
/// Configuration file name inside [`APP_DIR`].
pub const CONFIG_FILE: &str = "settings.toml";

const DEFAULT_CONFIG: &str = r#"# SRTGo settings

# Set to true to rehearse sessions against the simulated carrier client.
dry_run = false

[store]
# "auto" probes the OS keychain and falls back to the JSON file below.
# "file" always uses the JSON file.
backend = "auto"
# path = "/home/me/.config/srtgo/config.json"

[session]
# Delay between search attempts, in milliseconds.
poll_interval_ms = 1000
# Upper bound for the delay after repeated carrier errors.
max_backoff_ms = 30000
# Give up after this many search attempts. Unlimited when unset.
# max_attempts = 500
"#;

/// Where credentials and settings are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Probe the OS keychain, fall back to the JSON file.
    #[default]
    Auto,
    /// Always use the JSON file.
    File,
}

/// Credential store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend selection policy.
    #[serde(default)]
    pub backend: BackendPreference,
    /// Location of the JSON fallback file.
    #[serde(default = "FileBackend::default_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::default(),
            path: FileBackend::default_path(),
        }
    }
}

/// Reservation loop cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Delay between search attempts, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Cap for the backoff delay after consecutive carrier errors, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Optional bound on search attempts.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl SessionConfig {
    /// Delay between search attempts.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Backoff cap.
    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.poll_interval_ms))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: None,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Rehearse sessions against the simulated carrier client.
    #[serde(default)]
    pub dry_run: bool,
    /// Credential store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Reservation loop cadence.
    #[serde(default)]
    pub session: SessionConfig,
}

impl AppConfig {
    /// Load the configuration from the default location plus environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Load the configuration from `path` plus environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("SRTGO")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("failed to read configuration {}", path.display()))?;
        settings
            .try_deserialize()
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }
}

/// Directory holding the configuration, the fallback store and logs.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Default configuration file location.
pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Write a commented default configuration file when none exists.
pub fn ensure_default_config() -> Result<()> {
    write_default_config(config_path())
}

fn write_default_config(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))
}
