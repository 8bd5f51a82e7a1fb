//! Layered settings for the agent.
//!
//! Sources, later ones win:
//! - Default values
//! - TOML settings file (`fsreact.toml` or an explicit path)
//! - Environment variable overrides
//! - CLI argument overrides (applied by the caller)
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `FSREACT_` and use double
//! underscores to separate nested levels:
//! - `FSREACT_DEBUG=true` sets `debug`
//! - `FSREACT_REMOTE__ADDRESS=10.0.0.5:8080` sets `remote.address`
//! - `FSREACT_REACTION__TIMEOUT_SECS=30` sets `reaction.timeout_secs`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "fsreact.toml";

const ENV_PREFIX: &str = "FSREACT_";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Rule file to load (`.json` or `.toml`)
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    /// Global debug mode, raises the default log level to `debug`
    #[serde(default)]
    pub debug: bool,

    /// Remote endpoint receiving reaction reports
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Command execution settings
    #[serde(default)]
    pub reaction: ReactionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RemoteConfig {
    /// `host:port` or full URL; reports are disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Path the reports are POSTed to
    #[serde(default = "default_push_path")]
    pub push_path: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ReactionConfig {
    /// Command timeout in seconds, 0 waits forever
    #[serde(default)]
    pub timeout_secs: u64,

    /// Worker threads running commands
    #[serde(default = "default_workers")]
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Default level for every target
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `"fsreact::watcher" = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,

    /// Directory for daily rolling log files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// Default value functions
fn default_rules_path() -> PathBuf { PathBuf::from("watch.json") }
fn default_push_path() -> String { "/events".to_string() }
fn default_remote_timeout() -> u64 { 10 }
fn default_workers() -> usize { num_cpus::get() }
fn default_log_level() -> String { "info".to_string() }

impl Default for Settings {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            debug: false,
            remote: RemoteConfig::default(),
            reaction: ReactionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            address: None,
            push_path: default_push_path(),
            timeout_secs: default_remote_timeout(),
        }
    }
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            workers: default_workers(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
            file: None,
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ReactionConfig {
    /// `Duration::ZERO` means no deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// Load settings from defaults, `fsreact.toml` (if present) and the environment
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(DEFAULT_SETTINGS_FILE)
    }

    /// Load settings using a specific settings file
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            // Double underscore separates nested levels, single underscores stay
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Render the effective settings as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Save current settings to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}
