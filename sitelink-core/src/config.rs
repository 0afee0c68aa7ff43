//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/sitelink/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/sitelink/` (~/.config/sitelink/)
//! - Data: `$XDG_DATA_HOME/sitelink/` (~/.local/share/sitelink/)
//! - State/Logs: `$XDG_STATE_HOME/sitelink/` (~/.local/state/sitelink/)

use crate::error::{Error, Result};
use crate::types::InstalledPlugin;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Collector endpoint and timeouts
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Static description of this installation
    #[serde(default)]
    pub site: SiteConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// Collector configuration
///
/// Replaces the process-wide API URL constant: every component that talks
/// to the collector receives this struct at construction.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Collector API base URL, without trailing slash
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for connect/reconnect handshakes
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for requests made while serving an interactive request
    #[serde(default = "default_interactive_timeout")]
    pub interactive_timeout_secs: u64,

    /// Timeout for requests made from background work
    #[serde(default = "default_background_timeout")]
    pub background_timeout_secs: u64,

    /// Lifetime of a handshake verification token
    #[serde(default = "default_verify_token_ttl")]
    pub verify_token_ttl_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            interactive_timeout_secs: default_interactive_timeout(),
            background_timeout_secs: default_background_timeout(),
            verify_token_ttl_secs: default_verify_token_ttl(),
        }
    }
}

impl CollectorConfig {
    /// Build a config pointing at `base_url` with default timeouts.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if url.is_empty() {
            return Err(Error::Config(
                "collector.base_url must not be empty".to_string(),
            ));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "collector.base_url must be an http(s) URL, got {:?}",
                url
            )));
        }
        if self.connect_timeout_secs == 0
            || self.interactive_timeout_secs == 0
            || self.background_timeout_secs == 0
        {
            return Err(Error::Config(
                "collector timeouts must be greater than zero".to_string(),
            ));
        }
        if self.verify_token_ttl_secs == 0 {
            return Err(Error::Config(
                "collector.verify_token_ttl_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL with any trailing slash removed
    pub fn api_url(&self) -> &str {
        self.base_url.trim().trim_end_matches('/')
    }

    /// Timeout for connect/reconnect handshakes
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Timeout for requests on a user-facing path
    pub fn interactive_timeout(&self) -> Duration {
        Duration::from_secs(self.interactive_timeout_secs)
    }

    /// Timeout for requests on a background path
    pub fn background_timeout(&self) -> Duration {
        Duration::from_secs(self.background_timeout_secs)
    }

    /// Lifetime of a verification token
    pub fn verify_token_ttl(&self) -> Duration {
        Duration::from_secs(self.verify_token_ttl_secs)
    }
}

fn default_base_url() -> String {
    "https://hiive.cloud/api".to_string()
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_interactive_timeout() -> u64 {
    15
}

fn default_background_timeout() -> u64 {
    60
}

fn default_verify_token_ttl() -> u64 {
    5 * 60
}

/// Static site description reported with every handshake and event batch
///
/// Fields left unset fall back to values discovered from the process
/// environment (hostname, username) or to the collector's defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    /// Brand slug of the hosting product
    #[serde(default)]
    pub brand: String,

    /// Identifier of the host plugin reporting events
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Version of the host plugin
    #[serde(default = "default_plugin_version")]
    pub plugin_version: String,

    /// Version of this reporting module
    #[serde(default = "default_module_version")]
    pub module_version: String,

    /// Public site URL
    #[serde(default)]
    pub url: String,

    /// Administrator contact email
    #[serde(default)]
    pub admin_email: String,

    /// Hosting platform version
    #[serde(default)]
    pub platform_version: String,

    /// Language runtime version
    #[serde(default)]
    pub runtime_version: String,

    /// Database server version
    #[serde(default)]
    pub database_version: String,

    /// Page cache level
    #[serde(default = "default_cache_level")]
    pub cache_level: i64,

    /// Whether the site is fronted by Cloudflare
    #[serde(default)]
    pub cloudflare: bool,

    /// Installation root on the server
    #[serde(default)]
    pub server_path: String,

    /// Hostname override (defaults to the machine hostname)
    pub hostname: Option<String>,

    /// Username override (defaults to the process owner)
    pub username: Option<String>,

    /// Installed plugin inventory sent with handshakes
    #[serde(default)]
    pub plugins: Vec<InstalledPlugin>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            brand: String::new(),
            origin: default_origin(),
            plugin_version: default_plugin_version(),
            module_version: default_module_version(),
            url: String::new(),
            admin_email: String::new(),
            platform_version: String::new(),
            runtime_version: String::new(),
            database_version: String::new(),
            cache_level: default_cache_level(),
            cloudflare: false,
            server_path: String::new(),
            hostname: None,
            username: None,
            plugins: Vec::new(),
        }
    }
}

fn default_origin() -> String {
    "error".to_string()
}

fn default_plugin_version() -> String {
    "0".to_string()
}

fn default_module_version() -> String {
    "0.0".to_string()
}

fn default_cache_level() -> i64 {
    2
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.collector.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/sitelink/config.toml` (~/.config/sitelink/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("sitelink").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite state store)
    ///
    /// `$XDG_DATA_HOME/sitelink/` (~/.local/share/sitelink/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("sitelink")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/sitelink/` (~/.local/state/sitelink/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("sitelink")
    }

    /// Returns the state store file path
    ///
    /// `$XDG_DATA_HOME/sitelink/state.db` (~/.local/share/sitelink/state.db)
    pub fn store_path() -> PathBuf {
        Self::data_dir().join("state.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/sitelink/sitelink.log` (~/.local/state/sitelink/sitelink.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("sitelink.log")
    }
}
