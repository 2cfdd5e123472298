//! Configuration file handling with TOML support.

use crate::api::DEFAULT_API_BASE;
use crate::models::{ListId, SortKey, Symbol};
use crate::proxy::{DEFAULT_PROXY_PORT, DEFAULT_UPSTREAM};
use crate::store::normalize_all;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Where lists, caches and logs are kept
    #[serde(default)]
    pub storage: StorageConfig,

    /// Default symbols for lists that have never been edited
    #[serde(default)]
    pub lists: ListsConfig,

    /// Reverse proxy settings
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Display settings
    #[serde(default)]
    pub display: DisplayConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Base URL of the quote API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Request timeout in seconds; requests wait indefinitely when unset
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: None,
        }
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Data directory; defaults to the platform data dir
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Built-in membership of the user lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListsConfig {
    #[serde(default = "default_cub")]
    pub cub: Vec<String>,
    #[serde(default = "default_ft")]
    pub ft: Vec<String>,
    #[serde(default = "default_oo")]
    pub oo: Vec<String>,
}

impl Default for ListsConfig {
    fn default() -> Self {
        Self {
            cub: default_cub(),
            ft: default_ft(),
            oo: default_oo(),
        }
    }
}

fn default_cub() -> Vec<String> {
    vec!["AAPL".into(), "MSFT".into(), "NVDA".into()]
}
fn default_ft() -> Vec<String> {
    vec!["AMAT".into(), "LRCX".into(), "KLAC".into()]
}
fn default_oo() -> Vec<String> {
    vec!["SPY".into(), "QQQ".into(), "IWM".into()]
}

impl ListsConfig {
    /// Normalized defaults for a list; server-determined lists have none.
    pub fn defaults_for(&self, id: ListId) -> Vec<Symbol> {
        match id {
            ListId::WatchlistA => normalize_all(&self.cub),
            ListId::WatchlistB => normalize_all(&self.ft),
            ListId::WatchlistC => normalize_all(&self.oo),
            ListId::Starred | ListId::Rebound => Vec::new(),
        }
    }
}

/// Reverse proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Origin that `/api/*` requests are forwarded to
    #[serde(default = "default_upstream")]
    pub upstream: String,

    /// Local port to listen on
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            upstream: default_upstream(),
            port: default_proxy_port(),
        }
    }
}

fn default_upstream() -> String {
    DEFAULT_UPSTREAM.to_string()
}
fn default_proxy_port() -> u16 {
    DEFAULT_PROXY_PORT
}

/// Display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Initial sort column
    #[serde(default)]
    pub sort_by: SortKey,

    /// Sort in descending order
    #[serde(default)]
    pub sort_descending: bool,

    /// List shown at startup
    #[serde(default = "default_start_list")]
    pub start_list: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            sort_by: SortKey::Symbol,
            sort_descending: false,
            start_list: default_start_list(),
        }
    }
}

fn default_start_list() -> String {
    "rebound".to_string()
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load configuration from default location or create default.
    pub fn load_or_default() -> Self {
        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                match Self::load(&path) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to load config: {:#}", e);
                    }
                }
            }
        }
        Config::default()
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("watchboard").join("config.toml"))
    }

    /// Resolve the data directory, falling back to the platform default.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.storage
            .data_dir
            .clone()
            .or_else(crate::storage::FileStorage::default_dir)
    }

    /// List shown at startup; unknown names fall back to the rebound list.
    pub fn start_list(&self) -> ListId {
        self.display.start_list.parse().unwrap_or_default()
    }
}

/// Generate a sample configuration file content.
pub fn sample_config() -> &'static str {
    r##"# Watchboard Configuration File

[general]
# Quote API base URL
api_base = "https://web-production-1b15c.up.railway.app"
# Request timeout in seconds (omit to wait indefinitely)
# timeout_secs = 30

[storage]
# Where lists, cache snapshots and logs live
# data_dir = "/home/me/.local/share/watchboard"

[lists]
# Symbols used until a list is first edited
cub = ["AAPL", "MSFT", "NVDA"]
ft = ["AMAT", "LRCX", "KLAC"]
oo = ["SPY", "QQQ", "IWM"]

[proxy]
upstream = "https://web-production-1b15c.up.railway.app"
port = 8765

[display]
# symbol, perf1d, perf5d, perf20d, perf60d, rsi14
sort_by = "symbol"
sort_descending = false
# starred, rebound, watchlistA, watchlistB, watchlistC
start_list = "rebound"
"##
}
