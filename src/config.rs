//! Configuration for the enrichment engine.
//!
//! All settings live in `./config/ipscan.toml`. When the file is absent the
//! embedded default template is used instead; there are no command-line
//! flags and no environment-variable overrides.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::asn_db::MatchPolicy;

/// Configuration file path relative to the working directory
pub const CONFIG_PATH: &str = "./config/ipscan.toml";

/// Default configuration file content - this is the ONLY place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/ipscan.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub asn: AsnConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub rdap: RdapConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
}

/// Input/output file locations
#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    /// Newline-delimited seed domain list
    pub seed_list: PathBuf,
    /// Directory holding one subdirectory per autonomous system
    pub asn_data_dir: PathBuf,
    /// Durable snapshot file, rewritten after every completed seed domain
    pub snapshot_file: PathBuf,
}

/// Address-block index configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AsnConfig {
    #[serde(default)]
    pub match_policy: MatchPolicy,
}

/// DNS resolution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    #[serde(default = "default_dns_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_dns_timeout_secs() -> u64 {
    5
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_dns_timeout_secs(),
        }
    }
}

/// RDAP fallback lookup configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RdapConfig {
    #[serde(default = "default_rdap_base_url")]
    pub base_url: String,
    #[serde(default = "default_rdap_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_rdap_base_url() -> String {
    "https://rdap.org".to_string()
}

fn default_rdap_timeout_secs() -> u64 {
    10
}

impl Default for RdapConfig {
    fn default() -> Self {
        Self {
            base_url: default_rdap_base_url(),
            timeout_secs: default_rdap_timeout_secs(),
        }
    }
}

/// Headless browser session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    /// Upper bound on the navigate-and-settle wait, in milliseconds
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    /// Fixed extra wait after navigation for straggling requests
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Explicit Chrome/Chromium binary; the system default is used when unset
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    /// Extra HTTP headers sent with every request the page issues
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

fn default_navigation_timeout_ms() -> u64 {
    15_000
}

fn default_grace_period_ms() -> u64 {
    2_000
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: default_navigation_timeout_ms(),
            grace_period_ms: default_grace_period_ms(),
            chrome_path: None,
            headers: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `CONFIG_PATH`, falling back to the embedded
    /// default template when no file exists.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new(CONFIG_PATH))
    }

    /// Load configuration from an explicit path, falling back to the embedded
    /// defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path)?
        } else {
            DEFAULT_CONFIG.to_string()
        };

        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.seed_list.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "paths.seed_list".to_string(),
            });
        }
        if self.paths.asn_data_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "paths.asn_data_dir".to_string(),
            });
        }
        if self.paths.snapshot_file.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "paths.snapshot_file".to_string(),
            });
        }
        Ok(())
    }
}
