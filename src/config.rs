//! Configuration management for db-lookout.
//!
//! Handles loading configuration from TOML files and environment variables,
//! with support for multiple database hosts, cache windows and the dashboard
//! allow-list table.

use crate::error::{LookoutError, Result};
use crate::hosts::{Credentials, HostConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

/// Main configuration structure for db-lookout.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Configured database hosts, in id order.
    #[serde(default)]
    pub hosts: Vec<HostEntry>,

    /// Cache windows.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Dashboard allow-list source.
    #[serde(default)]
    pub allow_list: AllowListConfig,

    /// Transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
}

/// A host as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostEntry {
    /// Base URL of the HTTP interface.
    pub address: String,

    /// Server user.
    #[serde(default = "default_user")]
    pub user: String,

    /// Server password (not recommended to store in config).
    #[serde(default)]
    pub password: String,

    /// Display name.
    pub name: Option<String>,
}

fn default_user() -> String {
    "default".to_string()
}

/// Cache windows, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long a host's allow-list stays valid.
    #[serde(default = "default_allow_list_ttl")]
    pub allow_list_ttl_secs: u64,

    /// How long a host's resolved server version stays valid.
    #[serde(default = "default_version_ttl")]
    pub version_ttl_secs: u64,
}

fn default_allow_list_ttl() -> u64 {
    300
}

fn default_version_ttl() -> u64 {
    600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            allow_list_ttl_secs: default_allow_list_ttl(),
            version_ttl_secs: default_version_ttl(),
        }
    }
}

impl CacheConfig {
    pub fn allow_list_ttl(&self) -> Duration {
        Duration::from_secs(self.allow_list_ttl_secs)
    }

    pub fn version_ttl(&self) -> Duration {
        Duration::from_secs(self.version_ttl_secs)
    }
}

/// Where the dashboard allow-list lives on each host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowListConfig {
    /// Fully qualified table name.
    #[serde(default = "default_allow_list_table")]
    pub table: String,

    /// Column holding the exact SQL text.
    #[serde(default = "default_allow_list_column")]
    pub column: String,
}

fn default_allow_list_table() -> String {
    "system.monitoring_dashboard_queries".to_string()
}

fn default_allow_list_column() -> String {
    "query".to_string()
}

impl Default for AllowListConfig {
    fn default() -> Self {
        Self {
            table: default_allow_list_table(),
            column: default_allow_list_column(),
        }
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

impl HostEntry {
    /// Validates the address and converts the entry into a host with the given id.
    pub fn to_host_config(&self, id: usize) -> Result<HostConfig> {
        let url = Url::parse(&self.address).map_err(|e| {
            LookoutError::config(format!("Invalid host address '{}': {e}", self.address))
        })?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(LookoutError::config(format!(
                "Invalid scheme '{}' for host '{}'. Expected 'http' or 'https'",
                url.scheme(),
                self.address
            )));
        }

        let name = self
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| url.host_str().map(String::from))
            .unwrap_or_else(|| self.address.clone());

        Ok(HostConfig::new(
            id,
            self.address.trim_end_matches('/'),
            Credentials::new(self.user.clone(), self.password.clone()),
        )
        .with_name(name))
    }
}

/// Splits a comma-separated environment value into trimmed items.
fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).collect()
}

/// Builds host entries from the `CLICKHOUSE_*` environment variables.
///
/// `CLICKHOUSE_HOST` drives the host count; the user, password and name lists
/// are matched by position and fall back to defaults when shorter.
pub fn hosts_from_env_values(
    hosts: &str,
    users: Option<&str>,
    passwords: Option<&str>,
    names: Option<&str>,
) -> Vec<HostEntry> {
    let users = users.map(split_list).unwrap_or_default();
    let passwords = passwords.map(split_list).unwrap_or_default();
    let names = names.map(split_list).unwrap_or_default();

    split_list(hosts)
        .into_iter()
        .filter(|address| !address.is_empty())
        .enumerate()
        .map(|(i, address)| HostEntry {
            address,
            user: users
                .get(i)
                .filter(|u| !u.is_empty())
                .cloned()
                .unwrap_or_else(default_user),
            password: passwords.get(i).cloned().unwrap_or_default(),
            name: names.get(i).filter(|n| !n.is_empty()).cloned(),
        })
        .collect()
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-lookout")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| LookoutError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            LookoutError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Fills in hosts from `CLICKHOUSE_HOST` and friends when the file configures none.
    pub fn apply_env_defaults(&mut self) {
        if !self.hosts.is_empty() {
            return;
        }
        if let Ok(hosts) = std::env::var("CLICKHOUSE_HOST") {
            self.hosts = hosts_from_env_values(
                &hosts,
                std::env::var("CLICKHOUSE_USER").ok().as_deref(),
                std::env::var("CLICKHOUSE_PASSWORD").ok().as_deref(),
                std::env::var("CLICKHOUSE_NAME").ok().as_deref(),
            );
        }
    }

    /// Converts the configured entries into hosts, assigning ids in order.
    pub fn host_configs(&self) -> Result<Vec<HostConfig>> {
        self.hosts
            .iter()
            .enumerate()
            .map(|(id, entry)| entry.to_host_config(id))
            .collect()
    }
}
