//! Host registry for db-lookout.
//!
//! Exposes the configured database endpoints by numeric id. Everything above
//! this layer consumes hosts by id and never owns them.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{LookoutError, Result};

/// Credentials used to authenticate against a host.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Server user.
    pub user: String,

    /// Server password (may be empty).
    pub password: String,
}

impl Credentials {
    /// Creates credentials from a user and password.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One configured database server endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Position of the host in the registry, starting at 0.
    pub id: usize,

    /// Display name shown in the dashboard host selector.
    pub name: String,

    /// Base URL of the server's HTTP interface (e.g. `http://localhost:8123`).
    pub address: String,

    /// Authentication credentials.
    pub credentials: Credentials,
}

impl HostConfig {
    /// Creates a host config; the display name defaults to the address.
    pub fn new(id: usize, address: impl Into<String>, credentials: Credentials) -> Self {
        let address = address.into();
        Self {
            id,
            name: address.clone(),
            address,
            credentials,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Source of configured hosts.
///
/// Implementations must return an empty list rather than fail when nothing is
/// configured; "no hosts" is a request-level validation error, not a startup error.
pub trait HostRegistry: Send + Sync {
    /// Lists every configured host, ordered by id.
    fn list_hosts(&self) -> Vec<HostConfig>;

    /// Looks up a host by id. Negative and out-of-range ids resolve to `None`.
    fn get(&self, host_id: i64) -> Option<HostConfig> {
        let index = usize::try_from(host_id).ok()?;
        self.list_hosts().into_iter().nth(index)
    }

    /// Number of configured hosts.
    fn host_count(&self) -> usize {
        self.list_hosts().len()
    }
}

/// Registry over a fixed host list sourced at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticHostRegistry {
    hosts: Arc<[HostConfig]>,
}

impl StaticHostRegistry {
    /// Creates a registry from hosts, re-assigning ids in list order.
    pub fn new(hosts: Vec<HostConfig>) -> Self {
        let hosts: Vec<HostConfig> = hosts
            .into_iter()
            .enumerate()
            .map(|(id, host)| HostConfig { id, ..host })
            .collect();
        Self {
            hosts: hosts.into(),
        }
    }

    /// Creates a registry with no hosts.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl HostRegistry for StaticHostRegistry {
    fn list_hosts(&self) -> Vec<HostConfig> {
        self.hosts.to_vec()
    }

    fn get(&self, host_id: i64) -> Option<HostConfig> {
        let index = usize::try_from(host_id).ok()?;
        self.hosts.get(index).cloned()
    }

    fn host_count(&self) -> usize {
        self.hosts.len()
    }
}

/// A host id as received from an API client: a JSON number or a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostIdInput {
    /// Integer literal.
    Int(i64),
    /// Any other JSON number, or a float supplied by a Rust caller.
    Float(f64),
    /// String form, e.g. a path or query-string parameter.
    Text(String),
}

impl From<i64> for HostIdInput {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for HostIdInput {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<usize> for HostIdInput {
    fn from(v: usize) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for HostIdInput {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for HostIdInput {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for HostIdInput {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl fmt::Display for HostIdInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}

/// Parses a client-supplied host id.
///
/// Non-numeric, NaN, infinite and fractional values are caller bugs and are
/// rejected with [`LookoutError::InvalidHostId`]. Negative integers parse
/// successfully; the range check belongs to the executor.
pub fn parse_host_id(input: &HostIdInput) -> Result<i64> {
    match input {
        HostIdInput::Int(v) => Ok(*v),
        HostIdInput::Float(v) => float_to_host_id(*v),
        HostIdInput::Text(raw) => {
            let trimmed = raw.trim();
            if let Ok(v) = trimmed.parse::<i64>() {
                return Ok(v);
            }
            match trimmed.parse::<f64>() {
                Ok(v) => float_to_host_id(v),
                Err(_) => Err(LookoutError::invalid_host_id(format!("{raw:?}"))),
            }
        }
    }
}

fn float_to_host_id(v: f64) -> Result<i64> {
    if !v.is_finite() || v.fract() != 0.0 {
        return Err(LookoutError::invalid_host_id(v.to_string()));
    }
    Ok(v as i64)
}
