//! Command-line argument parsing for db-lookout.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::db::{QueryFormat, QueryParams, QuerySettings};
use crate::error::{LookoutError, Result};
use crate::service::InboundRequest;

/// Query monitoring data from configured database hosts.
#[derive(Parser, Debug)]
#[command(name = "lookout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Use the in-memory transport instead of real hosts
    #[arg(long, global = true)]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List configured hosts
    Hosts,
    /// Run a query and print the response envelope
    Query(QueryArgs),
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Host id (position in the host list)
    #[arg(long = "host", value_name = "ID")]
    pub host_id: String,

    /// Custom SQL, checked against the dashboard allow-list
    #[arg(long, value_name = "SQL", conflicts_with = "name", required_unless_present = "name")]
    pub sql: Option<String>,

    /// Name of a catalog query
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Query parameter (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Server setting (repeatable)
    #[arg(long = "setting", value_name = "KEY=VALUE")]
    pub settings: Vec<String>,

    /// Output format requested from the server
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<String>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::Config::default_path)
    }
}

impl QueryArgs {
    /// Builds the inbound request these arguments describe.
    pub fn to_request(&self) -> Result<InboundRequest> {
        let format = self
            .format
            .as_deref()
            .map(|f| {
                QueryFormat::parse(f).ok_or_else(|| {
                    LookoutError::validation(format!(
                        "Invalid format: {f}. Expected JSONEachRow, JSON, JSONCompact, CSV or TabSeparated"
                    ))
                })
            })
            .transpose()?;

        Ok(InboundRequest {
            host_id: self.host_id.clone().into(),
            sql: self.sql.clone(),
            query_config_name: self.name.clone(),
            params: parse_pairs(&self.params)?,
            format,
            settings: parse_pairs(&self.settings)?,
        })
    }
}

/// Parses `key=value` pairs. Values that are valid JSON keep their type,
/// anything else is a string.
fn parse_pairs(pairs: &[String]) -> Result<QueryParams> {
    let mut out = QuerySettings::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(k, _)| !k.trim().is_empty())
            .ok_or_else(|| {
                LookoutError::validation(format!("Invalid pair '{pair}': expected KEY=VALUE"))
            })?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        out.insert(key.trim().to_string(), value);
    }
    Ok(out)
}
