//! Table existence checks for optional queries.
//!
//! Some system tables only exist on certain server builds or versions. Before
//! an optional query runs, every table it references is looked up in the
//! host's catalog; if any is missing the query is skipped and the caller
//! receives the complete list of missing tables.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::debug;

use crate::db::{QueryTransport, TransportRequest};
use crate::error::Result;
use crate::hosts::HostConfig;

/// Database assumed for unqualified table names.
pub const DEFAULT_DATABASE: &str = "default";

/// `FROM`/`JOIN` followed by an optionally quoted `ident` or `db.ident`,
/// capturing a trailing `(` to detect table functions.
const TABLE_REF_PATTERN: &str = r#"(?i)\b(?:from|join)\s+([`"]?[a-z_][a-z0-9_]*[`"]?(?:\.[`"]?[a-z_][a-z0-9_]*[`"]?)?)(\s*\()?"#;

/// `name AS (` introduces a CTE, whose name is not a table.
const CTE_PATTERN: &str = r"(?i)\b([a-z_][a-z0-9_]*)\s+as\s*\(";

fn table_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TABLE_REF_PATTERN).expect("valid table reference pattern"))
}

fn cte_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CTE_PATTERN).expect("valid CTE pattern"))
}

/// Outcome of a table existence check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableValidation {
    /// False when at least one table is missing.
    pub should_proceed: bool,
    /// Every missing table, as `database.table`, in reference order.
    pub missing_tables: Vec<String>,
}

impl TableValidation {
    fn proceed() -> Self {
        Self {
            should_proceed: true,
            missing_tables: Vec::new(),
        }
    }
}

/// Qualifies a table reference as `database.table`, stripping identifier quotes.
pub fn qualify_table(reference: &str) -> String {
    let unquoted: String = reference
        .chars()
        .filter(|c| *c != '`' && *c != '"')
        .collect();
    if unquoted.contains('.') {
        unquoted
    } else {
        format!("{DEFAULT_DATABASE}.{unquoted}")
    }
}

/// Scans SQL for tables named after `FROM` or `JOIN`.
///
/// Sub-selects, table functions and CTE names are skipped. Results are
/// qualified, deduplicated and kept in first-seen order.
pub fn extract_table_names(sql: &str) -> Vec<String> {
    let ctes: HashSet<String> = cte_regex()
        .captures_iter(sql)
        .map(|c| c[1].to_lowercase())
        .collect();

    let mut seen = HashSet::new();
    table_ref_regex()
        .captures_iter(sql)
        .filter(|c| c.get(2).is_none())
        .map(|c| c[1].to_string())
        .filter(|name| name.contains('.') || !ctes.contains(&name.to_lowercase()))
        .map(|name| qualify_table(&name))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Escapes a value for use inside a single-quoted SQL literal.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Builds the single catalog lookup covering all `tables`.
pub fn existence_query(tables: &[String]) -> String {
    let tuples = tables
        .iter()
        .map(|t| {
            let (db, name) = t.split_once('.').unwrap_or((DEFAULT_DATABASE, t.as_str()));
            format!("({}, {})", quote_literal(db), quote_literal(name))
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT database, name FROM system.tables WHERE (database, name) IN ({tuples})")
}

/// Checks that an optional query's tables exist on a host.
pub struct TableValidator {
    transport: Arc<dyn QueryTransport>,
}

impl TableValidator {
    pub fn new(transport: Arc<dyn QueryTransport>) -> Self {
        Self { transport }
    }

    /// Resolves the tables to check: the explicit list when non-empty,
    /// otherwise those scanned from `sql`.
    pub fn tables_for(sql: &str, explicit: &[String]) -> Vec<String> {
        if explicit.is_empty() {
            extract_table_names(sql)
        } else {
            let mut seen = HashSet::new();
            explicit
                .iter()
                .map(|t| qualify_table(t))
                .filter(|t| seen.insert(t.clone()))
                .collect()
        }
    }

    /// Checks every referenced table in one round trip.
    pub async fn validate(
        &self,
        host: &HostConfig,
        sql: &str,
        explicit: &[String],
    ) -> Result<TableValidation> {
        let tables = Self::tables_for(sql, explicit);
        if tables.is_empty() {
            return Ok(TableValidation::proceed());
        }

        let response = self
            .transport
            .query(host, &TransportRequest::tagged(&existence_query(&tables)))
            .await?;

        let existing: HashSet<String> = response
            .rows
            .iter()
            .filter_map(|row| {
                let db = row.get("database")?.as_str()?;
                let name = row.get("name")?.as_str()?;
                Some(format!("{db}.{name}"))
            })
            .collect();

        let missing_tables: Vec<String> = tables
            .into_iter()
            .filter(|t| !existing.contains(t))
            .collect();

        if !missing_tables.is_empty() {
            debug!(host_id = host.id, missing = ?missing_tables, "Optional query tables missing");
        }

        Ok(TableValidation {
            should_proceed: missing_tables.is_empty(),
            missing_tables,
        })
    }
}
