//! Query specifications and version-aware SQL selection.

use serde::{Deserialize, Serialize};

use crate::db::{QueryParams, QuerySettings};
use crate::error::{LookoutError, Result};
use crate::version::ServerVersion;

/// One alternative SQL text, valid from `min_version` onwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedVariant {
    /// Lowest server version (major.minor) this SQL runs on.
    pub min_version: String,
    /// SQL text.
    pub sql: String,
}

impl VersionedVariant {
    pub fn new(min_version: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            min_version: min_version.into(),
            sql: sql.into(),
        }
    }
}

/// Either a literal SQL string or an oldest-first list of versioned variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuerySpec {
    Literal(String),
    Versioned(Vec<VersionedVariant>),
}

impl QuerySpec {
    /// Creates a literal spec.
    pub fn literal(sql: impl Into<String>) -> Self {
        Self::Literal(sql.into())
    }

    /// Returns true if selecting SQL requires the server version.
    ///
    /// An empty variant list never does: selection fails on it regardless of
    /// the version, so no round trip is spent first.
    pub fn needs_version(&self) -> bool {
        matches!(self, Self::Versioned(variants) if !variants.is_empty())
    }

    /// Returns the SQL applicable to `version`.
    ///
    /// A literal is returned unchanged whatever the version. For variants, the
    /// last one whose minimum is at or below `version` wins; when none
    /// qualifies (or no version is known) the first variant is served.
    /// An empty variant list is a caller bug and fails immediately.
    pub fn select_sql(&self, version: Option<&ServerVersion>) -> Result<&str> {
        let variants = match self {
            Self::Literal(sql) => return Ok(sql.as_str()),
            Self::Versioned(variants) => variants,
        };

        let first = variants
            .first()
            .ok_or_else(|| LookoutError::internal("Versioned query has no variants"))?;

        let Some(version) = version else {
            return Ok(first.sql.as_str());
        };

        let mut selected = first;
        for variant in variants {
            let min = ServerVersion::parse(&variant.min_version).map_err(|_| {
                LookoutError::internal(format!(
                    "Invalid minVersion '{}' in versioned query",
                    variant.min_version
                ))
            })?;
            if version.at_least(&min) {
                selected = variant;
            }
        }

        Ok(selected.sql.as_str())
    }
}

impl From<&str> for QuerySpec {
    fn from(sql: &str) -> Self {
        Self::Literal(sql.to_string())
    }
}

impl From<Vec<VersionedVariant>> for QuerySpec {
    fn from(variants: Vec<VersionedVariant>) -> Self {
        Self::Versioned(variants)
    }
}

/// A named query as served to dashboard widgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    /// Lookup key (`queryConfigName`).
    pub name: String,

    /// SQL or versioned variants.
    pub spec: QuerySpec,

    /// The referenced tables may not exist on every server build.
    #[serde(default)]
    pub optional: bool,

    /// Tables to check instead of scanning the SQL.
    #[serde(default)]
    pub table_check: Vec<String>,

    /// Parameters applied unless the request overrides them.
    #[serde(default)]
    pub default_params: QueryParams,

    /// Server settings sent with the query.
    #[serde(default)]
    pub settings: QuerySettings,
}

impl QueryConfig {
    /// Creates a non-optional query config.
    pub fn new(name: impl Into<String>, spec: impl Into<QuerySpec>) -> Self {
        Self {
            name: name.into(),
            spec: spec.into(),
            optional: false,
            table_check: Vec::new(),
            default_params: QueryParams::new(),
            settings: QuerySettings::new(),
        }
    }

    /// Marks the query optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets the explicit table list checked before running.
    pub fn with_table_check<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table_check = tables.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a default parameter.
    pub fn with_default_param(
        mut self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.default_params.insert(name.into(), value.into());
        self
    }

    /// Merges request params over the defaults, key by key.
    pub fn merged_params(&self, overrides: &QueryParams) -> QueryParams {
        let mut params = self.default_params.clone();
        params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }
}
