//! Error classification for db-lookout.
//!
//! Maps raw failures onto the closed five-kind taxonomy exposed to API
//! callers. The transport offers no stable machine-readable error code, so the
//! default classifier matches lowercase keywords with an ordered rule list
//! where the first matching rule wins.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::LookoutError;

/// The closed set of error kinds returned to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, unknown host, malformed request.
    ValidationError,
    /// Optional table missing, or the server reports a missing relation.
    TableNotFound,
    /// Safe default for everything else.
    #[default]
    QueryError,
    /// Transport or connectivity failure.
    NetworkError,
    /// Authentication, authorization or allow-list denial.
    PermissionError,
}

impl ErrorKind {
    /// Returns the wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::TableNotFound => "table_not_found",
            Self::QueryError => "query_error",
            Self::NetworkError => "network_error",
            Self::PermissionError => "permission_error",
        }
    }

    /// Parses a wire name. Unknown names fall back to `QueryError`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "validation_error" => Self::ValidationError,
            "table_not_found" => Self::TableNotFound,
            "network_error" => Self::NetworkError,
            "permission_error" => Self::PermissionError,
            _ => Self::QueryError,
        }
    }

    /// HTTP status code paired with the kind.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::PermissionError => 403,
            Self::TableNotFound => 404,
            Self::NetworkError => 503,
            Self::QueryError => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A primitive value allowed inside error details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailPrimitive {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// A detail value: a primitive or a list of primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Primitive(DetailPrimitive),
    List(Vec<DetailPrimitive>),
}

impl From<bool> for DetailValue {
    fn from(v: bool) -> Self {
        Self::Primitive(DetailPrimitive::Bool(v))
    }
}

impl From<i64> for DetailValue {
    fn from(v: i64) -> Self {
        Self::Primitive(DetailPrimitive::Int(v))
    }
}

impl From<f64> for DetailValue {
    fn from(v: f64) -> Self {
        Self::Primitive(DetailPrimitive::Float(v))
    }
}

impl From<&str> for DetailValue {
    fn from(v: &str) -> Self {
        Self::Primitive(DetailPrimitive::Text(v.to_string()))
    }
}

impl From<String> for DetailValue {
    fn from(v: String) -> Self {
        Self::Primitive(DetailPrimitive::Text(v))
    }
}

impl From<Vec<String>> for DetailValue {
    fn from(v: Vec<String>) -> Self {
        Self::List(v.into_iter().map(DetailPrimitive::Text).collect())
    }
}

/// A failure mapped onto the closed taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Error kind.
    pub kind: ErrorKind,

    /// Human-readable message. Always populated.
    pub message: String,

    /// Structured context for the presentation layer (e.g. `missingTables`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, DetailValue>,
}

impl ClassifiedError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ValidationError, message)
    }

    /// Creates a permission error.
    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionError, message)
    }

    /// Creates a table-not-found error listing every missing table.
    pub fn missing_tables(missing: Vec<String>) -> Self {
        let message = format!("Required table(s) not found: {}", missing.join(", "));
        Self::new(ErrorKind::TableNotFound, message).with_detail("missingTables", missing)
    }

    /// Adds a detail entry.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<DetailValue>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Maps failure text onto an [`ErrorKind`].
///
/// Call sites depend on this trait only, so the keyword rules can be replaced
/// by structured server error codes without touching them.
pub trait ErrorClassifier: Send + Sync {
    /// Returns the kind for a failure message.
    fn kind_of(&self, message: &str) -> ErrorKind;

    /// Classifies a crate error. Matching runs on the full display text; the
    /// reported message drops the category prefix.
    fn classify(&self, error: &LookoutError) -> ClassifiedError {
        ClassifiedError::new(self.kind_of(&error.to_string()), error.detail())
    }

    /// Classifies a bare message.
    fn classify_message(&self, message: &str) -> ClassifiedError {
        ClassifiedError::new(self.kind_of(message), message)
    }
}

/// One rule: when `required` (if any) and one of `any_of` both appear, the
/// text is of kind `kind`.
#[derive(Debug, Clone, Copy)]
pub struct KeywordRule {
    pub kind: ErrorKind,
    pub required: Option<&'static str>,
    pub any_of: &'static [&'static str],
}

impl KeywordRule {
    fn matches(&self, text: &str) -> bool {
        self.required.map_or(true, |r| text.contains(r))
            && self.any_of.iter().any(|k| text.contains(k))
    }
}

/// Rules applied in order by [`KeywordClassifier::default`].
pub const DEFAULT_RULES: &[KeywordRule] = &[
    KeywordRule {
        kind: ErrorKind::TableNotFound,
        required: Some("table"),
        any_of: &["not found", "doesn't exist", "does not exist", "missing"],
    },
    KeywordRule {
        kind: ErrorKind::PermissionError,
        required: None,
        any_of: &["permission", "access denied", "unauthorized", "forbidden"],
    },
    KeywordRule {
        kind: ErrorKind::NetworkError,
        required: None,
        any_of: &[
            "network",
            "connection",
            "timeout",
            "econnrefused",
            "etimedout",
            "connect failed",
        ],
    },
    KeywordRule {
        kind: ErrorKind::ValidationError,
        required: None,
        any_of: &[
            "invalid",
            "missing",
            "required",
            "malformed",
            "syntax error",
            "parse error",
        ],
    },
];

/// Ordered keyword classifier. Unmatched text is a `QueryError`.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    rules: Vec<KeywordRule>,
}

impl KeywordClassifier {
    /// Creates a classifier with custom rules.
    pub fn with_rules(rules: Vec<KeywordRule>) -> Self {
        Self { rules }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::with_rules(DEFAULT_RULES.to_vec())
    }
}

impl ErrorClassifier for KeywordClassifier {
    fn kind_of(&self, message: &str) -> ErrorKind {
        let text = message.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&text))
            .map(|rule| rule.kind)
            .unwrap_or_default()
    }
}
