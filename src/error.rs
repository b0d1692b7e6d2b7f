//! Error types for db-lookout.
//!
//! Defines the main error enum used throughout the crate. These are the
//! errors that travel between layers; the closed taxonomy exposed to API
//! callers lives in [`crate::classify`].

use thiserror::Error;

/// Main error type for db-lookout operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookoutError {
    /// Transport connectivity errors (host unreachable, timeouts, refused connections).
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution errors reported by the server.
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration errors (invalid config file, unparseable host address, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed requests detected before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authorization failures, including allow-list denials.
    #[error("Permission error: {0}")]
    Permission(String),

    /// A host id that is not a finite integer. Raised synchronously, never classified.
    #[error("Invalid hostId: {0}")]
    InvalidHostId(String),

    /// Internal errors (unexpected states, caller bugs).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LookoutError {
    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a validation error with the given message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a permission error with the given message.
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    /// Creates an invalid host id error carrying the offending raw value.
    pub fn invalid_host_id(raw: impl Into<String>) -> Self {
        Self::InvalidHostId(raw.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Config(_) => "Configuration Error",
            Self::Validation(_) => "Validation Error",
            Self::Permission(_) => "Permission Error",
            Self::InvalidHostId(_) => "Invalid Host Id",
            Self::Internal(_) => "Internal Error",
        }
    }

    /// Returns the message without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            Self::Connection(msg)
            | Self::Query(msg)
            | Self::Config(msg)
            | Self::Validation(msg)
            | Self::Permission(msg)
            | Self::InvalidHostId(msg)
            | Self::Internal(msg) => msg,
        }
    }
}

/// Result type alias using LookoutError.
pub type Result<T> = std::result::Result<T, LookoutError>;
