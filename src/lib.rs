//! db-lookout - data access and validation for a database observability dashboard.
//!
//! This library exposes the core modules for use by the binary and integration tests.

pub mod allowlist;
pub mod classify;
pub mod cli;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod hosts;
pub mod logging;
pub mod query;
pub mod response;
pub mod service;
pub mod version;
