//! Query selection, validation and execution for db-lookout.
//!
//! This module isolates the per-request query steps (version-aware SQL
//! selection, optional-table checks and execution) from the pipeline
//! orchestrator.

pub mod catalog;
pub mod executor;
pub mod spec;
pub mod validator;

pub use catalog::QueryCatalog;
pub use crate::db::{tag_sql, TRACE_COMMENT};
pub use executor::{ExecutionMetadata, ExecutionRequest, ExecutionResult, QueryExecutor};
pub use spec::{QueryConfig, QuerySpec, VersionedVariant};
pub use validator::{extract_table_names, TableValidation, TableValidator};
