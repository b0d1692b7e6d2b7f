//! Integration tests for db-lookout.

pub mod allowlist_test;
pub mod live_test;
pub mod pipeline_test;
