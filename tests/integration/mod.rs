//! Integration tests for fleet-query.

pub mod pipeline_test;
pub mod postgres_test;
pub mod tunnel_test;
