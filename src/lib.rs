//! fleet-query - Run one SQL query across a fleet of Postgres servers.
//!
//! This library exposes the core modules for use by the binary and in
//! integration tests.

pub mod config;
pub mod db;
pub mod deadline;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod query;
pub mod report;
pub mod target;
pub mod tunnel;
