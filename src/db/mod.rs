//! Database abstraction layer for fleet-query.
//!
//! Provides a trait-based interface for opening connections and running the
//! fleet query, so the Postgres backend can be swapped for a mock in tests.

mod mock;
mod postgres;
mod types;

pub use mock::{Journal, MockBehavior, MockConnectionProvider, MockDatabaseClient};
pub use postgres::{PostgresClient, PostgresProvider};
pub use types::{ColumnInfo, QueryResult, Row, Value};

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// Default Postgres port.
pub const DEFAULT_DB_PORT: u16 = 5432;

/// A host/port pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// A loopback endpoint on the given local port.
    pub fn loopback(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Resolved database connection parameters.
#[derive(Clone, PartialEq, Eq)]
pub struct DbParams {
    pub endpoint: Endpoint,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl DbParams {
    /// Returns a copy of these parameters pointed at another endpoint.
    ///
    /// Used once a tunnel is live: the configured endpoint stays untouched and
    /// the connection goes to the tunnel's local side instead.
    pub fn via(&self, endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..self.clone()
        }
    }

    /// Returns a display-safe string (no password) for log messages.
    pub fn display_string(&self) -> String {
        format!("{} @ {}", self.database, self.endpoint)
    }
}

impl fmt::Debug for DbParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbParams")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Opens raw database connections. No retries, no pooling.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Connects with the given parameters.
    ///
    /// Authentication, reachability and unknown-database failures all surface
    /// as `FleetError::Connection` with the underlying message preserved.
    async fn connect(&self, params: &DbParams) -> Result<Box<dyn DatabaseClient>>;
}

/// A single open database connection.
#[async_trait]
pub trait DatabaseClient: Send {
    /// Executes a SQL query and returns the results.
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult>;

    /// Closes the database connection.
    async fn close(self: Box<Self>) -> Result<()>;
}
