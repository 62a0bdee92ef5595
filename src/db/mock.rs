//! Mock connection provider for testing.
//!
//! Returns scripted results per database name and records every connect,
//! query and close in a shared [`Journal`].

use super::{ColumnInfo, ConnectionProvider, DatabaseClient, DbParams, QueryResult, Value};
use crate::error::{FleetError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Ordered log of resource events, shared between mocks so tests can check
/// lifecycle ordering across the database and tunnel layers.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.lock().push(event.into());
    }

    /// Returns a snapshot of all recorded events.
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Counts events that start with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// What a mock database does when asked to connect and run the query.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Connect and return these rows.
    Rows(QueryResult),
    /// Fail to connect with the given message.
    ConnectFails(String),
    /// Connect, then fail the query with the given message.
    QueryFails(String),
}

impl MockBehavior {
    /// A single `x = 1` row, as returned by `SELECT 1 AS x`.
    pub fn select_one() -> Self {
        Self::Rows(QueryResult::with_data(
            vec![ColumnInfo::new("x", "INT4")],
            vec![vec![Value::Int(1)]],
        ))
    }
}

/// A mock connection provider keyed by database name.
#[derive(Debug, Clone)]
pub struct MockConnectionProvider {
    behaviors: HashMap<String, MockBehavior>,
    fallback: MockBehavior,
    journal: Journal,
    connects: Arc<Mutex<Vec<DbParams>>>,
}

impl MockConnectionProvider {
    /// Creates a provider where every database answers `SELECT 1 AS x`.
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
            fallback: MockBehavior::select_one(),
            journal: Journal::new(),
            connects: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Records events into a shared journal.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Scripts the behavior for one database name.
    pub fn with_behavior(mut self, database: impl Into<String>, behavior: MockBehavior) -> Self {
        self.behaviors.insert(database.into(), behavior);
        self
    }

    pub fn with_rows(self, database: impl Into<String>, result: QueryResult) -> Self {
        self.with_behavior(database, MockBehavior::Rows(result))
    }

    pub fn failing_connect(self, database: impl Into<String>, msg: impl Into<String>) -> Self {
        self.with_behavior(database, MockBehavior::ConnectFails(msg.into()))
    }

    pub fn failing_query(self, database: impl Into<String>, msg: impl Into<String>) -> Self {
        self.with_behavior(database, MockBehavior::QueryFails(msg.into()))
    }

    /// Returns the parameters of every connect attempt, in order.
    pub fn connect_attempts(&self) -> Vec<DbParams> {
        self.connects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }
}

impl Default for MockConnectionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionProvider for MockConnectionProvider {
    async fn connect(&self, params: &DbParams) -> Result<Box<dyn DatabaseClient>> {
        self.connects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(params.clone());
        self.journal
            .record(format!("db connect {} via {}", params.database, params.endpoint));

        let behavior = self
            .behaviors
            .get(&params.database)
            .unwrap_or(&self.fallback)
            .clone();

        if let MockBehavior::ConnectFails(msg) = behavior {
            return Err(FleetError::connection(msg));
        }

        Ok(Box::new(MockDatabaseClient {
            database: params.database.clone(),
            behavior,
            journal: self.journal.clone(),
        }))
    }
}

/// A mock connection that replays its scripted behavior.
#[derive(Debug)]
pub struct MockDatabaseClient {
    database: String,
    behavior: MockBehavior,
    journal: Journal,
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        self.journal
            .record(format!("db query {}: {}", self.database, sql));
        match &self.behavior {
            MockBehavior::Rows(result) => Ok(result.clone()),
            MockBehavior::QueryFails(msg) => Err(FleetError::query(msg.clone())),
            MockBehavior::ConnectFails(msg) => Err(FleetError::internal(format!(
                "connection for {} should have failed: {msg}",
                self.database
            ))),
        }
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.journal.record(format!("db close {}", self.database));
        Ok(())
    }
}
