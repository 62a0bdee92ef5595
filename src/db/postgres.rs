//! PostgreSQL connection provider.
//!
//! Opens one `sqlx::PgConnection` per execution and converts result rows
//! into `QueryResult`s.
//!
//! The query text is sent over the simple query protocol, so a file may hold
//! several statements (`SET ...; SELECT ...`). Values arrive in Postgres text
//! format: well-known types are decoded into typed values and everything else
//! is kept as the server's text rendering.

use crate::db::{
    ColumnInfo, ConnectionProvider, DatabaseClient, DbParams, QueryResult, Row, Value,
};
use crate::deadline;
use crate::error::{FleetError, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, Postgres};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column as SqlxColumn, Connection, Either, Row as SqlxRow, TypeInfo};
use std::time::{Duration, Instant};
use tracing::debug;

/// Opens Postgres connections over the wire protocol.
#[derive(Debug, Clone, Default)]
pub struct PostgresProvider {
    timeout: Option<Duration>,
}

impl PostgresProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds connection setup and each query by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn connect_options(params: &DbParams) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&params.endpoint.host)
            .port(params.endpoint.port)
            .username(&params.user)
            .password(&params.password)
            .database(&params.database)
    }
}

#[async_trait]
impl ConnectionProvider for PostgresProvider {
    async fn connect(&self, params: &DbParams) -> Result<Box<dyn DatabaseClient>> {
        debug!("Connecting to {}", params.display_string());

        let options = Self::connect_options(params);
        let conn = deadline::within(
            self.timeout,
            async {
                PgConnection::connect_with(&options)
                    .await
                    .map_err(|e| map_connection_error(e, params))
            },
            |limit| {
                FleetError::connection(format!(
                    "Connection to {} timed out after {}s",
                    params.endpoint,
                    limit.as_secs()
                ))
            },
        )
        .await?;

        debug!("Connected to {}", params.display_string());
        Ok(Box::new(PostgresClient {
            conn,
            timeout: self.timeout,
        }))
    }
}

/// PostgreSQL database client holding a single connection.
#[derive(Debug)]
pub struct PostgresClient {
    conn: PgConnection,
    timeout: Option<Duration>,
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn execute_query(&mut self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();
        let conn = &mut self.conn;

        let result = deadline::within(
            self.timeout,
            async {
                let mut sets = ResultSets::default();
                let mut stream = sqlx::raw_sql(sql).fetch_many(&mut *conn);
                while let Some(step) = stream.try_next().await.map_err(query_error)? {
                    match step {
                        Either::Left(_) => sets.finish_statement(),
                        Either::Right(row) => sets.push_row(row),
                    }
                }
                Ok(sets.into_last())
            },
            |limit| {
                FleetError::query(format!("Query timed out after {} seconds", limit.as_secs()))
            },
        )
        .await?;

        let execution_time = start.elapsed();

        // Column metadata is taken from the first row; an empty result produces
        // no report block, so its columns are never needed.
        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|first_row| {
                first_row
                    .columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let rows: Vec<Row> = result.iter().map(convert_row).collect();

        Ok(QueryResult::with_data(columns, rows).with_execution_time(execution_time))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn
            .close()
            .await
            .map_err(|e| FleetError::connection(format!("Failed to close connection: {e}")))
    }
}

/// Collects the rows of a multi-statement query and keeps the last
/// statement that returned any.
#[derive(Debug)]
struct ResultSets<R> {
    current: Vec<R>,
    last: Vec<R>,
}

impl<R> Default for ResultSets<R> {
    fn default() -> Self {
        Self {
            current: Vec::new(),
            last: Vec::new(),
        }
    }
}

impl<R> ResultSets<R> {
    fn push_row(&mut self, row: R) {
        self.current.push(row);
    }

    /// Called on each command completion.
    fn finish_statement(&mut self) {
        if !self.current.is_empty() {
            self.last = std::mem::take(&mut self.current);
        }
    }

    fn into_last(mut self) -> Vec<R> {
        self.finish_statement();
        self.last
    }
}

fn query_error(error: sqlx::Error) -> FleetError {
    FleetError::query(format_query_error(error))
}

/// Converts a sqlx PgRow to our Row type.
fn convert_row(row: &PgRow) -> Row {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Decodes a nullable column as `T`, or `None` when NULL or not decodable.
fn decode<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(index).ok().flatten()
}

/// Reads a column's text rendering regardless of its declared type.
fn decode_text(row: &PgRow, index: usize) -> Option<String> {
    row.try_get_unchecked::<Option<String>, _>(index)
        .ok()
        .flatten()
}

fn text<T: ToString>(value: T) -> Value {
    Value::String(value.to_string())
}

/// Converts a single column value from a PgRow to our Value type.
///
/// A value the typed decoders reject falls back to its text rendering, so
/// only SQL NULL becomes `Value::Null`.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    let typed = match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => decode::<bool>(row, index).map(Value::Bool),

        "INT2" | "SMALLINT" => decode::<i16>(row, index).map(|v| Value::Int(v as i64)),

        "INT4" | "INT" | "INTEGER" => decode::<i32>(row, index).map(|v| Value::Int(v as i64)),

        "INT8" | "BIGINT" => decode::<i64>(row, index).map(Value::Int),

        "FLOAT4" | "REAL" => decode::<f32>(row, index).map(|v| Value::Float(v as f64)),

        "FLOAT8" | "DOUBLE PRECISION" => decode::<f64>(row, index).map(Value::Float),

        "NUMERIC" => decode::<Decimal>(row, index).map(text),

        "BYTEA" => decode::<Vec<u8>>(row, index).map(Value::from),

        "DATE" => decode::<NaiveDate>(row, index).map(text),

        "TIME" => decode::<NaiveTime>(row, index).map(text),

        "TIMESTAMP" => decode::<NaiveDateTime>(row, index).map(text),

        "TIMESTAMPTZ" => decode::<DateTime<Utc>>(row, index)
            .map(|v| v.to_rfc3339())
            .map(Value::String),

        "UUID" => decode::<Uuid>(row, index).map(text),

        "JSON" | "JSONB" => decode::<JsonValue>(row, index).map(text),

        // interval, inet, oid, arrays, money and the rest keep their text form
        _ => None,
    };

    typed
        .or_else(|| decode_text(row, index).map(Value::from))
        .unwrap_or(Value::Null)
}

/// Maps sqlx connection errors to readable messages.
fn map_connection_error(error: sqlx::Error, params: &DbParams) -> FleetError {
    let endpoint = &params.endpoint;
    let user = &params.user;
    let database = &params.database;

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        FleetError::connection(format!(
            "Cannot connect to {endpoint}. Check that the server is running."
        ))
    } else if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
    {
        FleetError::connection(format!(
            "Authentication failed for user '{user}'. Check your credentials."
        ))
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        FleetError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("ssl") || error_str.contains("tls") {
        FleetError::connection(format!("Server {endpoint} requires SSL: {error}"))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        FleetError::connection(format!(
            "Connection to {endpoint} timed out. The server may be overloaded or unreachable."
        ))
    } else {
        FleetError::connection(error.to_string())
    }
}

/// Formats a query error with Postgres detail and hint if available.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = String::from("ERROR: ");
    result.push_str(db_error.message());

    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }

        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }

    result
}
