//! Error types for fleet-query.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for fleet-query operations.
#[derive(Error, Debug)]
pub enum FleetError {
    /// Configuration errors (missing server entry, ambiguous or absent SSH credential, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required server parameter was not supplied.
    #[error("Missing required argument '{field}'")]
    MissingArgument { field: String },

    /// Database connection errors (host unreachable, auth rejected, unknown database)
    #[error("Connection error: {0}")]
    Connection(String),

    /// SSH handshake or forwarding errors
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// Query execution errors (syntax errors, missing relations, etc.)
    #[error("Query error: {0}")]
    Query(String),

    /// Report writing errors
    #[error("Report error: {0}")]
    Report(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FleetError {
    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a missing-argument error naming the offending field.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingArgument {
            field: field.into(),
        }
    }

    /// Creates a connection error with the given message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a tunnel error with the given message.
    pub fn tunnel(msg: impl Into<String>) -> Self {
        Self::Tunnel(msg.into())
    }

    /// Creates a query error with the given message.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a report error with the given message.
    pub fn report(msg: impl Into<String>) -> Self {
        Self::Report(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Wraps a tunnel-establishment failure with the target's display name.
    ///
    /// Configuration problems (such as a missing credential) stay configuration
    /// errors; everything else becomes a tunnel error.
    pub fn with_target(self, name: &str) -> Self {
        let cause = match &self {
            Self::Config(msg) | Self::Tunnel(msg) | Self::Connection(msg) => msg.clone(),
            other => other.to_string(),
        };
        let msg = format!("SSH error with '{name}' because: {cause}");
        match self {
            Self::Config(_) | Self::MissingArgument { .. } => Self::Config(msg),
            _ => Self::Tunnel(msg),
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "Configuration Error",
            Self::MissingArgument { .. } => "Missing Argument",
            Self::Connection(_) => "Connection Error",
            Self::Tunnel(_) => "Tunnel Error",
            Self::Query(_) => "Query Error",
            Self::Report(_) => "Report Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using FleetError.
pub type Result<T> = std::result::Result<T, FleetError>;
