//! Operator-facing diagnostics.
//!
//! Validation, connection, tunnel and query failures are reported through a
//! [`Diagnostics`] handle passed into the factory, targets and orchestrator.
//! The production implementation forwards to `tracing`, whose subscriber
//! timestamps each line and writes it to both stderr and the log file.

use std::sync::{Mutex, MutexGuard};
use tracing::{error, info};

/// Sink for free-text diagnostic messages.
pub trait Diagnostics: Send + Sync {
    /// Reports a confirmation (e.g. a server entry validated).
    fn info(&self, message: &str);

    /// Reports a failure.
    fn error(&self, message: &str);
}

/// Forwards diagnostics to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn info(&self, message: &str) {
        info!(target: "diagnostics", "{message}");
    }

    fn error(&self, message: &str) {
        error!(target: "diagnostics", "{message}");
    }
}

/// Severity of a recorded diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// Captures diagnostics in memory.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    messages: Mutex<Vec<(Severity, String)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in the order they were reported.
    pub fn messages(&self) -> Vec<(Severity, String)> {
        self.lock().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.with_severity(Severity::Error)
    }

    pub fn infos(&self) -> Vec<String> {
        self.with_severity(Severity::Info)
    }

    /// Messages of any severity that mention `needle`.
    pub fn mentioning(&self, needle: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, m)| m.contains(needle))
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn with_severity(&self, severity: Severity) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Severity, String)>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn info(&self, message: &str) {
        self.lock().push((Severity::Info, message.to_string()));
    }

    fn error(&self, message: &str) {
        self.lock().push((Severity::Error, message.to_string()));
    }
}
