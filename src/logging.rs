//! Logging configuration for fleet-query.
//!
//! Every event goes to stderr for the operator and is appended, timestamped
//! and without colors, to a persistent log file.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Default log file name, resolved against the working directory.
pub const DEFAULT_LOG_FILE: &str = "log.txt";

/// Filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,russh=warn,sqlx=warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initializes logging to stderr and to `log_path` (appending).
///
/// If the log file cannot be opened, logging falls back to stderr only.
pub fn init_logging(log_path: &Path) {
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    let log_file = match open_log_file(log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: Could not open log file {}: {e}", log_path.display());
            tracing_subscriber::registry()
                .with(env_filter())
                .with(stderr_layer)
                .init();
            return;
        }
    };

    let file_layer = fmt::layer()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false) // No ANSI colors in file output
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stderr_layer)
        .with(file_layer)
        .init();
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
