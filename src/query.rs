//! Loading the fleet query text.

use std::path::Path;

use crate::error::{FleetError, Result};

/// Default query file name, resolved against the working directory.
pub const DEFAULT_QUERY_FILE: &str = "sql.txt";

/// Reads the query that every target will run.
///
/// Without a query there is nothing to do, so unreadable or blank files are
/// errors for the whole run.
pub fn load_query(path: &Path) -> Result<String> {
    let sql = std::fs::read_to_string(path).map_err(|e| {
        FleetError::config(format!(
            "Cannot read sql-file {} because: {e}",
            path.display()
        ))
    })?;

    if sql.trim().is_empty() {
        return Err(FleetError::config(format!(
            "sql-file {} is empty",
            path.display()
        )));
    }

    Ok(sql)
}
