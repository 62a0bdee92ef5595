//! Aggregated report output.
//!
//! Every server that returned rows contributes one block to a cumulative CSV
//! file: a line with the server name, a header line, then the data rows.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::debug;

use crate::db::QueryResult;
use crate::error::{FleetError, Result};

/// Receives `(server name, rows)` blocks in orchestrator order.
pub trait ReportSink {
    fn write_block(&mut self, name: &str, result: &QueryResult) -> Result<()>;
}

/// Appends blocks to a CSV file.
#[derive(Debug)]
pub struct CsvReport {
    path: PathBuf,
    blocks: usize,
}

impl CsvReport {
    /// Creates an empty report named `result_<YYYYmmdd_HHMMSS>.csv` inside
    /// `dir`, creating the directory if needed.
    pub fn timestamped(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            FleetError::report(format!(
                "Cannot create results directory {}: {e}",
                dir.display()
            ))
        })?;

        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let report = Self::at(dir.join(format!("result_{stamp}.csv")));

        // The artifact exists even when no server returns rows.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&report.path)
            .map_err(|e| {
                FleetError::report(format!(
                    "Cannot create {}: {e}",
                    report.path.display()
                ))
            })?;

        Ok(report)
    }

    /// Appends to the report at `path`. The file is created on the first block.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            blocks: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of blocks written so far.
    pub fn blocks(&self) -> usize {
        self.blocks
    }
}

impl ReportSink for CsvReport {
    fn write_block(&mut self, name: &str, result: &QueryResult) -> Result<()> {
        let path = self.path.display().to_string();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| FleetError::report(format!("Cannot open {path}: {e}")))?;

        // The name line has one field while rows have one per column.
        let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);

        let write_err =
            |e: csv::Error| FleetError::report(format!("Cannot write block for '{name}': {e}"));

        writer.write_record([name]).map_err(write_err)?;
        writer
            .write_record(result.column_names())
            .map_err(write_err)?;
        for row in &result.rows {
            writer
                .write_record(row.iter().map(|value| value.to_report_field()))
                .map_err(write_err)?;
        }
        writer
            .flush()
            .map_err(|e| FleetError::report(format!("Cannot flush {path}: {e}")))?;

        self.blocks += 1;
        debug!("Wrote {} rows for '{}' to {}", result.row_count(), name, path);
        Ok(())
    }
}

/// Keeps blocks in memory.
#[derive(Debug, Default)]
pub struct MemoryReport {
    pub blocks: Vec<(String, QueryResult)>,
}

impl MemoryReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&str> {
        self.blocks.iter().map(|(name, _)| name.as_str()).collect()
    }
}

impl ReportSink for MemoryReport {
    fn write_block(&mut self, name: &str, result: &QueryResult) -> Result<()> {
        self.blocks.push((name.to_string(), result.clone()));
        Ok(())
    }
}
