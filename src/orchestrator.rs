//! Drives every target through one execution and forwards rows to the report.
//!
//! Targets run one at a time by default. With a concurrency above one they
//! run through a bounded pool, and results are still consumed in
//! configuration order so the report layout does not change.

use std::fmt;

use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info};

use crate::db::QueryResult;
use crate::error::Result;
use crate::report::ReportSink;
use crate::target::{ExecutionContext, Target};

/// Outcome of one run, by target name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Targets whose rows were written to the report.
    pub reported: Vec<String>,
    /// Targets whose query succeeded but returned no rows.
    pub empty: Vec<String>,
    /// Targets that failed to execute or whose block could not be written.
    pub failed: Vec<String>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.reported.len() + self.empty.len() + self.failed.len()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} servers: {} reported, {} without rows, {} failed",
            self.total(),
            self.reported.len(),
            self.empty.len(),
            self.failed.len()
        )?;
        if !self.failed.is_empty() {
            write!(f, " ({})", self.failed.join(", "))?;
        }
        Ok(())
    }
}

/// Runs targets and hands their rows to a report sink.
pub struct Orchestrator {
    ctx: ExecutionContext,
    concurrency: usize,
}

impl Orchestrator {
    /// Creates a sequential orchestrator.
    pub fn new(ctx: ExecutionContext) -> Self {
        Self {
            ctx,
            concurrency: 1,
        }
    }

    /// Allows up to `concurrency` targets in flight at once (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Executes each target, yielding results in target order.
    pub fn results<'a>(
        &'a self,
        targets: &'a [Target],
    ) -> impl Stream<Item = (&'a Target, Result<QueryResult>)> + 'a {
        stream::iter(targets)
            .map(move |target| async move { (target, target.try_execute(&self.ctx).await) })
            .buffered(self.concurrency)
    }

    /// Executes every target and writes each non-empty result to `sink`.
    ///
    /// No single target can stop the run.
    pub async fn run(&self, targets: &[Target], sink: &mut dyn ReportSink) -> RunSummary {
        let mut summary = RunSummary::default();
        let diagnostics = &self.ctx.diagnostics;

        let results = self.results(targets);
        futures::pin_mut!(results);

        while let Some((target, outcome)) = results.next().await {
            let name = target.name.clone();
            match outcome {
                Ok(rows) if rows.is_empty() => {
                    debug!("'{}' returned no rows, nothing to report", name);
                    summary.empty.push(name);
                }
                Ok(rows) => match sink.write_block(&name, &rows) {
                    Ok(()) => {
                        info!("'{}' returned {} rows", name, rows.row_count());
                        summary.reported.push(name);
                    }
                    Err(e) => {
                        diagnostics.error(&target.failure_message(&e));
                        summary.failed.push(name);
                    }
                },
                Err(e) => {
                    diagnostics.error(&target.failure_message(&e));
                    summary.failed.push(name);
                }
            }
        }

        summary
    }
}
