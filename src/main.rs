//! fleet-query - Run one SQL query across a fleet of Postgres servers.

mod cli;

use std::sync::Arc;

use cli::Cli;
use fleet_query::config::Config;
use fleet_query::db::PostgresProvider;
use fleet_query::diagnostics::{Diagnostics, TracingDiagnostics};
use fleet_query::error::Result;
use fleet_query::logging;
use fleet_query::orchestrator::Orchestrator;
use fleet_query::query::load_query;
use fleet_query::report::CsvReport;
use fleet_query::target::{ExecutionContext, TargetFactory};
use fleet_query::tunnel::SshTunnelProvider;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    logging::init_logging(&cli.log_file);

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let diagnostics: Arc<dyn Diagnostics> = Arc::new(TracingDiagnostics);

    let config = Config::load_from_file(&cli.config)?;
    diagnostics.info(&format!("{} was read successfully", cli.config.display()));

    // Every target needs the query, so a missing one ends the run here.
    let sql = load_query(&cli.query)?;

    let targets = TargetFactory::new(diagnostics.clone()).build(&config);
    if targets.is_empty() {
        warn!("No valid servers in {}", cli.config.display());
    }

    let mut report = CsvReport::timestamped(&cli.results_dir)?;

    let ctx = ExecutionContext::new(
        sql,
        Arc::new(PostgresProvider::new().with_timeout(cli.timeout())),
        Arc::new(SshTunnelProvider::new().with_timeout(cli.timeout())),
        diagnostics,
    );
    let orchestrator = Orchestrator::new(ctx).with_concurrency(cli.concurrency());

    let summary = orchestrator.run(&targets, &mut report).await;

    info!("{}", summary);
    info!(
        "Report with {} blocks written to {}",
        report.blocks(),
        report.path().display()
    );

    Ok(())
}
