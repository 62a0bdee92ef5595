//! Command-line argument parsing for fleet-query.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use fleet_query::config::Config;
use fleet_query::logging::DEFAULT_LOG_FILE;
use fleet_query::query::DEFAULT_QUERY_FILE;

/// Run one SQL query against every configured Postgres server and collect the
/// results into a single CSV report.
#[derive(Parser, Debug)]
#[command(name = "fleet-query")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Server inventory (TOML)
    #[arg(
        long,
        value_name = "PATH",
        default_value = Config::DEFAULT_FILE,
        env = "FLEET_QUERY_CONFIG"
    )]
    pub config: PathBuf,

    /// File containing the SQL query to run on every server
    #[arg(long, value_name = "PATH", default_value = DEFAULT_QUERY_FILE)]
    pub query: PathBuf,

    /// Directory receiving the timestamped CSV report
    #[arg(long, value_name = "DIR", default_value = "results")]
    pub results_dir: PathBuf,

    /// Log file (appended to)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,

    /// Number of servers queried at once
    #[arg(
        short = 'j',
        long,
        value_name = "N",
        default_value = "1",
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub concurrency: u16,

    /// Timeout in seconds for each SSH or database connect and each query
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn concurrency(&self) -> usize {
        usize::from(self.concurrency)
    }
}
