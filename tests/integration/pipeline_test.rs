//! End-to-end runs: config file, target construction, execution and report.

use std::fs;
use std::sync::Arc;

use fleet_query::config::Config;
use fleet_query::db::{ColumnInfo, Journal, MockConnectionProvider, QueryResult, Value};
use fleet_query::diagnostics::RecordingDiagnostics;
use fleet_query::orchestrator::Orchestrator;
use fleet_query::query::load_query;
use fleet_query::report::{CsvReport, ReportSink};
use fleet_query::target::{ExecutionContext, TargetFactory};
use fleet_query::tunnel::MockTunnelProvider;
use pretty_assertions::assert_eq;

const FLEET: &str = r#"
[A.database]
db_host = "10.0.0.1"
db_name = "alpha"
db_user = "reader"
db_password = "secret"

[B]
database = { db_name = "beta", db_user = "reader", db_password = "secret" }
ssh = { ssh_host = "bastion-b", ssh_user = "deploy" }

[C]
database = { db_name = "gamma", db_user = "reader", db_password = "secret" }
ssh = { ssh_host = "bastion-c", ssh_user = "deploy", ssh_password = "pw" }
"#;

struct Fixture {
    _dir: tempfile::TempDir,
    config: Config,
    sql: String,
    results_dir: std::path::PathBuf,
}

fn fixture(config: &str, sql: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    let sql_path = dir.path().join("sql.txt");
    fs::write(&config_path, config).unwrap();
    fs::write(&sql_path, sql).unwrap();

    Fixture {
        config: Config::load_from_file(&config_path).unwrap(),
        sql: load_query(&sql_path).unwrap(),
        results_dir: dir.path().join("results"),
        _dir: dir,
    }
}

#[tokio::test]
async fn test_single_direct_server_produces_one_block() {
    let fx = fixture(
        r#"
[s1.database]
db_host = "h1"
db_name = "d1"
db_user = "u1"
db_password = "p1"
"#,
        "SELECT 1 AS x",
    );
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let targets = TargetFactory::new(diagnostics.clone()).build(&fx.config);

    let connections = MockConnectionProvider::new();
    let ctx = ExecutionContext::new(
        fx.sql.as_str(),
        Arc::new(connections.clone()),
        Arc::new(MockTunnelProvider::new()),
        diagnostics.clone(),
    );
    let mut report = CsvReport::timestamped(&fx.results_dir).unwrap();
    let summary = Orchestrator::new(ctx).run(&targets, &mut report).await;

    assert_eq!(summary.reported, vec!["s1"]);
    assert_eq!(fs::read_to_string(report.path()).unwrap(), "s1\nx\n1\n");
    assert_eq!(
        connections.journal().entries(),
        vec![
            "db connect d1 via h1:5432",
            "db query d1: SELECT 1 AS x",
            "db close d1",
        ]
    );
    assert!(diagnostics.errors().is_empty());
}

#[tokio::test]
async fn test_fleet_with_one_broken_server() {
    let fx = fixture(FLEET, "SELECT 1 AS x\n");
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let targets = TargetFactory::new(diagnostics.clone()).build(&fx.config);
    assert_eq!(targets.len(), 3);

    let journal = Journal::new();
    let connections = MockConnectionProvider::new().with_journal(journal.clone());
    let tunnels = MockTunnelProvider::new().with_journal(journal.clone());
    let ctx = ExecutionContext::new(
        fx.sql.as_str(),
        Arc::new(connections),
        Arc::new(tunnels.clone()),
        diagnostics.clone(),
    );
    let mut report = CsvReport::timestamped(&fx.results_dir).unwrap();
    let summary = Orchestrator::new(ctx).run(&targets, &mut report).await;

    // B has no SSH credential: it fails without touching the network and
    // the servers around it still run.
    assert_eq!(summary.reported, vec!["A", "C"]);
    assert_eq!(summary.failed, vec!["B"]);
    assert_eq!(
        fs::read_to_string(report.path()).unwrap(),
        "A\nx\n1\nC\nx\n1\n"
    );
    assert_eq!(diagnostics.mentioning("[B]").len(), 1);
    assert!(journal.entries().iter().all(|e| !e.contains("beta")));
    assert!(journal.entries().iter().all(|e| !e.contains("bastion-b")));
    assert_eq!(tunnels.opened(), 1);
    assert_eq!(tunnels.closed(), 1);
}

#[tokio::test]
async fn test_concurrent_run_keeps_report_order() {
    let fleet = FLEET.replace(
        r#"ssh_user = "deploy" }"#,
        r#"ssh_user = "deploy", ssh_password = "pw" }"#,
    );
    let fx = fixture(&fleet, "SELECT 1 AS x");
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let targets = TargetFactory::new(diagnostics.clone()).build(&fx.config);

    let row = |n: i64| {
        QueryResult::with_data(vec![ColumnInfo::new("n", "INT8")], vec![vec![Value::Int(n)]])
    };
    let connections = MockConnectionProvider::new()
        .with_rows("alpha", row(1))
        .with_rows("beta", row(2))
        .with_rows("gamma", row(3));
    let ctx = ExecutionContext::new(
        fx.sql.as_str(),
        Arc::new(connections),
        Arc::new(MockTunnelProvider::new()),
        diagnostics.clone(),
    );
    let mut report = CsvReport::timestamped(&fx.results_dir).unwrap();
    let summary = Orchestrator::new(ctx)
        .with_concurrency(3)
        .run(&targets, &mut report)
        .await;

    assert_eq!(summary.reported, vec!["A", "B", "C"]);
    assert_eq!(
        fs::read_to_string(report.path()).unwrap(),
        "A\nn\n1\nB\nn\n2\nC\nn\n3\n"
    );
}

#[tokio::test]
async fn test_empty_results_leave_an_empty_report() {
    let fx = fixture(
        r#"
[s1.database]
db_host = "h1"
db_name = "d1"
db_user = "u1"
db_password = "p1"
"#,
        "SELECT 1 WHERE false",
    );
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let targets = TargetFactory::new(diagnostics.clone()).build(&fx.config);

    let connections = MockConnectionProvider::new().with_rows("d1", QueryResult::new());
    let ctx = ExecutionContext::new(
        fx.sql.as_str(),
        Arc::new(connections),
        Arc::new(MockTunnelProvider::new()),
        diagnostics.clone(),
    );
    let mut report = CsvReport::timestamped(&fx.results_dir).unwrap();
    let summary = Orchestrator::new(ctx).run(&targets, &mut report).await;

    assert_eq!(summary.empty, vec!["s1"]);
    assert_eq!(report.blocks(), 0);
    assert_eq!(fs::read_to_string(report.path()).unwrap(), "");
}

#[tokio::test]
async fn test_report_sink_is_object_safe() {
    struct Counting(usize);
    impl ReportSink for Counting {
        fn write_block(
            &mut self,
            _name: &str,
            _result: &QueryResult,
        ) -> fleet_query::error::Result<()> {
            self.0 += 1;
            Ok(())
        }
    }

    let fx = fixture(FLEET, "SELECT 1 AS x");
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let targets = TargetFactory::new(diagnostics.clone()).build(&fx.config);
    let ctx = ExecutionContext::new(
        fx.sql.as_str(),
        Arc::new(MockConnectionProvider::new()),
        Arc::new(MockTunnelProvider::new()),
        diagnostics,
    );

    let mut sink = Counting(0);
    Orchestrator::new(ctx).run(&targets, &mut sink).await;
    assert_eq!(sink.0, 2);
}
