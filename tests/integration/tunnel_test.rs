//! Tunneled targets over the real SSH provider.
//!
//! Nothing listens on the SSH endpoints used here, so these tests exercise
//! the failure paths without needing a server.

use std::sync::Arc;
use std::time::Duration;

use fleet_query::db::{DbParams, Endpoint, MockConnectionProvider};
use fleet_query::diagnostics::RecordingDiagnostics;
use fleet_query::error::FleetError;
use fleet_query::orchestrator::Orchestrator;
use fleet_query::report::MemoryReport;
use fleet_query::target::{ExecutionContext, Target};
use fleet_query::tunnel::{SshParams, SshTunnelProvider};

fn db(name: &str) -> DbParams {
    DbParams {
        endpoint: Endpoint::new("localhost", 5432),
        database: name.to_string(),
        user: "reader".to_string(),
        password: "secret".to_string(),
    }
}

fn unreachable_ssh() -> SshParams {
    SshParams {
        endpoint: Endpoint::new("127.0.0.1", 1),
        user: "deploy".to_string(),
        password: Some("pw".to_string()),
        key_file: None,
        passphrase: None,
    }
}

fn context(
    connections: MockConnectionProvider,
    diagnostics: Arc<RecordingDiagnostics>,
) -> ExecutionContext {
    ExecutionContext::new(
        "SELECT 1 AS x",
        Arc::new(connections),
        Arc::new(SshTunnelProvider::new().with_timeout(Some(Duration::from_secs(5)))),
        diagnostics,
    )
}

#[tokio::test]
async fn test_unreachable_bastion_is_tunnel_error() {
    let connections = MockConnectionProvider::new();
    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let ctx = context(connections.clone(), diagnostics);

    let target = Target::tunneled("edge", db("d1"), unreachable_ssh());
    let err = target.try_execute(&ctx).await.unwrap_err();

    assert!(matches!(err, FleetError::Tunnel(_)));
    assert!(err.to_string().contains("SSH error with 'edge' because:"));
    assert!(connections.connect_attempts().is_empty());
}

#[tokio::test]
async fn test_missing_key_file_fails_that_target_only() {
    let dir = tempfile::tempdir().unwrap();
    let ssh = SshParams {
        password: None,
        key_file: Some(dir.path().join("absent_key")),
        ..unreachable_ssh()
    };
    let targets = vec![
        Target::tunneled("edge", db("d1"), ssh),
        Target::direct(
            "core",
            DbParams {
                endpoint: Endpoint::new("10.0.0.5", 5432),
                ..db("d2")
            },
        ),
    ];

    let diagnostics = Arc::new(RecordingDiagnostics::new());
    let ctx = context(MockConnectionProvider::new(), diagnostics.clone());
    let mut report = MemoryReport::new();
    let summary = Orchestrator::new(ctx).run(&targets, &mut report).await;

    assert_eq!(summary.failed, vec!["edge"]);
    assert_eq!(report.names(), vec!["core"]);
    assert_eq!(diagnostics.mentioning("[edge]").len(), 1);
}
