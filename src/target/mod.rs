//! Targets: one configured server plus the route used to reach it.
//!
//! A target is either reached directly or through an SSH tunnel. Executing a
//! target opens whatever resources its route needs, runs the fleet query and
//! tears everything down again before returning. Within one execution the
//! tunnel opens before the database connection and closes after it.

mod factory;

pub use factory::TargetFactory;

use std::sync::Arc;

use tracing::{debug, Instrument};

use crate::db::{ConnectionProvider, DbParams, QueryResult};
use crate::diagnostics::Diagnostics;
use crate::error::Result;
use crate::tunnel::{SshParams, TunnelProvider};

/// Name given to a target constructed without one.
pub const DEFAULT_TARGET_NAME: &str = "NoName";

/// How a target's database is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Direct,
    Tunneled(SshParams),
}

/// A validated server entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub db: DbParams,
    pub route: Route,
}

/// Collaborators shared by every execution in a run.
#[derive(Clone)]
pub struct ExecutionContext {
    /// The fleet query, opaque to this layer.
    pub sql: Arc<str>,
    pub connections: Arc<dyn ConnectionProvider>,
    pub tunnels: Arc<dyn TunnelProvider>,
    pub diagnostics: Arc<dyn Diagnostics>,
}

impl ExecutionContext {
    pub fn new(
        sql: impl Into<Arc<str>>,
        connections: Arc<dyn ConnectionProvider>,
        tunnels: Arc<dyn TunnelProvider>,
        diagnostics: Arc<dyn Diagnostics>,
    ) -> Self {
        Self {
            sql: sql.into(),
            connections,
            tunnels,
            diagnostics,
        }
    }
}

impl Target {
    pub fn direct(name: impl Into<String>, db: DbParams) -> Self {
        Self {
            name: name.into(),
            db,
            route: Route::Direct,
        }
    }

    pub fn tunneled(name: impl Into<String>, db: DbParams, ssh: SshParams) -> Self {
        Self {
            name: name.into(),
            db,
            route: Route::Tunneled(ssh),
        }
    }

    pub fn is_tunneled(&self) -> bool {
        matches!(self.route, Route::Tunneled(_))
    }

    /// Runs the fleet query, returning the rows or the first failure.
    pub async fn try_execute(&self, ctx: &ExecutionContext) -> Result<QueryResult> {
        let span = tracing::info_span!("target", name = %self.name);
        async {
            match &self.route {
                Route::Direct => run_query(ctx, &self.db).await,
                Route::Tunneled(ssh) => self.execute_tunneled(ctx, ssh).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Runs the fleet query, reporting any failure as a diagnostic and
    /// returning an empty result in its place.
    pub async fn execute(&self, ctx: &ExecutionContext) -> QueryResult {
        match self.try_execute(ctx).await {
            Ok(result) => result,
            Err(e) => {
                ctx.diagnostics.error(&self.failure_message(&e));
                QueryResult::new()
            }
        }
    }

    /// Diagnostic line for a failed execution.
    pub fn failure_message(&self, error: &crate::error::FleetError) -> String {
        format!("[{}] {}", self.name, error)
    }

    async fn execute_tunneled(
        &self,
        ctx: &ExecutionContext,
        ssh: &SshParams,
    ) -> Result<QueryResult> {
        // Credential problems fail here, before any network I/O.
        let login = ssh.login().map_err(|e| e.with_target(&self.name))?;

        debug!("Opening tunnel via {}", login.endpoint);
        let tunnel = ctx
            .tunnels
            .open(&login, &self.db.endpoint)
            .await
            .map_err(|e| e.with_target(&self.name))?;

        let local = tunnel.local_endpoint();
        debug!("Tunnel open, {} reachable on {}", self.db.endpoint, local);

        // run_query closes its connection before returning.
        let result = run_query(ctx, &self.db.via(local)).await;

        debug!("Closing tunnel via {}", login.endpoint);
        if let Err(e) = tunnel.close().await {
            ctx.diagnostics
                .error(&format!("[{}] Failed to close tunnel: {}", self.name, e));
        }

        result
    }
}

/// Connects, runs the query and closes the connection whatever the outcome.
async fn run_query(ctx: &ExecutionContext, params: &DbParams) -> Result<QueryResult> {
    debug!("Connecting to {}", params.display_string());
    let mut client = ctx.connections.connect(params).await?;

    let result = client.execute_query(&ctx.sql).await;
    if let Ok(rows) = &result {
        debug!(
            "Query returned {} rows in {:?}",
            rows.row_count(),
            rows.execution_time
        );
    }

    if let Err(e) = client.close().await {
        debug!("Closing connection to {} failed: {}", params.endpoint, e);
    }

    result
}
