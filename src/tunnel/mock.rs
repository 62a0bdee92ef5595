//! Mock tunnel provider for testing.
//!
//! Hands out fake loopback endpoints and records every open and close in a
//! shared [`Journal`].

use super::{SshLogin, Tunnel, TunnelProvider};
use crate::db::{Endpoint, Journal};
use crate::error::{FleetError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// First local port handed out by the mock.
const FIRST_LOCAL_PORT: u16 = 40000;

/// A mock tunnel provider keyed by SSH host.
#[derive(Debug, Clone)]
pub struct MockTunnelProvider {
    failures: HashMap<String, String>,
    journal: Journal,
    next_port: Arc<AtomicU16>,
}

impl MockTunnelProvider {
    pub fn new() -> Self {
        Self {
            failures: HashMap::new(),
            journal: Journal::new(),
            next_port: Arc::new(AtomicU16::new(FIRST_LOCAL_PORT)),
        }
    }

    /// Records events into a shared journal.
    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    /// Makes opening a tunnel through `ssh_host` fail with `msg`.
    pub fn failing(mut self, ssh_host: impl Into<String>, msg: impl Into<String>) -> Self {
        self.failures.insert(ssh_host.into(), msg.into());
        self
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn opened(&self) -> usize {
        self.journal.count("tunnel open ")
    }

    pub fn closed(&self) -> usize {
        self.journal.count("tunnel close ")
    }
}

impl Default for MockTunnelProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TunnelProvider for MockTunnelProvider {
    async fn open(&self, login: &SshLogin, remote: &Endpoint) -> Result<Box<dyn Tunnel>> {
        let ssh_host = login.endpoint.host.clone();

        if let Some(msg) = self.failures.get(&ssh_host) {
            self.journal.record(format!("tunnel failed {ssh_host}"));
            return Err(FleetError::tunnel(msg.clone()));
        }

        let port = self.next_port.fetch_add(1, Ordering::SeqCst);
        self.journal
            .record(format!("tunnel open {ssh_host} -> {remote} on {port}"));

        Ok(Box::new(MockTunnel {
            local: Endpoint::loopback(port),
            ssh_host,
            journal: self.journal.clone(),
        }))
    }
}

/// A tunnel that only records its lifecycle.
#[derive(Debug)]
pub struct MockTunnel {
    local: Endpoint,
    ssh_host: String,
    journal: Journal,
}

#[async_trait]
impl Tunnel for MockTunnel {
    fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.journal.record(format!("tunnel close {}", self.ssh_host));
        Ok(())
    }
}
