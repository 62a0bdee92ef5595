//! russh-backed tunnel provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::keys::{load_secret_key, PrivateKeyWithHashAlg, PublicKey};
use russh::Disconnect;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::{SshCredential, SshLogin, Tunnel, TunnelProvider};
use crate::db::Endpoint;
use crate::deadline;
use crate::error::{FleetError, Result};

/// Host key policy: every server key is accepted.
struct AcceptAnyHostKey;

impl client::Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Opens tunnels over real SSH sessions.
#[derive(Debug, Clone, Default)]
pub struct SshTunnelProvider {
    timeout: Option<Duration>,
}

impl SshTunnelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the SSH handshake and authentication by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect(&self, login: &SshLogin) -> Result<Handle<AcceptAnyHostKey>> {
        let config = Arc::new(client::Config {
            inactivity_timeout: None,
            ..Default::default()
        });

        let endpoint = &login.endpoint;
        let mut handle = deadline::within(
            self.timeout,
            async {
                client::connect(
                    config,
                    (endpoint.host.as_str(), endpoint.port),
                    AcceptAnyHostKey,
                )
                .await
                .map_err(|e| FleetError::tunnel(format!("SSH connect to {endpoint} failed: {e}")))
            },
            |limit| {
                FleetError::tunnel(format!(
                    "SSH connect to {endpoint} timed out after {}s",
                    limit.as_secs()
                ))
            },
        )
        .await?;

        debug!("SSH connection established to {}", endpoint);

        deadline::within(self.timeout, authenticate(&mut handle, login), |limit| {
            FleetError::tunnel(format!(
                "SSH authentication to {endpoint} timed out after {}s",
                limit.as_secs()
            ))
        })
        .await?;

        Ok(handle)
    }
}

async fn authenticate(handle: &mut Handle<AcceptAnyHostKey>, login: &SshLogin) -> Result<()> {
    let user = &login.user;

    let result = match &login.credential {
        SshCredential::Password(password) => handle.authenticate_password(user, password).await,
        SshCredential::KeyFile { path, passphrase } => {
            let key = load_secret_key(path, passphrase.as_deref()).map_err(|e| {
                FleetError::tunnel(format!("Cannot load private key {}: {e}", path.display()))
            })?;
            // Only consulted for RSA keys.
            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .ok()
                .flatten()
                .flatten();
            let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);
            handle.authenticate_publickey(user, key).await
        }
    }
    .map_err(|e| FleetError::tunnel(format!("SSH authentication failed: {e}")))?;

    if !result.success() {
        return Err(FleetError::tunnel(format!(
            "SSH authentication rejected for user '{user}'"
        )));
    }

    debug!(user = %user, "SSH authentication successful");
    Ok(())
}

#[async_trait]
impl TunnelProvider for SshTunnelProvider {
    async fn open(&self, login: &SshLogin, remote: &Endpoint) -> Result<Box<dyn Tunnel>> {
        let handle = Arc::new(self.connect(login).await?);

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .await
            .map_err(|e| FleetError::tunnel(format!("Failed to bind local port: {e}")))?;
        let local_port = listener
            .local_addr()
            .map_err(|e| FleetError::tunnel(format!("Failed to read local port: {e}")))?
            .port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let forwarder = tokio::spawn(forward_connections(
            listener,
            handle.clone(),
            remote.clone(),
            shutdown_rx,
        ));

        info!(
            "Forwarding localhost:{} -> {} via {}",
            local_port, remote, login.endpoint
        );

        Ok(Box::new(SshTunnel {
            local: Endpoint::loopback(local_port),
            handle,
            shutdown_tx,
            forwarder,
        }))
    }
}

/// Accepts local connections until shut down, relaying each one through a
/// `direct-tcpip` channel.
async fn forward_connections(
    listener: TcpListener,
    handle: Arc<Handle<AcceptAnyHostKey>>,
    remote: Endpoint,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut relays = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("Tunnel connection from {} to {}", peer, remote);
                        let handle = handle.clone();
                        let remote = remote.clone();
                        relays.spawn(async move {
                            if let Err(e) = relay(&handle, stream, &remote).await {
                                debug!("Tunnel relay ended with error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept tunnel connection: {}", e);
                    }
                }
            }
            // Fires on an explicit close and when the tunnel is dropped.
            _ = &mut shutdown_rx => {
                debug!("Shutting down tunnel to {}", remote);
                break;
            }
        }

        while relays.try_join_next().is_some() {}
    }

    relays.shutdown().await;
}

async fn relay(
    handle: &Handle<AcceptAnyHostKey>,
    mut local: TcpStream,
    remote: &Endpoint,
) -> Result<()> {
    let channel = handle
        .channel_open_direct_tcpip(remote.host.clone(), u32::from(remote.port), "127.0.0.1", 0)
        .await
        .map_err(|e| FleetError::tunnel(format!("Failed to open channel to {remote}: {e}")))?;

    let mut remote_stream = channel.into_stream();
    tokio::io::copy_bidirectional(&mut local, &mut remote_stream)
        .await
        .map_err(|e| FleetError::tunnel(format!("Relay to {remote} failed: {e}")))?;

    Ok(())
}

/// A live SSH tunnel.
pub struct SshTunnel {
    local: Endpoint,
    handle: Arc<Handle<AcceptAnyHostKey>>,
    shutdown_tx: oneshot::Sender<()>,
    forwarder: JoinHandle<()>,
}

#[async_trait]
impl Tunnel for SshTunnel {
    fn local_endpoint(&self) -> Endpoint {
        self.local.clone()
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let SshTunnel {
            local,
            handle,
            shutdown_tx,
            forwarder,
        } = *self;

        // The forwarder may already be gone; a failed send is fine.
        let _ = shutdown_tx.send(());
        if let Err(e) = forwarder.await {
            warn!("Tunnel forwarder on {} did not stop cleanly: {}", local, e);
        }

        handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| FleetError::tunnel(format!("SSH disconnect failed: {e}")))?;

        debug!("Tunnel on {} closed", local);
        Ok(())
    }
}
