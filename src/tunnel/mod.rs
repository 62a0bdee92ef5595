//! SSH tunnels to database hosts that are not directly reachable.
//!
//! A [`TunnelProvider`] opens a [`Tunnel`]: a loopback listener whose
//! connections are relayed to the remote database endpoint through an SSH
//! session. The tunnel lives for one execution and is closed exactly once.

mod mock;
mod ssh;

pub use mock::{MockTunnel, MockTunnelProvider};
pub use ssh::{SshTunnel, SshTunnelProvider};

use crate::db::Endpoint;
use crate::error::{FleetError, Result};
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// How to authenticate to the SSH server.
#[derive(Clone, PartialEq, Eq)]
pub enum SshCredential {
    Password(String),
    KeyFile {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl fmt::Debug for SshCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(***)"),
            Self::KeyFile { path, passphrase } => f
                .debug_struct("KeyFile")
                .field("path", path)
                .field("passphrase", &passphrase.as_ref().map(|_| "***"))
                .finish(),
        }
    }
}

/// SSH parameters of a tunneled target, as configured.
///
/// The credential fields are kept as given; [`SshParams::login`] resolves them
/// at execution time so a target without a credential still fails before any
/// network I/O.
#[derive(Clone, PartialEq, Eq)]
pub struct SshParams {
    pub endpoint: Endpoint,
    pub user: String,
    pub password: Option<String>,
    pub key_file: Option<PathBuf>,
    pub passphrase: Option<String>,
}

impl SshParams {
    /// Resolves the credential. Exactly one of a password or a key file must
    /// be configured.
    pub fn login(&self) -> Result<SshLogin> {
        let credential = match (&self.password, &self.key_file) {
            (Some(password), None) => SshCredential::Password(password.clone()),
            (None, Some(path)) => SshCredential::KeyFile {
                path: path.clone(),
                passphrase: self.passphrase.clone(),
            },
            (Some(_), Some(_)) => {
                return Err(FleetError::config(
                    "Ambiguous SSH credential. Set only one of ssh_password or ssh_key_file_path",
                ));
            }
            (None, None) => {
                return Err(FleetError::config(
                    "Not enough parameters to connect. \
                     You must specify ssh_password or ssh_key_file_path",
                ));
            }
        };

        Ok(SshLogin {
            endpoint: self.endpoint.clone(),
            user: self.user.clone(),
            credential,
        })
    }
}

impl fmt::Debug for SshParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshParams")
            .field("endpoint", &self.endpoint)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_file", &self.key_file)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Everything needed to log in to an SSH server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshLogin {
    pub endpoint: Endpoint,
    pub user: String,
    pub credential: SshCredential,
}

/// Opens SSH tunnels.
#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Logs in to the SSH server and starts forwarding a local loopback port
    /// to `remote` (as seen from the SSH server).
    async fn open(&self, login: &SshLogin, remote: &Endpoint) -> Result<Box<dyn Tunnel>>;
}

/// A live tunnel.
#[async_trait]
pub trait Tunnel: Send {
    /// The loopback endpoint that forwards to the remote database.
    fn local_endpoint(&self) -> Endpoint;

    /// Stops forwarding, releases the local port and ends the SSH session.
    async fn close(self: Box<Self>) -> Result<()>;
}
