//! Builds validated targets from the raw server inventory.

use std::sync::Arc;

use serde_json::Value as ConfigValue;

use super::{Target, DEFAULT_TARGET_NAME};
use crate::config::{expand_home, Config, ParamMap, ServerConfig};
use crate::db::{DbParams, Endpoint, DEFAULT_DB_PORT};
use crate::diagnostics::Diagnostics;
use crate::error::{FleetError, Result};
use crate::tunnel::{SshParams, DEFAULT_SSH_PORT};

/// Database host of a tunneled target when none is configured, as seen from
/// the SSH server.
const DEFAULT_TUNNELED_DB_HOST: &str = "localhost";

/// Converts server entries into targets, skipping and reporting bad ones.
pub struct TargetFactory {
    diagnostics: Arc<dyn Diagnostics>,
}

impl TargetFactory {
    pub fn new(diagnostics: Arc<dyn Diagnostics>) -> Self {
        Self { diagnostics }
    }

    /// Builds one target per valid entry, in configuration order.
    ///
    /// Invalid entries produce a single diagnostic each and are left out.
    pub fn build(&self, config: &Config) -> Vec<Target> {
        let mut targets = Vec::with_capacity(config.len());

        for (name, entry) in &config.servers {
            match self.build_one(name, entry) {
                Ok(target) => {
                    self.diagnostics
                        .info(&format!("config for {name} is correct"));
                    targets.push(target);
                }
                Err(e) => self.diagnostics.error(&describe_rejection(name, &e)),
            }
        }

        targets
    }

    /// Builds a single target from its raw entry.
    pub fn build_one(&self, name: &str, entry: &ServerConfig) -> Result<Target> {
        let entry = entry
            .as_object()
            .ok_or_else(|| FleetError::config(format!("Entry for '{name}' must be a table")))?;

        let database = section(entry, "database", name)?
            .filter(|params| !params.is_empty())
            .ok_or_else(|| FleetError::missing("database"))?;

        for key in entry.keys().filter(|k| *k != "database" && *k != "ssh") {
            self.report_unexpected(name, key);
        }

        match section(entry, "ssh", name)?.filter(|params| !params.is_empty()) {
            Some(ssh) => {
                // SSH keys override database keys of the same name.
                let mut merged = database.clone();
                merged.extend(ssh.iter().map(|(k, v)| (k.clone(), v.clone())));
                self.tunneled(name, merged)
            }
            None => self.direct(name, database.clone()),
        }
    }

    fn direct(&self, name: &str, params: ParamMap) -> Result<Target> {
        let mut params = Params::new(name, params);

        let host = params.required_string("db_host")?;
        let database = params.required_string("db_name")?;
        let user = params.required_string("db_user")?;
        let password = params.required_string("db_password")?;
        let port = params.port("db_port")?.unwrap_or(DEFAULT_DB_PORT);
        let target_name = params.name()?;

        self.finish(&params);

        Ok(Target::direct(
            target_name,
            DbParams {
                endpoint: Endpoint::new(host, port),
                database,
                user,
                password,
            },
        ))
    }

    fn tunneled(&self, name: &str, params: ParamMap) -> Result<Target> {
        let mut params = Params::new(name, params);

        let ssh_host = params.required_string("ssh_host")?;
        let ssh_user = params.required_string("ssh_user")?;
        let database = params.required_string("db_name")?;
        let user = params.required_string("db_user")?;
        let password = params.required_string("db_password")?;
        let ssh_port = params.port("ssh_port")?.unwrap_or(DEFAULT_SSH_PORT);
        let db_host = params
            .string("db_host")?
            .unwrap_or_else(|| DEFAULT_TUNNELED_DB_HOST.to_string());
        let db_port = params.port("db_port")?.unwrap_or(DEFAULT_DB_PORT);
        let ssh_password = params.string("ssh_password")?;
        let key_file = params
            .string("ssh_key_file_path")?
            .map(|path| expand_home(&path));
        let passphrase = params.string("ssh_passphrase")?;
        let target_name = params.name()?;

        self.finish(&params);

        Ok(Target::tunneled(
            target_name,
            DbParams {
                endpoint: Endpoint::new(db_host, db_port),
                database,
                user,
                password,
            },
            SshParams {
                endpoint: Endpoint::new(ssh_host, ssh_port),
                user: ssh_user,
                password: ssh_password,
                key_file,
                passphrase,
            },
        ))
    }

    /// Reports any parameters nothing consumed.
    fn finish(&self, params: &Params<'_>) {
        for key in params.remaining() {
            self.report_unexpected(params.server, key);
        }
    }

    fn report_unexpected(&self, server: &str, key: &str) {
        self.diagnostics.error(&format!(
            "Unexpected argument '{key}' for {server} in config, ignoring it"
        ));
    }
}

/// Reads an optional sub-table of a server entry.
fn section<'a>(entry: &'a ParamMap, key: &str, name: &str) -> Result<Option<&'a ParamMap>> {
    match entry.get(key) {
        None | Some(ConfigValue::Null) => Ok(None),
        Some(ConfigValue::Object(params)) => Ok(Some(params)),
        Some(_) => Err(FleetError::config(format!(
            "'{key}' for '{name}' must be a table"
        ))),
    }
}

/// Diagnostic line for a rejected server entry.
fn describe_rejection(name: &str, error: &FleetError) -> String {
    match error {
        FleetError::MissingArgument { field } => {
            format!("Missing required argument '{field}' for '{name}' in config")
        }
        FleetError::Config(msg) => msg.clone(),
        other => format!("Unexpected error for '{name}': {other}"),
    }
}

/// Parameter map that tracks which keys have been consumed.
struct Params<'a> {
    server: &'a str,
    values: ParamMap,
}

impl<'a> Params<'a> {
    fn new(server: &'a str, values: ParamMap) -> Self {
        Self { server, values }
    }

    fn take(&mut self, key: &str) -> Option<ConfigValue> {
        match self.values.remove(key) {
            None | Some(ConfigValue::Null) => None,
            Some(value) => Some(value),
        }
    }

    /// Scalars are accepted as text; numbers and booleans are stringified.
    fn string(&mut self, key: &str) -> Result<Option<String>> {
        match self.take(key) {
            None => Ok(None),
            Some(ConfigValue::String(s)) => Ok(Some(s)),
            Some(ConfigValue::Number(n)) => Ok(Some(n.to_string())),
            Some(ConfigValue::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(self.invalid(key, "expected a string")),
        }
    }

    fn required_string(&mut self, key: &str) -> Result<String> {
        self.string(key)?.ok_or_else(|| FleetError::missing(key))
    }

    fn port(&mut self, key: &str) -> Result<Option<u16>> {
        let port = match self.take(key) {
            None => return Ok(None),
            Some(ConfigValue::Number(n)) => n.as_u64(),
            Some(ConfigValue::String(s)) => s.trim().parse::<u64>().ok(),
            Some(_) => None,
        };

        port.and_then(|p| u16::try_from(p).ok())
            .filter(|p| *p != 0)
            .map(Some)
            .ok_or_else(|| self.invalid(key, "expected a port number between 1 and 65535"))
    }

    /// Display name: an explicit `name` parameter, else the entry key.
    fn name(&mut self) -> Result<String> {
        let name = self.string("name")?.unwrap_or_else(|| self.server.to_string());
        if name.is_empty() {
            return Ok(DEFAULT_TARGET_NAME.to_string());
        }
        Ok(name)
    }

    fn remaining(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    fn invalid(&self, key: &str, expected: &str) -> FleetError {
        FleetError::config(format!(
            "Invalid value for '{key}' of '{}': {expected}",
            self.server
        ))
    }
}
