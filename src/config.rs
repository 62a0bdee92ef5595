//! Configuration management for fleet-query.
//!
//! Loads the server inventory from a TOML file. Each top-level table is one
//! server; its `database` and optional `ssh` sub-tables are kept untyped until
//! the target factory validates them.

use crate::error::{FleetError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Untyped key/value parameters, in document order.
pub type ParamMap = serde_json::Map<String, serde_json::Value>;

/// Raw configuration of a single server entry.
pub type ServerConfig = serde_json::Value;

/// Server inventory: display name to raw entry, in document order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Config {
    pub servers: ParamMap,
}

impl Config {
    /// Default config file name, resolved against the working directory.
    pub const DEFAULT_FILE: &'static str = "config.toml";

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if is_yaml(path) {
            return Err(FleetError::config(format!(
                "{} is YAML; inventories are TOML. Convert each `name:` mapping \
                 to a `[name.database]` / `[name.ssh]` table pair",
                path.display()
            )));
        }

        if !path.exists() {
            return Err(FleetError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| FleetError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            FleetError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Parses configuration from an in-memory TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Self::parse_toml(content, Path::new("<inline>"))
    }

    /// Returns the configured server names in document order.
    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.servers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Expands a leading `~` to the current user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
