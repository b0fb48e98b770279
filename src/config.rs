//! Runtime configuration for the persistence core.
//!
//! Loaded from a TOML file; credentials can be overridden through the
//! environment so they stay out of checked-in config:
//! - `CERTDIR_DB_PASSWORD` overrides `database.password`
//! - `CERTDIR_LDAP_PASSWORD` overrides `directory.bind_password`

use serde::Deserialize;
use std::path::Path;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub directory: DirectoryConfig,
}

/// Relational backend settings. `dialect` selects the executor; which of the
/// remaining fields are required depends on it (URL for postgres, the
/// username/password/connect triple for oracle).
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub dialect: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub connect_string: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    pub url: String,
    pub bind_dn: String,
    #[serde(default)]
    pub bind_password: String,
    pub base_dn: String,
    #[serde(default = "default_conn_timeout_secs")]
    pub conn_timeout_secs: u64,
    #[serde(default = "default_op_timeout_secs")]
    pub op_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout_secs() -> u64 {
    5
}

fn default_conn_timeout_secs() -> u64 {
    10
}

fn default_op_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::malformed(format!("cannot read {}: {e}", path.display())))?;
        let mut config: Config = toml::from_str(&text)
            .map_err(|e| StoreError::malformed(format!("invalid config {}: {e}", path.display())))?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(pw) = std::env::var("CERTDIR_DB_PASSWORD") {
            self.database.password = Some(pw);
        }
        if let Ok(pw) = std::env::var("CERTDIR_LDAP_PASSWORD") {
            self.directory.bind_password = pw;
        }
    }
}
