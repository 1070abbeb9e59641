//! Connection parameters per backend kind.
//!
//! Read once from the environment at startup and treated as immutable
//! afterwards; the registry consults them on every cache miss.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backend::BackendKind;
use crate::error::{Result, StorageError};
use crate::secret::Password;

pub const DEFAULT_SQLITE_PATH: &str = "database/sqlite_tables.db";
pub const DEFAULT_DATABASE_NAME: &str = "media_crawler";

/// Connection parameters for one backend kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Password,
    pub database: String,
    /// Only meaningful for the embedded file database
    pub path: Option<PathBuf>,
}

impl ConnectionParams {
    /// Parameters for a networked server.
    pub fn server(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<Password>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            database: database.into(),
            path: None,
        }
    }

    /// Parameters for an embedded database file.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            host: String::new(),
            port: 0,
            user: String::new(),
            password: Password::default(),
            database: String::new(),
            path: Some(path.as_ref().to_path_buf()),
        }
    }
}

/// Pool sizing shared by every engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub max_connections: u32,
    /// Upper bound on waiting for a pooled connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Connection parameters for every relational backend.
#[derive(Debug, Clone, PartialEq)]
pub struct DbConfig {
    pub sqlite: ConnectionParams,
    pub mysql: ConnectionParams,
    pub postgres: ConnectionParams,
    pub pool: PoolSettings,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            sqlite: ConnectionParams::file(DEFAULT_SQLITE_PATH),
            mysql: ConnectionParams::server("localhost", 3306, "root", "", DEFAULT_DATABASE_NAME),
            postgres: ConnectionParams::server(
                "localhost",
                5432,
                "postgres",
                "",
                DEFAULT_DATABASE_NAME,
            ),
            pool: PoolSettings::default(),
        }
    }
}

impl DbConfig {
    /// Load connection parameters from environment variables.
    ///
    /// Unset variables fall back to local development defaults; malformed
    /// numbers are a configuration error.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            sqlite: ConnectionParams::file(
                env::var("SQLITE_DB_PATH").unwrap_or_else(|_| DEFAULT_SQLITE_PATH.to_string()),
            ),
            mysql: server_params_from_env("MYSQL_DB", &defaults.mysql)?,
            postgres: server_params_from_env("POSTGRES_DB", &defaults.postgres)?,
            pool: PoolSettings {
                max_connections: parse_env("DB_MAX_CONNECTIONS", defaults.pool.max_connections)?,
                acquire_timeout: Duration::from_secs(parse_env(
                    "DB_ACQUIRE_TIMEOUT_SECS",
                    defaults.pool.acquire_timeout.as_secs(),
                )?),
            },
        })
    }

    /// Defaults with the embedded database pointed at `path`.
    pub fn with_sqlite_path(mut self, path: impl AsRef<Path>) -> Self {
        self.sqlite = ConnectionParams::file(path);
        self
    }

    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    /// Parameters for `kind`, or `None` for file sinks.
    pub fn params(&self, kind: BackendKind) -> Option<&ConnectionParams> {
        match kind {
            BackendKind::Json | BackendKind::Csv => None,
            BackendKind::Sqlite => Some(&self.sqlite),
            BackendKind::MySql => Some(&self.mysql),
            BackendKind::Postgres => Some(&self.postgres),
        }
    }
}

fn server_params_from_env(prefix: &str, defaults: &ConnectionParams) -> Result<ConnectionParams> {
    let var = |suffix: &str| env::var(format!("{prefix}_{suffix}")).ok();

    Ok(ConnectionParams::server(
        var("HOST").unwrap_or_else(|| defaults.host.clone()),
        parse_env(&format!("{prefix}_PORT"), defaults.port)?,
        var("USER").unwrap_or_else(|| defaults.user.clone()),
        var("PWD").map(Password::from).unwrap_or_else(|| defaults.password.clone()),
        var("NAME").unwrap_or_else(|| defaults.database.clone()),
    ))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| StorageError::Config(format!("{key} must be a valid number, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}
