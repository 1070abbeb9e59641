//! Engine handles: one pooled connection set per backend kind.

use std::fmt;
use std::sync::Arc;

use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::backend::BackendKind;
use crate::config::{ConnectionParams, PoolSettings};
use crate::error::{Result, StorageError};

/// Maintenance database PostgreSQL administrative connections attach to.
pub(crate) const POSTGRES_MAINTENANCE_DB: &str = "postgres";

/// The driver-specific pool behind an [`EngineHandle`].
pub enum Engine {
    Sqlite(SqlitePool),
    MySql(MySqlPool),
    Postgres(PgPool),
}

/// A cheap-to-clone reference to a cached connection pool.
///
/// Clones share the same pool; [`EngineHandle::same_pool`] compares identity.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Engine>,
}

impl EngineHandle {
    /// Open a lazily-connecting pool for `kind`.
    ///
    /// No connection is made until the first query; connect failures surface
    /// from that query. Returns `Ok(None)` for file sinks.
    pub(crate) fn open(
        kind: BackendKind,
        params: &ConnectionParams,
        pool: &PoolSettings,
    ) -> Result<Option<Self>> {
        let engine = match kind {
            BackendKind::Json | BackendKind::Csv => return Ok(None),
            BackendKind::Sqlite => Engine::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(pool.max_connections)
                    .acquire_timeout(pool.acquire_timeout)
                    .connect_lazy_with(sqlite_options(params)?),
            ),
            BackendKind::MySql => Engine::MySql(
                MySqlPoolOptions::new()
                    .max_connections(pool.max_connections)
                    .acquire_timeout(pool.acquire_timeout)
                    .connect_lazy_with(mysql_server_options(params).database(&params.database)),
            ),
            BackendKind::Postgres => Engine::Postgres(
                PgPoolOptions::new()
                    .max_connections(pool.max_connections)
                    .acquire_timeout(pool.acquire_timeout)
                    .connect_lazy_with(postgres_server_options(params).database(&params.database)),
            ),
        };

        Ok(Some(Self {
            inner: Arc::new(engine),
        }))
    }

    pub fn kind(&self) -> BackendKind {
        match self.engine() {
            Engine::Sqlite(_) => BackendKind::Sqlite,
            Engine::MySql(_) => BackendKind::MySql,
            Engine::Postgres(_) => BackendKind::Postgres,
        }
    }

    /// Get the underlying pool (escape hatch for backend-specific queries).
    pub fn engine(&self) -> &Engine {
        &self.inner
    }

    /// True when both handles refer to the same pool.
    pub fn same_pool(&self, other: &EngineHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        match self.engine() {
            Engine::Sqlite(pool) => pool.is_closed(),
            Engine::MySql(pool) => pool.is_closed(),
            Engine::Postgres(pool) => pool.is_closed(),
        }
    }

    /// Close the pool, waiting for checked-out connections to come back.
    pub(crate) async fn close(&self) {
        match self.engine() {
            Engine::Sqlite(pool) => pool.close().await,
            Engine::MySql(pool) => pool.close().await,
            Engine::Postgres(pool) => pool.close().await,
        }
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("kind", &self.kind())
            .field("closed", &self.is_closed())
            .finish()
    }
}

pub(crate) fn sqlite_options(params: &ConnectionParams) -> Result<SqliteConnectOptions> {
    let path = params.path.as_ref().ok_or(StorageError::MissingParameter {
        kind: "sqlite",
        field: "path",
    })?;

    Ok(SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true))
}

/// MySQL options without a selected database.
pub(crate) fn mysql_server_options(params: &ConnectionParams) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&params.host)
        .port(params.port)
        .username(&params.user)
        .password(params.password.expose())
}

/// PostgreSQL options without a selected database.
pub(crate) fn postgres_server_options(params: &ConnectionParams) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&params.host)
        .port(params.port)
        .username(&params.user)
        .password(params.password.expose())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_sink_opens_no_engine() {
        let params = ConnectionParams::file("unused.db");
        let handle = EngineHandle::open(BackendKind::Csv, &params, &PoolSettings::default()).unwrap();
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_sqlite_requires_path() {
        let params = ConnectionParams::server("localhost", 0, "", "", "");
        let err = EngineHandle::open(BackendKind::Sqlite, &params, &PoolSettings::default())
            .unwrap_err();
        assert!(matches!(err, StorageError::MissingParameter { field: "path", .. }));
    }

    #[tokio::test]
    async fn test_clones_share_pool() {
        let tmp = tempfile::TempDir::new().unwrap();
        let params = ConnectionParams::file(tmp.path().join("engine.db"));
        let handle = EngineHandle::open(BackendKind::Sqlite, &params, &PoolSettings::default())
            .unwrap()
            .unwrap();
        let clone = handle.clone();

        assert!(handle.same_pool(&clone));
        assert_eq!(clone.kind(), BackendKind::Sqlite);

        handle.close().await;
        assert!(clone.is_closed());
    }
}
