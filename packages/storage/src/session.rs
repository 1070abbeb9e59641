//! Scoped transactional sessions.
//!
//! A [`UnitOfWork`] wraps one transaction on a cached engine. [`with_session`]
//! commits when the scope body succeeds and rolls back when it fails, handing
//! the body's own error back unchanged. Commit and rollback consume the
//! transaction, so its connection goes back to the pool exactly once; if the
//! scope future is dropped mid-body, dropping the transaction rolls it back
//! and releases the connection instead.

use futures::future::BoxFuture;
use sqlx::mysql::MySqlConnection;
use sqlx::postgres::PgConnection;
use sqlx::sqlite::SqliteConnection;
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use tracing::{debug, warn};

use crate::backend::BackendKind;
use crate::engine::{Engine, EngineHandle};
use crate::error::{Result, StorageError};
use crate::registry::EngineRegistry;

enum Tx {
    Sqlite(Transaction<'static, Sqlite>),
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
}

/// Borrowed driver connection inside an open transaction.
pub enum SessionConn<'a> {
    Sqlite(&'a mut SqliteConnection),
    MySql(&'a mut MySqlConnection),
    Postgres(&'a mut PgConnection),
}

/// One open transaction against one engine.
pub struct UnitOfWork {
    tx: Tx,
}

impl UnitOfWork {
    /// Begin a transaction on `engine`.
    pub async fn begin(engine: &EngineHandle) -> Result<Self> {
        let tx = match engine.engine() {
            Engine::Sqlite(pool) => Tx::Sqlite(pool.begin().await?),
            Engine::MySql(pool) => Tx::MySql(pool.begin().await?),
            Engine::Postgres(pool) => Tx::Postgres(pool.begin().await?),
        };
        Ok(Self { tx })
    }

    pub fn kind(&self) -> BackendKind {
        match self.tx {
            Tx::Sqlite(_) => BackendKind::Sqlite,
            Tx::MySql(_) => BackendKind::MySql,
            Tx::Postgres(_) => BackendKind::Postgres,
        }
    }

    /// The transaction's connection, for statements with bound parameters.
    pub fn conn(&mut self) -> SessionConn<'_> {
        match &mut self.tx {
            Tx::Sqlite(tx) => SessionConn::Sqlite(&mut **tx),
            Tx::MySql(tx) => SessionConn::MySql(&mut **tx),
            Tx::Postgres(tx) => SessionConn::Postgres(&mut **tx),
        }
    }

    /// Run a statement without parameters, returning rows affected.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        let rows = match self.conn() {
            SessionConn::Sqlite(conn) => sqlx::query(sql).execute(conn).await?.rows_affected(),
            SessionConn::MySql(conn) => sqlx::query(sql).execute(conn).await?.rows_affected(),
            SessionConn::Postgres(conn) => sqlx::query(sql).execute(conn).await?.rows_affected(),
        };
        Ok(rows)
    }

    /// Positional placeholder for parameter `index` (1-based) in this dialect.
    pub fn placeholder(&self, index: usize) -> String {
        match self.tx {
            Tx::Postgres(_) => format!("${index}"),
            Tx::Sqlite(_) | Tx::MySql(_) => "?".to_string(),
        }
    }

    pub async fn commit(self) -> Result<()> {
        match self.tx {
            Tx::Sqlite(tx) => tx.commit().await?,
            Tx::MySql(tx) => tx.commit().await?,
            Tx::Postgres(tx) => tx.commit().await?,
        }
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        match self.tx {
            Tx::Sqlite(tx) => tx.rollback().await?,
            Tx::MySql(tx) => tx.rollback().await?,
            Tx::Postgres(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}

/// Run `body` inside a transaction on the engine for `kind`.
///
/// File sinks have no engine: `body` receives `None` and is expected to skip
/// persistence. The closure must return a boxed future borrowing only the
/// unit of work, so move owned data into it:
///
/// ```rust,ignore
/// let record = record.clone();
/// storage
///     .with_session(kind, move |uow| {
///         Box::pin(async move {
///             let Some(uow) = uow else { return Ok(()) };
///             record.insert(uow).await
///         })
///     })
///     .await?;
/// ```
pub async fn with_session<T, E, F>(registry: &EngineRegistry, kind: BackendKind, body: F) -> std::result::Result<T, E>
where
    F: for<'u> FnOnce(Option<&'u mut UnitOfWork>) -> BoxFuture<'u, std::result::Result<T, E>>,
    E: From<StorageError>,
{
    let Some(engine) = registry.get_engine(kind).await? else {
        debug!(%kind, "No engine for backend, running session body without a unit of work");
        return body(None).await;
    };

    let mut uow = UnitOfWork::begin(&engine).await?;
    match body(Some(&mut uow)).await {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(%kind, error = %rollback_err, "Rollback failed after session error");
            }
            Err(err)
        }
    }
}
