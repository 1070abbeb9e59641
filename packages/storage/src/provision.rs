//! Database provisioner.
//!
//! Makes sure the target database exists before the pooled engine is used.
//! Networked servers are reached through a short-lived administrative
//! connection that is closed on every path; losing a creation race to another
//! process counts as success.

use sqlx::mysql::{MySqlConnection, MySqlDatabaseError};
use sqlx::postgres::PgConnection;
use sqlx::{Connection, Executor};
use tracing::{debug, info, instrument};

use crate::backend::BackendKind;
use crate::config::{ConnectionParams, DbConfig};
use crate::engine::{mysql_server_options, postgres_server_options, POSTGRES_MAINTENANCE_DB};
use crate::error::{Result, StorageError};

/// What the provisioner found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    /// File sinks have no database
    NotApplicable,
    /// The embedded database file is created on first write
    Implicit,
    AlreadyExisted,
    Created,
}

/// Ensure the database for `kind` exists.
#[instrument(skip_all, fields(%kind))]
pub async fn ensure_database_exists(kind: BackendKind, config: &DbConfig) -> Result<Provisioned> {
    let Some(params) = config.params(kind) else {
        return Ok(Provisioned::NotApplicable);
    };

    match kind {
        BackendKind::Json | BackendKind::Csv => Ok(Provisioned::NotApplicable),
        BackendKind::Sqlite => prepare_sqlite_dir(params).await,
        BackendKind::MySql => {
            validate_identifier(&params.database)?;
            let mut conn = MySqlConnection::connect_with(&mysql_server_options(params)).await?;
            let outcome = provision_mysql(&mut conn, &params.database).await;
            close_admin(conn.close().await);
            outcome
        }
        BackendKind::Postgres => {
            validate_identifier(&params.database)?;
            let options = postgres_server_options(params).database(POSTGRES_MAINTENANCE_DB);
            let mut conn = PgConnection::connect_with(&options).await?;
            let outcome = provision_postgres(&mut conn, &params.database).await;
            close_admin(conn.close().await);
            outcome
        }
    }
}

async fn prepare_sqlite_dir(params: &ConnectionParams) -> Result<Provisioned> {
    if let Some(parent) = params.path.as_deref().and_then(|p| p.parent()) {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(Provisioned::Implicit)
}

async fn provision_mysql(conn: &mut MySqlConnection, name: &str) -> Result<Provisioned> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
    if count > 0 {
        debug!(database = name, "Database already exists");
        return Ok(Provisioned::AlreadyExisted);
    }

    let ddl = format!("CREATE DATABASE IF NOT EXISTS `{name}`");
    create_database(conn.execute(ddl.as_str()).await.map(|_| ()), name)
}

async fn provision_postgres(conn: &mut PgConnection, name: &str) -> Result<Provisioned> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
    if exists {
        debug!(database = name, "Database already exists");
        return Ok(Provisioned::AlreadyExisted);
    }

    // CREATE DATABASE has no IF NOT EXISTS in PostgreSQL
    let ddl = format!("CREATE DATABASE \"{name}\"");
    create_database(conn.execute(ddl.as_str()).await.map(|_| ()), name)
}

fn create_database(result: std::result::Result<(), sqlx::Error>, name: &str) -> Result<Provisioned> {
    match result {
        Ok(()) => {
            info!(database = name, "Created database");
            Ok(Provisioned::Created)
        }
        Err(err) if is_already_exists(&err) => {
            debug!(database = name, "Database created concurrently by another process");
            Ok(Provisioned::AlreadyExisted)
        }
        Err(err) => Err(err.into()),
    }
}

/// Duplicate-database errors raised when another process wins the race.
fn is_already_exists(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db) = err else {
        return false;
    };

    // 42P04 duplicate_database; 23505 when both hit pg_database's unique index
    if matches!(db.code().as_deref(), Some("42P04") | Some("23505")) {
        return true;
    }

    db.try_downcast_ref::<MySqlDatabaseError>()
        .is_some_and(|e| e.number() == 1007)
}

fn close_admin(result: std::result::Result<(), sqlx::Error>) {
    if let Err(err) = result {
        debug!(error = %err, "Administrative connection did not close cleanly");
    }
}

/// Reject names that are unsafe to splice into DDL.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest && name.len() <= 63 {
        Ok(())
    } else {
        Err(StorageError::InvalidIdentifier(name.to_string()))
    }
}
