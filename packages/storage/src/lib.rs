//! Storage backend lifecycle for crawl results.
//!
//! One crate owns every connection the service opens:
//!
//! - [`backend`] - the closed set of storage targets
//! - [`config`] - connection parameters per target, loaded from the environment
//! - [`registry`] - one cached engine (connection pool) per target
//! - [`provision`] - creates the server-side database when missing
//! - [`schema`] - idempotent table creation
//! - [`session`] - scoped transactions with commit/rollback/release guarantees
//!
//! # Usage
//!
//! ```rust,ignore
//! use crawl_storage::{BackendKind, DbConfig, Storage, crawl_schema};
//!
//! let storage = Storage::new(DbConfig::from_env()?);
//! storage.ensure_tables_exist(BackendKind::Sqlite, &crawl_schema()).await?;
//!
//! storage
//!     .with_session(BackendKind::Sqlite, move |uow| {
//!         Box::pin(async move {
//!             let Some(uow) = uow else { return Ok(()) };
//!             record.insert(uow).await
//!         })
//!     })
//!     .await?;
//! ```

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod provision;
pub mod records;
pub mod registry;
pub mod schema;
pub mod secret;
pub mod session;

pub use backend::BackendKind;
pub use config::{ConnectionParams, DbConfig, PoolSettings};
pub use engine::{Engine, EngineHandle};
pub use error::{Result, StorageError};
pub use provision::Provisioned;
pub use records::CrawlTaskRecord;
pub use registry::EngineRegistry;
pub use schema::{crawl_schema, Column, ColumnType, Index, Schema, SchemaOutcome, Table};
pub use secret::Password;
pub use session::{SessionConn, UnitOfWork};

use std::sync::Arc;

use futures::future::BoxFuture;

/// Facade over the engine registry and the routines that use it.
///
/// Construct one per process and share it behind an `Arc`.
pub struct Storage {
    registry: EngineRegistry,
}

impl Storage {
    pub fn new(config: DbConfig) -> Self {
        Self {
            registry: EngineRegistry::new(Arc::new(config)),
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DbConfig {
        self.registry.config()
    }

    pub async fn get_engine(&self, kind: BackendKind) -> Result<Option<EngineHandle>> {
        self.registry.get_engine(kind).await
    }

    pub async fn close_engine(&self, kind: BackendKind) -> bool {
        self.registry.close_engine(kind).await
    }

    pub async fn close_all(&self) {
        self.registry.close_all().await
    }

    pub async fn ensure_database_exists(&self, kind: BackendKind) -> Result<Provisioned> {
        provision::ensure_database_exists(kind, self.config()).await
    }

    pub async fn ensure_tables_exist(&self, kind: BackendKind, schema: &Schema) -> Result<SchemaOutcome> {
        schema::ensure_tables_exist(&self.registry, kind, schema).await
    }

    /// Begin an explicit unit of work, or `None` for file sinks.
    pub async fn begin(&self, kind: BackendKind) -> Result<Option<UnitOfWork>> {
        match self.registry.get_engine(kind).await? {
            Some(engine) => Ok(Some(UnitOfWork::begin(&engine).await?)),
            None => Ok(None),
        }
    }

    /// See [`session::with_session`].
    pub async fn with_session<T, E, F>(&self, kind: BackendKind, body: F) -> std::result::Result<T, E>
    where
        F: for<'u> FnOnce(Option<&'u mut UnitOfWork>) -> BoxFuture<'u, std::result::Result<T, E>>,
        E: From<StorageError>,
    {
        session::with_session(&self.registry, kind, body).await
    }
}
