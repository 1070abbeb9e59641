//! Schema metadata and the idempotent table initializer.
//!
//! Tables are described once and rendered per dialect. SQLite and PostgreSQL
//! are checked against their catalogs so an existing schema costs no DDL at
//! all; MySQL relies on `CREATE TABLE IF NOT EXISTS` alone.

use tracing::{info, instrument, warn};

use crate::backend::BackendKind;
use crate::engine::{Engine, EngineHandle};
use crate::error::Result;
use crate::provision::ensure_database_exists;
use crate::registry::EngineRegistry;
use crate::session::UnitOfWork;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Auto-incrementing integer primary key
    Id,
    BigInt,
    Text,
    VarChar(u16),
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
}

impl Column {
    pub const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty, nullable: false }
    }

    pub const fn optional(name: &'static str, ty: ColumnType) -> Self {
        Self { name, ty, nullable: true }
    }

    fn render(&self, kind: BackendKind) -> String {
        let ty = match (self.ty, kind) {
            (ColumnType::Id, BackendKind::MySql) => {
                return format!("{} BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY", self.name)
            }
            (ColumnType::Id, BackendKind::Postgres) => return format!("{} BIGSERIAL PRIMARY KEY", self.name),
            (ColumnType::Id, _) => return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", self.name),
            (ColumnType::BigInt, _) => "BIGINT".to_string(),
            (ColumnType::Text, _) => "TEXT".to_string(),
            (ColumnType::VarChar(len), _) => format!("VARCHAR({len})"),
            (ColumnType::Timestamp, BackendKind::MySql) => "DATETIME".to_string(),
            (ColumnType::Timestamp, BackendKind::Postgres) => "TIMESTAMPTZ".to_string(),
            (ColumnType::Timestamp, _) => "TEXT".to_string(),
        };

        if self.nullable {
            format!("{} {}", self.name, ty)
        } else {
            format!("{} {} NOT NULL", self.name, ty)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
}

impl Table {
    /// DDL for this table in the dialect of `kind`, safe to re-run.
    pub fn create_statements(&self, kind: BackendKind) -> Vec<String> {
        let mut defs: Vec<String> = self.columns.iter().map(|c| c.render(kind)).collect();

        // MySQL has no CREATE INDEX IF NOT EXISTS, so indexes go inline
        if kind == BackendKind::MySql {
            defs.extend(
                self.indexes
                    .iter()
                    .map(|idx| format!("INDEX {} ({})", idx.name, idx.columns.join(", "))),
            );
        }

        let mut statements = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.name,
            defs.join(", ")
        )];

        if kind != BackendKind::MySql {
            statements.extend(self.indexes.iter().map(|idx| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    idx.name,
                    self.name,
                    idx.columns.join(", ")
                )
            }));
        }

        statements
    }
}

/// A set of tables created together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub tables: Vec<Table>,
}

/// Tables written by crawl collaborators.
pub fn crawl_schema() -> Schema {
    use ColumnType::*;

    Schema {
        tables: vec![
            Table {
                name: "hot_article_data",
                columns: vec![
                    Column::required("id", Id),
                    Column::required("platform", VarChar(32)),
                    Column::required("note_id", VarChar(64)),
                    Column::optional("title", Text),
                    Column::optional("content", Text),
                    Column::optional("liked_count", BigInt),
                    Column::optional("source_keyword", VarChar(255)),
                    Column::optional("note_url", Text),
                    Column::required("created_at", Timestamp),
                ],
                indexes: vec![Index {
                    name: "idx_hot_article_note",
                    columns: &["platform", "note_id"],
                }],
            },
            Table {
                name: "crawl_task_log",
                columns: vec![
                    Column::required("id", Id),
                    Column::required("task_id", VarChar(36)),
                    Column::required("platform", VarChar(32)),
                    Column::required("keywords", VarChar(255)),
                    Column::required("crawler_type", VarChar(16)),
                    Column::required("min_threshold", BigInt),
                    Column::required("started_at", Timestamp),
                ],
                indexes: vec![Index {
                    name: "idx_crawl_task_log_task",
                    columns: &["task_id"],
                }],
            },
        ],
    }
}

/// Result of [`ensure_tables_exist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaOutcome {
    /// File sink; nothing to create
    NoEngine,
    /// Catalog showed every table present; no DDL issued
    AlreadyExists,
    /// Missing tables were created
    Created { tables: Vec<&'static str> },
    /// DDL issued unconditionally (no catalog check for this backend)
    Ensured { tables: Vec<&'static str> },
}

/// Make sure every table in `schema` exists on the backend for `kind`.
#[instrument(skip_all, fields(%kind))]
pub async fn ensure_tables_exist(
    registry: &EngineRegistry,
    kind: BackendKind,
    schema: &Schema,
) -> Result<SchemaOutcome> {
    // A failure here resurfaces from the DDL below if the database is really unreachable
    if let Err(err) = ensure_database_exists(kind, registry.config()).await {
        warn!(error = %err, "Database provisioning failed, continuing with schema setup");
    }

    let Some(engine) = registry.get_engine(kind).await? else {
        return Ok(SchemaOutcome::NoEngine);
    };

    let (pending, introspected) = match missing_tables(&engine, schema).await? {
        Some(missing) => (missing, true),
        None => (schema.tables.iter().collect::<Vec<_>>(), false),
    };

    if pending.is_empty() {
        info!("Tables already exist, skipping creation");
        return Ok(SchemaOutcome::AlreadyExists);
    }

    let mut uow = UnitOfWork::begin(&engine).await?;
    for table in &pending {
        for statement in table.create_statements(kind) {
            uow.execute(&statement).await?;
        }
    }
    uow.commit().await?;

    let tables: Vec<&'static str> = pending.iter().map(|t| t.name).collect();
    info!(?tables, "Ensured tables");

    Ok(if introspected {
        SchemaOutcome::Created { tables }
    } else {
        SchemaOutcome::Ensured { tables }
    })
}

/// Tables absent from the catalog, or `None` when the backend is not introspected.
async fn missing_tables<'s>(engine: &EngineHandle, schema: &'s Schema) -> Result<Option<Vec<&'s Table>>> {
    let mut missing = Vec::new();

    match engine.engine() {
        Engine::Sqlite(pool) => {
            for table in &schema.tables {
                let count: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                )
                .bind(table.name)
                .fetch_one(pool)
                .await?;
                if count == 0 {
                    missing.push(table);
                }
            }
        }
        Engine::Postgres(pool) => {
            for table in &schema.tables {
                let exists: bool = sqlx::query_scalar(
                    r#"
                    SELECT EXISTS (
                        SELECT FROM information_schema.tables
                        WHERE table_schema = current_schema()
                        AND table_name = $1
                    )
                    "#,
                )
                .bind(table.name)
                .fetch_one(pool)
                .await?;
                if !exists {
                    missing.push(table);
                }
            }
        }
        Engine::MySql(_) => return Ok(None),
    }

    Ok(Some(missing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_render_per_dialect() {
        let schema = crawl_schema();
        let log = schema.tables.iter().find(|t| t.name == "crawl_task_log").unwrap();

        let sqlite = log.create_statements(BackendKind::Sqlite);
        assert!(sqlite[0].starts_with("CREATE TABLE IF NOT EXISTS crawl_task_log"));
        assert!(sqlite[0].contains("id INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sqlite[0].contains("started_at TEXT NOT NULL"));
        assert_eq!(
            sqlite[1],
            "CREATE INDEX IF NOT EXISTS idx_crawl_task_log_task ON crawl_task_log (task_id)"
        );

        let postgres = log.create_statements(BackendKind::Postgres);
        assert!(postgres[0].contains("id BIGSERIAL PRIMARY KEY"));
        assert!(postgres[0].contains("started_at TIMESTAMPTZ NOT NULL"));

        let mysql = log.create_statements(BackendKind::MySql);
        assert_eq!(mysql.len(), 1);
        assert!(mysql[0].contains("AUTO_INCREMENT PRIMARY KEY"));
        assert!(mysql[0].contains("INDEX idx_crawl_task_log_task (task_id)"));
    }

    #[test]
    fn test_nullable_columns_omit_not_null() {
        let column = Column::optional("title", ColumnType::Text);
        assert_eq!(column.render(BackendKind::Sqlite), "title TEXT");
        let column = Column::required("note_id", ColumnType::VarChar(64));
        assert_eq!(column.render(BackendKind::MySql), "note_id VARCHAR(64) NOT NULL");
    }

    #[tokio::test]
    async fn test_ensure_tables_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let config = DbConfig::default().with_sqlite_path(tmp.path().join("db").join("schema.db"));
        let registry = EngineRegistry::new(Arc::new(config));
        let schema = crawl_schema();

        let first = ensure_tables_exist(&registry, BackendKind::Sqlite, &schema)
            .await
            .unwrap();
        assert_eq!(
            first,
            SchemaOutcome::Created {
                tables: vec!["hot_article_data", "crawl_task_log"]
            }
        );

        let second = ensure_tables_exist(&registry, BackendKind::Sqlite, &schema)
            .await
            .unwrap();
        assert_eq!(second, SchemaOutcome::AlreadyExists);
    }

    #[tokio::test]
    async fn test_ensure_tables_creates_only_missing() {
        let tmp = TempDir::new().unwrap();
        let config = DbConfig::default().with_sqlite_path(tmp.path().join("partial.db"));
        let registry = EngineRegistry::new(Arc::new(config));
        let schema = crawl_schema();

        let engine = registry.get_engine(BackendKind::Sqlite).await.unwrap().unwrap();
        let mut uow = UnitOfWork::begin(&engine).await.unwrap();
        for statement in schema.tables[0].create_statements(BackendKind::Sqlite) {
            uow.execute(&statement).await.unwrap();
        }
        uow.commit().await.unwrap();

        let outcome = ensure_tables_exist(&registry, BackendKind::Sqlite, &schema)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SchemaOutcome::Created {
                tables: vec!["crawl_task_log"]
            }
        );
    }

    #[tokio::test]
    async fn test_file_sink_has_no_schema() {
        let registry = EngineRegistry::new(Arc::new(DbConfig::default()));
        let outcome = ensure_tables_exist(&registry, BackendKind::Csv, &crawl_schema())
            .await
            .unwrap();
        assert_eq!(outcome, SchemaOutcome::NoEngine);
    }
}
