//! Rows written through a [`UnitOfWork`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::session::{SessionConn, UnitOfWork};

/// One accepted crawl task, as recorded in `crawl_task_log`.
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlTaskRecord {
    pub task_id: Uuid,
    pub platform: String,
    pub keywords: String,
    pub crawler_type: String,
    pub min_threshold: i64,
    pub started_at: DateTime<Utc>,
}

impl CrawlTaskRecord {
    pub async fn insert(&self, uow: &mut UnitOfWork) -> Result<()> {
        let placeholders: Vec<String> = (1..=6).map(|i| uow.placeholder(i)).collect();
        let sql = format!(
            "INSERT INTO crawl_task_log \
             (task_id, platform, keywords, crawler_type, min_threshold, started_at) \
             VALUES ({})",
            placeholders.join(", ")
        );
        let task_id = self.task_id.to_string();
        let record = self;

        macro_rules! bind_and_run {
            ($conn:expr) => {
                sqlx::query(&sql)
                    .bind(&task_id)
                    .bind(&record.platform)
                    .bind(&record.keywords)
                    .bind(&record.crawler_type)
                    .bind(record.min_threshold)
                    .bind(record.started_at)
                    .execute($conn)
                    .await?
                    .rows_affected()
            };
        }

        let _rows = match uow.conn() {
            SessionConn::Sqlite(conn) => bind_and_run!(conn),
            SessionConn::MySql(conn) => bind_and_run!(conn),
            SessionConn::Postgres(conn) => bind_and_run!(conn),
        };
        Ok(())
    }

    /// Number of log rows recorded for `task_id`.
    pub async fn count_for_task(uow: &mut UnitOfWork, task_id: Uuid) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM crawl_task_log WHERE task_id = {}",
            uow.placeholder(1)
        );
        let task_id = task_id.to_string();

        let count = match uow.conn() {
            SessionConn::Sqlite(conn) => sqlx::query_scalar(&sql).bind(&task_id).fetch_one(conn).await?,
            SessionConn::MySql(conn) => sqlx::query_scalar(&sql).bind(&task_id).fetch_one(conn).await?,
            SessionConn::Postgres(conn) => sqlx::query_scalar(&sql).bind(&task_id).fetch_one(conn).await?,
        };
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendKind;
    use crate::config::DbConfig;
    use crate::registry::EngineRegistry;
    use crate::schema::{crawl_schema, ensure_tables_exist};
    use crate::session::with_session;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_and_count_task_record() {
        let tmp = TempDir::new().unwrap();
        let config = DbConfig::default().with_sqlite_path(tmp.path().join("records.db"));
        let registry = EngineRegistry::new(Arc::new(config));
        ensure_tables_exist(&registry, BackendKind::Sqlite, &crawl_schema())
            .await
            .unwrap();

        let record = CrawlTaskRecord {
            task_id: Uuid::new_v4(),
            platform: "xhs".to_string(),
            keywords: "travel".to_string(),
            crawler_type: "search".to_string(),
            min_threshold: 10,
            started_at: Utc::now(),
        };
        let task_id = record.task_id;

        with_session(&registry, BackendKind::Sqlite, move |uow| {
            Box::pin(async move {
                let uow = uow.expect("sqlite has an engine");
                record.insert(uow).await
            })
        })
        .await
        .unwrap();

        let count = with_session(&registry, BackendKind::Sqlite, move |uow| {
            Box::pin(async move {
                let uow = uow.expect("sqlite has an engine");
                CrawlTaskRecord::count_for_task(uow, task_id).await
            })
        })
        .await
        .unwrap();
        assert_eq!(count, 1);
    }
}
