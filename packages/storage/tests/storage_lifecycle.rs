//! Lifecycle tests for the `Storage` facade against an embedded database.

use crawl_storage::{
    crawl_schema, BackendKind, CrawlTaskRecord, DbConfig, SchemaOutcome, Storage, StorageError,
};
use chrono::Utc;
use tempfile::TempDir;
use uuid::Uuid;

fn sqlite_storage(tmp: &TempDir) -> Storage {
    Storage::new(DbConfig::default().with_sqlite_path(tmp.path().join("data").join("crawl.db")))
}

fn record(keywords: &str) -> CrawlTaskRecord {
    CrawlTaskRecord {
        task_id: Uuid::new_v4(),
        platform: "xhs".to_string(),
        keywords: keywords.to_string(),
        crawler_type: "search".to_string(),
        min_threshold: 50,
        started_at: Utc::now(),
    }
}

#[tokio::test]
async fn engine_handles_are_referentially_stable() {
    let tmp = TempDir::new().unwrap();
    let storage = sqlite_storage(&tmp);

    let handles: Vec<_> = collect_handles(&storage).await;
    for pair in handles.windows(2) {
        assert!(pair[0].same_pool(&pair[1]));
    }
}

async fn collect_handles(storage: &Storage) -> Vec<crawl_storage::EngineHandle> {
    let mut handles = Vec::new();
    for _ in 0..4 {
        handles.push(storage.get_engine(BackendKind::Sqlite).await.unwrap().unwrap());
    }
    handles
}

#[tokio::test]
async fn schema_then_session_persists_and_survives_engine_close() {
    let tmp = TempDir::new().unwrap();
    let storage = sqlite_storage(&tmp);

    let outcome = storage
        .ensure_tables_exist(BackendKind::Sqlite, &crawl_schema())
        .await
        .unwrap();
    assert!(matches!(outcome, SchemaOutcome::Created { .. }));

    let row = record("travel");
    let task_id = row.task_id;
    storage
        .with_session(BackendKind::Sqlite, move |uow| {
            Box::pin(async move {
                let Some(uow) = uow else { return Ok(()) };
                row.insert(uow).await
            })
        })
        .await
        .unwrap();

    // A fresh pool after close sees the committed row and the existing tables
    assert!(storage.close_engine(BackendKind::Sqlite).await);
    let again = storage
        .ensure_tables_exist(BackendKind::Sqlite, &crawl_schema())
        .await
        .unwrap();
    assert_eq!(again, SchemaOutcome::AlreadyExists);

    let mut uow = storage.begin(BackendKind::Sqlite).await.unwrap().unwrap();
    let count = CrawlTaskRecord::count_for_task(&mut uow, task_id).await.unwrap();
    uow.rollback().await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn explicit_rollback_discards_writes() {
    let tmp = TempDir::new().unwrap();
    let storage = sqlite_storage(&tmp);
    storage
        .ensure_tables_exist(BackendKind::Sqlite, &crawl_schema())
        .await
        .unwrap();

    let row = record("sunset");
    let task_id = row.task_id;

    let mut uow = storage.begin(BackendKind::Sqlite).await.unwrap().unwrap();
    row.insert(&mut uow).await.unwrap();
    uow.rollback().await.unwrap();

    let mut uow = storage.begin(BackendKind::Sqlite).await.unwrap().unwrap();
    assert_eq!(CrawlTaskRecord::count_for_task(&mut uow, task_id).await.unwrap(), 0);
    uow.commit().await.unwrap();
}

#[tokio::test]
async fn file_sink_begin_yields_nothing() {
    let tmp = TempDir::new().unwrap();
    let storage = sqlite_storage(&tmp);

    assert!(storage.begin(BackendKind::Json).await.unwrap().is_none());
    assert!(!storage.close_engine(BackendKind::Json).await);

    let result: Result<bool, StorageError> = storage
        .with_session(BackendKind::Csv, |uow| Box::pin(async move { Ok(uow.is_none()) }))
        .await;
    assert!(result.unwrap());
}
