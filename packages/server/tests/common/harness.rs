//! Test harness for orchestrator and HTTP tests.
//!
//! Every test gets its own SQLite file in a temp directory, so tests can run
//! in parallel without sharing engines or tables.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use crawl_storage::{BackendKind, DbConfig, Storage};
use server_core::kernel::{CrawlMode, CrawlerFactory, RunConfig};
use server_core::server::build_app;
use server_core::task::{LockPolicy, TaskOrchestrator};
use tempfile::TempDir;
use test_context::AsyncTestContext;

/// Test harness that owns a throwaway SQLite database.
///
/// # Example using test-context
///
/// ```ignore
/// use test_context::test_context;
///
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &TestHarness) {
///     let orchestrator = ctx.orchestrator(MockCrawlerFactory::new(), LockPolicy::Wait);
///     // ... test code
/// }
/// ```
pub struct TestHarness {
    /// Storage facade over the harness database
    pub storage: Arc<Storage>,
    /// Run configuration every orchestrator starts from
    pub defaults: RunConfig,
    tmp: TempDir,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let tmp = TempDir::new().expect("Failed to create temp dir");
        let config = DbConfig::default().with_sqlite_path(tmp.path().join("crawler.db"));

        Self {
            storage: Arc::new(Storage::new(config)),
            defaults: RunConfig {
                platform: "xhs".to_string(),
                keywords: "default keywords".to_string(),
                mode: CrawlMode::Search,
                save_target: BackendKind::Sqlite,
                min_threshold: 50,
            },
            tmp,
        }
    }

    async fn teardown(self) {
        self.storage.close_all().await;
    }
}

impl TestHarness {
    pub fn sqlite_path(&self) -> PathBuf {
        self.tmp.path().join("crawler.db")
    }

    pub fn orchestrator<F>(&self, factory: Arc<F>, policy: LockPolicy) -> Arc<TaskOrchestrator>
    where
        F: CrawlerFactory + 'static,
    {
        Arc::new(TaskOrchestrator::new(
            self.defaults.clone(),
            self.storage.clone(),
            factory,
            policy,
        ))
    }

    pub fn app(&self, orchestrator: Arc<TaskOrchestrator>) -> Router {
        build_app(orchestrator)
    }

    /// Count rows in a table of the harness database.
    pub async fn count_rows(&self, table: &str) -> i64 {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        self.storage
            .with_session(BackendKind::Sqlite, move |uow| {
                Box::pin(async move {
                    let uow = uow.expect("sqlite has an engine");
                    let crawl_storage::SessionConn::Sqlite(conn) = uow.conn() else {
                        unreachable!("harness only uses sqlite")
                    };
                    sqlx::query_scalar::<_, i64>(&sql)
                        .fetch_one(conn)
                        .await
                        .map_err(crawl_storage::StorageError::from)
                })
            })
            .await
            .expect("Failed to count rows")
    }
}
