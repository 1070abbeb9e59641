//! Provisioning against a real MySQL server.
//!
//! Needs Docker; run with `cargo test -p crawl-storage -- --ignored`.

use std::sync::Arc;

use crawl_storage::{
    crawl_schema, BackendKind, ConnectionParams, DbConfig, EngineRegistry, Provisioned,
    SchemaOutcome, Storage,
};
use testcontainers::runners::AsyncRunner;
use testcontainers::ContainerAsync;
use testcontainers_modules::mysql::Mysql;

async fn start_mysql() -> (ContainerAsync<Mysql>, DbConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    // Root with an empty password
    let container = Mysql::default()
        .start()
        .await
        .expect("Failed to start MySQL container");
    let host = container.get_host().await.unwrap().to_string();
    let port = container.get_host_port_ipv4(3306).await.unwrap();

    let mut config = DbConfig::default();
    config.mysql = ConnectionParams::server(host, port, "root", "", "crawl_results");
    (container, config)
}

#[tokio::test]
#[ignore = "requires docker"]
async fn provisioner_creates_mysql_database_once() {
    let (_container, config) = start_mysql().await;
    let storage = Storage::new(config);

    let first = storage.ensure_database_exists(BackendKind::MySql).await.unwrap();
    let second = storage.ensure_database_exists(BackendKind::MySql).await.unwrap();

    assert_eq!(first, Provisioned::Created);
    assert_eq!(second, Provisioned::AlreadyExisted);
}

#[tokio::test]
#[ignore = "requires docker"]
async fn concurrent_mysql_provisioning_never_errors() {
    let (_container, config) = start_mysql().await;
    let config = Arc::new(config);

    let attempts: Vec<_> = (0..4)
        .map(|_| {
            let config = config.clone();
            tokio::spawn(async move {
                crawl_storage::provision::ensure_database_exists(BackendKind::MySql, &config).await
            })
        })
        .collect();

    for attempt in attempts {
        let outcome = attempt.await.unwrap().expect("losing the race is not an error");
        assert!(matches!(
            outcome,
            Provisioned::Created | Provisioned::AlreadyExisted
        ));
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn mysql_schema_ddl_is_issued_unconditionally() {
    let (_container, config) = start_mysql().await;
    let registry = EngineRegistry::new(Arc::new(config));
    let schema = crawl_schema();

    let first = crawl_storage::schema::ensure_tables_exist(&registry, BackendKind::MySql, &schema)
        .await
        .unwrap();
    let second = crawl_storage::schema::ensure_tables_exist(&registry, BackendKind::MySql, &schema)
        .await
        .unwrap();

    let expected: Vec<&'static str> = schema.tables.iter().map(|t| t.name).collect();
    assert_eq!(first, SchemaOutcome::Ensured { tables: expected.clone() });
    assert_eq!(second, SchemaOutcome::Ensured { tables: expected });
    registry.close_all().await;
}
