// Main entry point for the crawl task API server

use std::sync::Arc;

use anyhow::{Context, Result};
use crawl_storage::Storage;
use server_core::kernel::DryRunCrawlerFactory;
use server_core::task::TaskOrchestrator;
use server_core::{server::build_app, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,server_core=debug,crawl_storage=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MediaCrawler task API");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        save_data_option = %config.save_data_option,
        platform = %config.platform,
        lock_policy = %config.lock_policy,
        "Configuration loaded"
    );

    let storage = Arc::new(Storage::new(config.db.clone()));
    let orchestrator = Arc::new(TaskOrchestrator::new(
        config.run_defaults(),
        storage.clone(),
        Arc::new(DryRunCrawlerFactory),
        config.lock_policy,
    ));

    let app = build_app(orchestrator);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down, closing database engines");
    storage.close_all().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
