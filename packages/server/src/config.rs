use anyhow::{Context, Result};
use crawl_storage::{BackendKind, DbConfig};
use dotenvy::dotenv;
use std::env;

use crate::kernel::{CrawlMode, RunConfig};
use crate::task::LockPolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Deployment-time storage target; tasks never override it
    pub save_data_option: BackendKind,
    pub platform: String,
    pub crawler_type: CrawlMode,
    pub keywords: String,
    pub min_threshold: i64,
    pub lock_policy: LockPolicy,
    pub db: DbConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8001".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            save_data_option: env::var("SAVE_DATA_OPTION")
                .unwrap_or_else(|_| "json".to_string())
                .parse()
                .context("SAVE_DATA_OPTION must name a supported backend")?,
            platform: env::var("PLATFORM").unwrap_or_else(|_| "xhs".to_string()),
            crawler_type: env::var("CRAWLER_TYPE")
                .unwrap_or_else(|_| "search".to_string())
                .parse()
                .context("CRAWLER_TYPE must be one of search, detail, creator")?,
            keywords: env::var("KEYWORDS").unwrap_or_default(),
            min_threshold: env::var("MIN_THRESHOLD")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .context("MIN_THRESHOLD must be a valid number")?,
            lock_policy: env::var("TASK_LOCK_POLICY")
                .unwrap_or_else(|_| "wait".to_string())
                .parse()
                .context("TASK_LOCK_POLICY must be wait or reject")?,
            db: DbConfig::from_env().context("Failed to load database configuration")?,
        })
    }

    /// Process-default run configuration, in effect whenever no task runs.
    pub fn run_defaults(&self) -> RunConfig {
        RunConfig {
            platform: self.platform.clone(),
            keywords: self.keywords.clone(),
            mode: self.crawler_type,
            save_target: self.save_data_option,
            min_threshold: self.min_threshold,
        }
    }
}
