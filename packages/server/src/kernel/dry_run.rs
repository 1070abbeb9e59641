//! Default crawler: accepts the task, logs it and records it.
//!
//! Stands in for platform crawlers until one is wired in.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use crawl_storage::CrawlTaskRecord;

use super::{AutomationResource, BaseCrawler, CrawlContext, CrawlerFactory};

pub struct DryRunCrawler {
    platform: String,
}

impl DryRunCrawler {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

#[async_trait]
impl BaseCrawler for DryRunCrawler {
    async fn start(&self, ctx: &CrawlContext<'_>) -> Result<()> {
        let config = ctx.config;
        tracing::info!(
            task_id = %ctx.task_id,
            platform = %self.platform,
            keywords = %config.keywords,
            mode = %config.mode,
            min_threshold = config.min_threshold,
            save_target = %config.save_target,
            "Crawl task accepted"
        );

        let record = CrawlTaskRecord {
            task_id: ctx.task_id,
            platform: self.platform.clone(),
            keywords: config.keywords.clone(),
            crawler_type: config.mode.to_string(),
            min_threshold: config.min_threshold,
            started_at: Utc::now(),
        };

        let written = ctx
            .storage
            .with_session(config.save_target, move |uow| {
                Box::pin(async move {
                    match uow {
                        Some(uow) => record.insert(uow).await.map(|_| true),
                        None => Ok(false),
                    }
                })
            })
            .await
            .context("Failed to record crawl task")?;

        if written {
            tracing::debug!(task_id = %ctx.task_id, "Crawl task recorded");
        }
        Ok(())
    }

    fn take_resource(&mut self) -> AutomationResource {
        AutomationResource::None
    }
}

/// Factory that hands out a [`DryRunCrawler`] for any platform.
#[derive(Debug, Default, Clone)]
pub struct DryRunCrawlerFactory;

impl CrawlerFactory for DryRunCrawlerFactory {
    fn create(&self, platform: &str) -> Result<Box<dyn BaseCrawler>> {
        Ok(Box::new(DryRunCrawler::new(platform)))
    }
}
