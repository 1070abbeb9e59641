// Trait definitions for crawl collaborators
//
// The orchestrator only knows these contracts. Platform crawlers live
// behind them and are injected through a CrawlerFactory.
//
// Naming convention: Base* for collaborator traits (e.g., BaseCrawler)

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use crawl_storage::Storage;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::RunConfig;

// =============================================================================
// Crawl Context
// =============================================================================

/// Everything a crawler may read while a task runs.
pub struct CrawlContext<'a> {
    pub task_id: Uuid,
    pub config: &'a RunConfig,
    pub storage: &'a Storage,
    /// Fires when the task is cancelled; long-running crawlers should poll it
    pub cancel: &'a CancellationToken,
}

// =============================================================================
// Crawler Traits
// =============================================================================

#[async_trait]
pub trait BaseCrawler: Send + Sync {
    /// Run one crawl with the parameters in `ctx.config`
    async fn start(&self, ctx: &CrawlContext<'_>) -> Result<()>;

    /// Hand over the automation resource for teardown.
    ///
    /// Called once, after `start` finished or was abandoned.
    fn take_resource(&mut self) -> AutomationResource;
}

/// Builds the crawler for a platform name.
pub trait CrawlerFactory: Send + Sync {
    fn create(&self, platform: &str) -> Result<Box<dyn BaseCrawler>>;
}

// =============================================================================
// Automation Resources
// =============================================================================

/// Uniform teardown of a browser-automation handle.
#[async_trait]
pub trait Teardown: Send + Sync {
    async fn close(&mut self) -> Result<()>;
}

/// The automation handle a crawler holds, if any.
pub enum AutomationResource {
    /// A standalone automation driver (e.g. CDP session)
    Driver(Box<dyn Teardown>),
    /// A browser context owned by a shared browser
    BrowserContext(Box<dyn Teardown>),
    None,
}

impl AutomationResource {
    pub fn label(&self) -> &'static str {
        match self {
            AutomationResource::Driver(_) => "driver",
            AutomationResource::BrowserContext(_) => "browser_context",
            AutomationResource::None => "none",
        }
    }

    /// Close the underlying handle. Returns `None` when there was nothing to close.
    pub async fn close(self) -> Option<Result<()>> {
        match self {
            AutomationResource::Driver(mut handle) | AutomationResource::BrowserContext(mut handle) => {
                Some(handle.close().await)
            }
            AutomationResource::None => None,
        }
    }
}

impl fmt::Debug for AutomationResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AutomationResource::{}", self.label())
    }
}
