// TestDependencies - mock crawl collaborators for testing
//
// Provides a configurable crawler factory that records what each crawler
// observed and how its automation resource was torn down.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use super::{AutomationResource, BaseCrawler, CrawlContext, CrawlMode, CrawlerFactory, Teardown};

// =============================================================================
// Mock Crawler
// =============================================================================

/// What a mock crawler does inside `start`
#[derive(Clone)]
pub enum MockBehavior {
    Succeed,
    Fail(String),
    Panic(String),
    /// Sleep, then succeed
    Delay(Duration),
    /// Block until notified, then succeed
    WaitFor(Arc<Notify>),
}

/// Which automation resource a mock crawler hands back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockResourceKind {
    None,
    Driver,
    BrowserContext,
}

/// Arguments captured from a start call
#[derive(Debug, Clone)]
pub struct CrawlCallArgs {
    pub task_id: Uuid,
    pub platform: String,
    pub keywords_at_start: String,
    /// `None` when the crawl failed or never finished
    pub keywords_at_end: Option<String>,
    pub mode: CrawlMode,
    pub min_threshold: i64,
}

pub struct MockCrawlerFactory {
    behavior: MockBehavior,
    resource: MockResourceKind,
    close_error: Option<String>,
    close_panic: Option<String>,
    create_error: Option<String>,
    create_panic: Option<String>,
    calls: Arc<Mutex<Vec<CrawlCallArgs>>>,
    closes: Arc<AtomicUsize>,
    started: Arc<Notify>,
}

impl MockCrawlerFactory {
    pub fn new() -> Self {
        Self {
            behavior: MockBehavior::Succeed,
            resource: MockResourceKind::None,
            close_error: None,
            close_panic: None,
            create_error: None,
            create_panic: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
            started: Arc::new(Notify::new()),
        }
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn with_resource(mut self, resource: MockResourceKind) -> Self {
        self.resource = resource;
        self
    }

    /// Make the resource's `close()` fail with this message
    pub fn with_close_error(mut self, message: &str) -> Self {
        self.close_error = Some(message.to_string());
        self
    }

    /// Make the resource's `close()` panic with this message
    pub fn with_close_panic(mut self, message: &str) -> Self {
        self.close_panic = Some(message.to_string());
        self
    }

    /// Make `create()` panic instead of returning
    pub fn with_create_panic(mut self, message: &str) -> Self {
        self.create_panic = Some(message.to_string());
        self
    }

    /// Make `create()` itself fail
    pub fn with_create_error(mut self, message: &str) -> Self {
        self.create_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<CrawlCallArgs> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of times an automation resource was closed
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Resolves once a crawler has entered `start`
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }
}

impl Default for MockCrawlerFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlerFactory for MockCrawlerFactory {
    fn create(&self, platform: &str) -> Result<Box<dyn BaseCrawler>> {
        if let Some(message) = &self.create_panic {
            panic!("{}", message);
        }
        if let Some(message) = &self.create_error {
            anyhow::bail!("{}", message);
        }

        let teardown = || -> Box<dyn Teardown> {
            Box::new(MockTeardown {
                closes: self.closes.clone(),
                error: self.close_error.clone(),
                panic: self.close_panic.clone(),
            })
        };
        let resource = match self.resource {
            MockResourceKind::None => AutomationResource::None,
            MockResourceKind::Driver => AutomationResource::Driver(teardown()),
            MockResourceKind::BrowserContext => AutomationResource::BrowserContext(teardown()),
        };

        Ok(Box::new(MockCrawler {
            platform: platform.to_string(),
            behavior: self.behavior.clone(),
            resource: Some(resource),
            calls: self.calls.clone(),
            started: self.started.clone(),
        }))
    }
}

struct MockCrawler {
    platform: String,
    behavior: MockBehavior,
    resource: Option<AutomationResource>,
    calls: Arc<Mutex<Vec<CrawlCallArgs>>>,
    started: Arc<Notify>,
}

impl MockCrawler {
    fn record(&self, ctx: &CrawlContext<'_>, keywords_at_start: String, keywords_at_end: Option<String>) {
        self.calls.lock().unwrap().push(CrawlCallArgs {
            task_id: ctx.task_id,
            platform: self.platform.clone(),
            keywords_at_start,
            keywords_at_end,
            mode: ctx.config.mode,
            min_threshold: ctx.config.min_threshold,
        });
    }
}

#[async_trait]
impl BaseCrawler for MockCrawler {
    async fn start(&self, ctx: &CrawlContext<'_>) -> Result<()> {
        let keywords_at_start = ctx.config.keywords.clone();
        self.started.notify_one();

        match &self.behavior {
            MockBehavior::Succeed => {}
            MockBehavior::Fail(message) => {
                self.record(ctx, keywords_at_start, None);
                anyhow::bail!("{}", message);
            }
            MockBehavior::Panic(message) => panic!("{}", message),
            MockBehavior::Delay(duration) => tokio::time::sleep(*duration).await,
            MockBehavior::WaitFor(notify) => notify.notified().await,
        }

        self.record(ctx, keywords_at_start, Some(ctx.config.keywords.clone()));
        Ok(())
    }

    fn take_resource(&mut self) -> AutomationResource {
        self.resource.take().unwrap_or(AutomationResource::None)
    }
}

// =============================================================================
// Mock Automation Resource
// =============================================================================

struct MockTeardown {
    closes: Arc<AtomicUsize>,
    error: Option<String>,
    panic: Option<String>,
}

#[async_trait]
impl Teardown for MockTeardown {
    async fn close(&mut self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.panic {
            panic!("{}", message);
        }
        match &self.error {
            Some(message) => anyhow::bail!("{}", message),
            None => Ok(()),
        }
    }
}
