//! Kernel module - crawl collaborator contracts and their implementations.

pub mod dry_run;
pub mod run_config;
pub mod test_dependencies;
pub mod traits;

pub use dry_run::{DryRunCrawler, DryRunCrawlerFactory};
pub use run_config::{CrawlMode, RunConfig};
pub use test_dependencies::{MockBehavior, MockCrawlerFactory, MockResourceKind};
pub use traits::*;
