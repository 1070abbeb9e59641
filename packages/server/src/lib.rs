// MediaCrawler - crawl task API core
//
// Accepts crawl tasks over HTTP and runs them one at a time against a
// shared run configuration. Storage engines live in the crawl-storage crate.

pub mod config;
pub mod kernel;
pub mod server;
pub mod task;

pub use config::*;
