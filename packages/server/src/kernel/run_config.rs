//! Shared run configuration.
//!
//! One instance lives inside the task orchestrator. Crawl collaborators only
//! ever see it through a shared reference in [`super::CrawlContext`].

use std::fmt;
use std::str::FromStr;

use crawl_storage::BackendKind;
use serde::{Deserialize, Serialize};

/// What a crawl task walks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Keyword search results
    Search,
    /// Specific post detail pages
    Detail,
    /// A creator's home page
    Creator,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlMode::Search => "search",
            CrawlMode::Detail => "detail",
            CrawlMode::Creator => "creator",
        }
    }
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrawlMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(CrawlMode::Search),
            "detail" => Ok(CrawlMode::Detail),
            "creator" => Ok(CrawlMode::Creator),
            other => anyhow::bail!("unknown crawler type: {}", other),
        }
    }
}

/// Parameters of the crawl currently in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub platform: String,
    pub keywords: String,
    pub mode: CrawlMode,
    pub save_target: BackendKind,
    pub min_threshold: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_mode_parsing() {
        assert_eq!("search".parse::<CrawlMode>().unwrap(), CrawlMode::Search);
        assert_eq!(" Detail ".parse::<CrawlMode>().unwrap(), CrawlMode::Detail);
        assert_eq!("CREATOR".parse::<CrawlMode>().unwrap(), CrawlMode::Creator);
        assert!("comments".parse::<CrawlMode>().is_err());
    }

    #[test]
    fn test_crawl_mode_serde_matches_display() {
        for mode in [CrawlMode::Search, CrawlMode::Detail, CrawlMode::Creator] {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{}\"", mode));
        }
    }
}
