//! Backend descriptor.
//!
//! A closed set of storage targets. File sinks write flat files and never
//! hold a live connection; the relational kinds each get one pooled engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Storage target for crawl results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// JSON files on disk (no engine)
    #[serde(rename = "json")]
    Json,
    /// CSV files on disk (no engine)
    #[serde(rename = "csv")]
    Csv,
    /// Embedded SQLite database file
    #[serde(rename = "sqlite")]
    Sqlite,
    /// Networked MySQL server
    #[serde(rename = "mysql", alias = "db")]
    MySql,
    /// Networked PostgreSQL server
    #[serde(rename = "pgsql", alias = "postgres", alias = "postgresql")]
    Postgres,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Json,
        BackendKind::Csv,
        BackendKind::Sqlite,
        BackendKind::MySql,
        BackendKind::Postgres,
    ];

    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Json => "json",
            BackendKind::Csv => "csv",
            BackendKind::Sqlite => "sqlite",
            BackendKind::MySql => "mysql",
            BackendKind::Postgres => "pgsql",
        }
    }

    /// True for flat-file outputs, which never get an engine.
    pub fn is_file_sink(&self) -> bool {
        matches!(self, BackendKind::Json | BackendKind::Csv)
    }

    /// True when a pooled engine exists for this kind.
    pub fn has_engine(&self) -> bool {
        !self.is_file_sink()
    }

    /// True for backends reached over the network (need a server-side database).
    pub fn is_networked(&self) -> bool {
        matches!(self, BackendKind::MySql | BackendKind::Postgres)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(BackendKind::Json),
            "csv" => Ok(BackendKind::Csv),
            "sqlite" => Ok(BackendKind::Sqlite),
            "mysql" | "db" => Ok(BackendKind::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(BackendKind::Postgres),
            _ => Err(StorageError::UnsupportedBackendKind(s.to_string())),
        }
    }
}
