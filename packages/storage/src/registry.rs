//! Engine registry.
//!
//! Caches one [`EngineHandle`] per backend kind. Handles are only removed by
//! an explicit [`EngineRegistry::close_engine`] call; the registry never
//! evicts on its own.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::BackendKind;
use crate::config::DbConfig;
use crate::engine::EngineHandle;
use crate::error::Result;

pub struct EngineRegistry {
    config: Arc<DbConfig>,
    engines: Mutex<HashMap<BackendKind, EngineHandle>>,
}

impl EngineRegistry {
    pub fn new(config: Arc<DbConfig>) -> Self {
        Self {
            config,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Get the cached engine for `kind`, opening it on first use.
    ///
    /// Returns `Ok(None)` for file sinks. Repeated calls return handles that
    /// share one pool until the engine is closed.
    pub async fn get_engine(&self, kind: BackendKind) -> Result<Option<EngineHandle>> {
        let Some(params) = self.config.params(kind) else {
            return Ok(None);
        };

        let mut engines = self.engines.lock().await;
        if let Some(handle) = engines.get(&kind) {
            return Ok(Some(handle.clone()));
        }

        let Some(handle) = EngineHandle::open(kind, params, &self.config.pool)? else {
            return Ok(None);
        };
        info!(%kind, "Opened storage engine");
        engines.insert(kind, handle.clone());
        Ok(Some(handle))
    }

    /// Same as [`get_engine`](Self::get_engine), keyed by configuration name.
    pub async fn get_engine_by_name(&self, name: &str) -> Result<Option<EngineHandle>> {
        self.get_engine(name.parse()?).await
    }

    /// Whether an engine for `kind` is currently cached.
    pub async fn is_cached(&self, kind: BackendKind) -> bool {
        self.engines.lock().await.contains_key(&kind)
    }

    /// Remove the engine for `kind` from the cache and close its pool.
    ///
    /// Returns `false` when nothing was cached.
    pub async fn close_engine(&self, kind: BackendKind) -> bool {
        let removed = self.engines.lock().await.remove(&kind);
        match removed {
            Some(handle) => {
                handle.close().await;
                info!(%kind, "Closed storage engine");
                true
            }
            None => {
                debug!(%kind, "No cached engine to close");
                false
            }
        }
    }

    /// Close every cached engine (process shutdown).
    pub async fn close_all(&self) {
        let drained: Vec<_> = self.engines.lock().await.drain().collect();
        for (kind, handle) in drained {
            handle.close().await;
            info!(%kind, "Closed storage engine");
        }
    }
}
