//! Single-flight crawl task orchestration.
//!
//! The shared [`RunConfig`] lives behind the orchestrator's async mutex and
//! the mutex guard doubles as the run lock. A run walks
//! `Idle -> Configuring -> Running -> [Failed ->] Cleaning -> Idle`,
//! and the configuration is restored from its snapshot before the lock is
//! released, whatever the outcome.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crawl_storage::{crawl_schema, Schema, Storage, StorageError};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::cleanup::{cleanup, panic_message, CleanupReport};
use crate::kernel::{AutomationResource, CrawlContext, CrawlMode, CrawlerFactory, RunConfig};

/// What a second caller does while a task holds the run lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPolicy {
    /// Queue behind the in-flight task
    #[default]
    Wait,
    /// Fail immediately with [`TaskError::Busy`]
    Reject,
}

impl fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockPolicy::Wait => f.write_str("wait"),
            LockPolicy::Reject => f.write_str("reject"),
        }
    }
}

impl FromStr for LockPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wait" => Ok(LockPolicy::Wait),
            "reject" => Ok(LockPolicy::Reject),
            other => anyhow::bail!("unknown lock policy: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPhase {
    Idle,
    Configuring,
    Running,
    Failed,
    Cleaning,
}

/// Parameters of one requested crawl. Unset fields keep the current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub keywords: String,
    pub threshold: i64,
    pub platform: Option<String>,
    pub mode: Option<CrawlMode>,
}

impl TaskRequest {
    pub fn new(keywords: impl Into<String>, threshold: i64) -> Self {
        Self {
            keywords: keywords.into(),
            threshold,
            platform: None,
            mode: None,
        }
    }
}

/// A finished, successful task.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub id: Uuid,
    pub keywords: String,
    pub threshold: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cleanup: CleanupReport,
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("keywords must not be empty")]
    EmptyKeywords,

    #[error("another crawl task is already running")]
    Busy,

    #[error("crawl task was cancelled")]
    Cancelled,

    #[error("crawl failed: {0:#}")]
    Crawl(anyhow::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub struct TaskOrchestrator {
    /// Shared run configuration; holding the guard is holding the run lock
    config: Mutex<RunConfig>,
    /// Lock-free copy of `config` for readers
    config_view: watch::Sender<RunConfig>,
    storage: Arc<Storage>,
    factory: Arc<dyn CrawlerFactory>,
    lock_policy: LockPolicy,
    schema: Schema,
    phase: watch::Sender<TaskPhase>,
}

/// The run lock for one task, together with the configuration it replaced.
///
/// Dropping it puts the snapshot back and returns to `Idle` before the lock
/// is released, on every path out of a run including unwinding.
struct ActiveRun<'a> {
    orchestrator: &'a TaskOrchestrator,
    guard: MutexGuard<'a, RunConfig>,
    snapshot: RunConfig,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        *self.guard = self.snapshot.clone();
        self.orchestrator.config_view.send_replace(self.snapshot.clone());
        self.orchestrator.set_phase(TaskPhase::Idle);
    }
}

impl TaskOrchestrator {
    pub fn new(
        defaults: RunConfig,
        storage: Arc<Storage>,
        factory: Arc<dyn CrawlerFactory>,
        lock_policy: LockPolicy,
    ) -> Self {
        let (phase, _) = watch::channel(TaskPhase::Idle);
        let (config_view, _) = watch::channel(defaults.clone());
        Self {
            config: Mutex::new(defaults),
            config_view,
            storage,
            factory,
            lock_policy,
            schema: crawl_schema(),
            phase,
        }
    }

    /// Replace the tables ensured before each crawl.
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn lock_policy(&self) -> LockPolicy {
        self.lock_policy
    }

    pub fn phase(&self) -> TaskPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<TaskPhase> {
        self.phase.subscribe()
    }

    /// The configuration in effect right now. Never takes the run lock.
    pub fn current_config(&self) -> RunConfig {
        self.config_view.borrow().clone()
    }

    /// Resolves once the phase is back to `Idle`.
    pub async fn wait_idle(&self) {
        let mut phase = self.phase.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = phase.wait_for(|p| *p == TaskPhase::Idle).await;
    }

    /// Start `request` in the background and hand back its join handle.
    pub fn spawn(
        self: &Arc<Self>,
        request: TaskRequest,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<TaskRun, TaskError>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(request, cancel).await }.in_current_span())
    }

    /// Run one task to completion.
    ///
    /// The work happens on its own tokio task. Dropping the returned future
    /// cancels the task, and cleanup and restoration still finish there.
    pub async fn run(self: &Arc<Self>, request: TaskRequest, cancel: CancellationToken) -> Result<TaskRun, TaskError> {
        let keywords = request.keywords.trim().to_string();
        if keywords.is_empty() {
            return Err(TaskError::EmptyKeywords);
        }

        let id = Uuid::new_v4();
        let span = tracing::info_span!("crawl_task", task_id = %id, keywords = %keywords);

        let task_cancel = cancel.child_token();
        let _cancel_on_drop = task_cancel.clone().drop_guard();

        let this = Arc::clone(self);
        let handle = tokio::spawn(
            async move { this.run_locked(id, keywords, request, &task_cancel).await }.instrument(span),
        );

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(TaskError::Crawl(anyhow::anyhow!("crawl task aborted: {}", e))),
        }
    }

    async fn run_locked(
        &self,
        id: Uuid,
        keywords: String,
        request: TaskRequest,
        cancel: &CancellationToken,
    ) -> Result<TaskRun, TaskError> {
        let guard = self.acquire(cancel).await?;
        let started_at = Utc::now();

        self.set_phase(TaskPhase::Configuring);
        let snapshot = guard.clone();
        let mut active = ActiveRun {
            orchestrator: self,
            guard,
            snapshot,
        };
        if let Some(platform) = request.platform {
            active.guard.platform = platform;
        }
        if let Some(mode) = request.mode {
            active.guard.mode = mode;
        }
        active.guard.keywords = keywords.clone();
        active.guard.min_threshold = request.threshold;
        self.config_view.send_replace(active.guard.clone());

        self.set_phase(TaskPhase::Running);
        let (outcome, resource) = self.execute(id, &active.guard, cancel).await;

        if let Err(e) = &outcome {
            self.set_phase(TaskPhase::Failed);
            tracing::error!(error = %e, "Crawl task failed");
        }

        self.set_phase(TaskPhase::Cleaning);
        let report = cleanup(resource, &active.guard, &self.storage).await;

        // Restores the snapshot, then releases the lock
        drop(active);

        outcome?;
        let finished_at = Utc::now();
        tracing::info!(
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Crawl task finished"
        );

        Ok(TaskRun {
            id,
            keywords,
            threshold: request.threshold,
            started_at,
            finished_at,
            cleanup: report,
        })
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, RunConfig>, TaskError> {
        match self.lock_policy {
            LockPolicy::Reject => self.config.try_lock().map_err(|_| TaskError::Busy),
            LockPolicy::Wait => {
                tokio::select! {
                    guard = self.config.lock() => Ok(guard),
                    _ = cancel.cancelled() => Err(TaskError::Cancelled),
                }
            }
        }
    }

    /// Ensure tables, then drive the crawler until it finishes or `cancel` fires.
    ///
    /// The automation resource is handed back even when the crawl failed.
    /// Panics in the crawler or its factory become [`TaskError::Crawl`].
    async fn execute(
        &self,
        task_id: Uuid,
        config: &RunConfig,
        cancel: &CancellationToken,
    ) -> (Result<(), TaskError>, AutomationResource) {
        if let Err(e) = self.storage.ensure_tables_exist(config.save_target, &self.schema).await {
            return (Err(e.into()), AutomationResource::None);
        }

        let created = panic::catch_unwind(AssertUnwindSafe(|| self.factory.create(&config.platform)));
        let mut crawler = match created {
            Ok(Ok(crawler)) => crawler,
            Ok(Err(e)) => return (Err(TaskError::Crawl(e)), AutomationResource::None),
            Err(payload) => return (Err(panicked("crawler factory", payload)), AutomationResource::None),
        };

        let ctx = CrawlContext {
            task_id,
            config,
            storage: &self.storage,
            cancel,
        };

        let outcome = {
            let crawl = AssertUnwindSafe(crawler.start(&ctx)).catch_unwind();
            tokio::select! {
                result = crawl => match result {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(TaskError::Crawl(e)),
                    Err(payload) => Err(panicked("crawler", payload)),
                },
                _ = cancel.cancelled() => {
                    tracing::warn!("Crawl task cancelled");
                    Err(TaskError::Cancelled)
                }
            }
        };

        let resource = panic::catch_unwind(AssertUnwindSafe(|| crawler.take_resource()))
            .unwrap_or_else(|payload| {
                tracing::warn!(
                    error = %panic_message(payload.as_ref()),
                    "Crawler panicked handing over its automation resource"
                );
                AutomationResource::None
            });

        (outcome, resource)
    }

    fn set_phase(&self, phase: TaskPhase) {
        let previous = self.phase.send_replace(phase);
        tracing::debug!(from = ?previous, to = ?phase, "Task phase");
    }
}

fn panicked(what: &str, payload: Box<dyn Any + Send>) -> TaskError {
    TaskError::Crawl(anyhow::anyhow!("{} panicked: {}", what, panic_message(payload.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_policy_parsing() {
        assert_eq!("wait".parse::<LockPolicy>().unwrap(), LockPolicy::Wait);
        assert_eq!("Reject".parse::<LockPolicy>().unwrap(), LockPolicy::Reject);
        assert!("queue".parse::<LockPolicy>().is_err());
        assert_eq!(LockPolicy::default(), LockPolicy::Wait);
    }

    #[test]
    fn test_task_error_display_includes_cause_chain() {
        let err = TaskError::Crawl(anyhow::anyhow!("login expired").context("xhs search"));
        assert_eq!(err.to_string(), "crawl failed: xhs search: login expired");
    }
}
