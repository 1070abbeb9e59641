//! Crawl task lifecycle: orchestration and teardown.

pub mod cleanup;
pub mod orchestrator;

pub use cleanup::{classify, cleanup, CleanupReport, CleanupWarning};
pub use orchestrator::{LockPolicy, TaskError, TaskOrchestrator, TaskPhase, TaskRequest, TaskRun};
