//! Best-effort teardown after a crawl task.
//!
//! Nothing here fails: teardown errors are classified, logged and folded
//! into the [`CleanupReport`].

use std::any::Any;
use std::panic::AssertUnwindSafe;

use crawl_storage::Storage;
use futures::FutureExt;

use crate::kernel::{AutomationResource, RunConfig};

/// Error text that means the handle was already gone before we closed it.
const ALREADY_CLOSED_MARKERS: &[&str] = &[
    "already closed",
    "has been closed",
    "target closed",
    "browser closed",
    "disconnected",
    "connection closed",
];

/// A suppressed teardown error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupWarning {
    /// Resource was already closed or disconnected
    AlreadyClosed(String),
    /// Any other teardown failure
    Unexpected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Which automation resource variant was torn down
    pub resource: &'static str,
    pub warning: Option<CleanupWarning>,
    /// Whether a cached engine for the save target was closed
    pub engine_closed: bool,
}

/// Sort a teardown error into a [`CleanupWarning`].
pub fn classify(error: &anyhow::Error) -> CleanupWarning {
    let message = format!("{:#}", error);
    let lowered = message.to_lowercase();
    if ALREADY_CLOSED_MARKERS.iter().any(|marker| lowered.contains(marker)) {
        CleanupWarning::AlreadyClosed(message)
    } else {
        CleanupWarning::Unexpected(message)
    }
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Close the automation resource, then the save target's engine.
pub async fn cleanup(resource: AutomationResource, config: &RunConfig, storage: &Storage) -> CleanupReport {
    let label = resource.label();

    let closed = AssertUnwindSafe(resource.close()).catch_unwind().await;
    let warning = match closed {
        Ok(None) | Ok(Some(Ok(()))) => None,
        Err(payload) => {
            let message = format!("teardown panicked: {}", panic_message(payload.as_ref()));
            tracing::warn!(resource = label, error = %message, "Automation resource panicked on close");
            Some(CleanupWarning::Unexpected(message))
        }
        Ok(Some(Err(e))) => {
            let warning = classify(&e);
            match &warning {
                CleanupWarning::AlreadyClosed(message) => {
                    tracing::debug!(resource = label, error = %message, "Automation resource already closed");
                }
                CleanupWarning::Unexpected(message) => {
                    tracing::warn!(resource = label, error = %message, "Unexpected error closing automation resource");
                }
            }
            Some(warning)
        }
    };

    let engine_closed = if config.save_target.has_engine() {
        storage.close_engine(config.save_target).await
    } else {
        false
    };

    tracing::debug!(
        resource = label,
        engine_closed,
        save_target = %config.save_target,
        "Cleanup finished"
    );

    CleanupReport {
        resource: label,
        warning,
        engine_closed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Context};

    #[test]
    fn test_classify_already_closed() {
        let err = anyhow!("Target closed");
        assert!(matches!(classify(&err), CleanupWarning::AlreadyClosed(_)));

        let err = anyhow!("Browser has been closed");
        assert!(matches!(classify(&err), CleanupWarning::AlreadyClosed(_)));

        let err = anyhow!("websocket DISCONNECTED");
        assert!(matches!(classify(&err), CleanupWarning::AlreadyClosed(_)));
    }

    #[test]
    fn test_classify_looks_at_whole_chain() {
        let err = Err::<(), _>(anyhow!("connection closed by peer"))
            .context("Failed to close driver")
            .unwrap_err();
        assert!(matches!(classify(&err), CleanupWarning::AlreadyClosed(_)));
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(payload.as_ref()), "kaboom");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_classify_unexpected() {
        let err = anyhow!("permission denied");
        assert_eq!(
            classify(&err),
            CleanupWarning::Unexpected("permission denied".to_string())
        );
    }
}
