use axum::{extract::Extension, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::kernel::CrawlMode;
use crate::server::app::AppState;
use crate::task::{TaskError, TaskRequest};

const DEFAULT_THRESHOLD: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct CrawlerTaskRequest {
    pub keywords: String,
    #[serde(default)]
    pub threshold: Option<i64>,
    /// Older name for `threshold`; ignored when both are sent
    #[serde(default)]
    pub star_count: Option<i64>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub crawler_type: Option<CrawlMode>,
}

impl CrawlerTaskRequest {
    pub fn threshold(&self) -> i64 {
        self.threshold.or(self.star_count).unwrap_or(DEFAULT_THRESHOLD)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CrawlerTaskResponse {
    pub status: String,
    pub message: String,
    pub keywords: String,
    pub threshold: i64,
}

impl CrawlerTaskResponse {
    fn ok(keywords: String, threshold: i64) -> Self {
        Self {
            status: "ok".to_string(),
            message: "Crawler task created successfully".to_string(),
            keywords,
            threshold,
        }
    }

    fn error(message: String, keywords: String, threshold: i64) -> Self {
        Self {
            status: "error".to_string(),
            message,
            keywords,
            threshold,
        }
    }
}

fn status_for(error: &TaskError) -> StatusCode {
    match error {
        TaskError::EmptyKeywords => StatusCode::BAD_REQUEST,
        TaskError::Busy => StatusCode::CONFLICT,
        TaskError::Cancelled | TaskError::Crawl(_) | TaskError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Create and run a crawler task
///
/// The task runs on its own tokio task. If the client goes away the drop
/// guard cancels it, and cleanup still completes on the spawned task.
pub async fn create_task_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<CrawlerTaskRequest>,
) -> (StatusCode, Json<CrawlerTaskResponse>) {
    let keywords = body.keywords.trim().to_string();
    let threshold = body.threshold();

    if keywords.is_empty() {
        let error = TaskError::EmptyKeywords;
        return (
            status_for(&error),
            Json(CrawlerTaskResponse::error(error.to_string(), keywords, threshold)),
        );
    }

    tracing::info!(keywords = %keywords, threshold, "Crawler task requested");

    let request = TaskRequest {
        keywords: keywords.clone(),
        threshold,
        platform: body.platform,
        mode: body.crawler_type,
    };

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let result = match state.orchestrator.spawn(request, cancel).await {
        Ok(result) => result,
        Err(e) => Err(TaskError::Crawl(anyhow::anyhow!("crawl task aborted: {}", e))),
    };

    match result {
        Ok(_) => (
            StatusCode::OK,
            Json(CrawlerTaskResponse::ok(keywords, threshold)),
        ),
        Err(e) => (
            status_for(&e),
            Json(CrawlerTaskResponse::error(e.to_string(), keywords, threshold)),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> CrawlerTaskRequest {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_threshold_precedence() {
        assert_eq!(parse(r#"{"keywords": "travel", "threshold": 10, "star_count": 7}"#).threshold(), 10);
        assert_eq!(parse(r#"{"keywords": "travel", "star_count": 7}"#).threshold(), 7);
        assert_eq!(parse(r#"{"keywords": "travel"}"#).threshold(), DEFAULT_THRESHOLD);
    }
}
