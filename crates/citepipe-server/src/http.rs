//! HTTP transport: `POST /research` and `GET /health`.

use crate::envelope::ApiError;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use citepipe_core::{PipelineError, PipelineResult, ResearchQuery};
use citepipe_local::{ConfigStatus, ResearchPipeline};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MAX_RESULTS: usize = 10;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<ResearchPipeline>,
    status: ConfigStatus,
    request_timeout: Option<Duration>,
}

impl AppState {
    pub fn new(
        pipeline: ResearchPipeline,
        status: ConfigStatus,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            status,
            request_timeout,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    DEFAULT_MAX_RESULTS
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/research", post(research))
        .route("/health", get(health))
        .with_state(state)
}

async fn research(
    State(state): State<AppState>,
    body: Result<Json<ResearchRequest>, JsonRejection>,
) -> Result<Json<PipelineResult>, ApiError> {
    let Json(req) = body.map_err(|rej| PipelineError::InvalidQuery(rej.body_text()))?;
    let q = ResearchQuery::new(req.query, req.max_results)?;

    let run = state.pipeline.research(&q);
    let out = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| {
            warn!(query = %q.query, timeout_ms = limit.as_millis() as u64, "research abandoned at deadline");
            ApiError::Timeout(limit)
        })?,
        None => run.await,
    };
    out.map(Json).map_err(|e| {
        warn!(query = %q.query, stage = %e.stage(), error = %e, "research failed");
        ApiError::from(e)
    })
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "name": "citepipe",
        "version": env!("CARGO_PKG_VERSION"),
        "configured": state.status,
    }))
}
