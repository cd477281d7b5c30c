//! JSON error envelope shared by the HTTP transport and the `research` command.
//!
//! Shape: `{"error": {"code", "message", "stage", "retryable"}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use citepipe_core::{PipelineError, Stage};
use std::time::Duration;

#[derive(Debug)]
pub enum ApiError {
    Pipeline(PipelineError),
    /// The caller-side deadline passed; the pipeline future was dropped.
    Timeout(Duration),
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Pipeline(e) => e.code(),
            Self::Timeout(_) => "timeout",
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Pipeline(e) => Some(e.stage()),
            Self::Timeout(_) => None,
        }
    }

    pub fn retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Pipeline(e) => match e {
                PipelineError::DiscoveryExhausted { .. }
                | PipelineError::ExtractionExhausted { .. }
                | PipelineError::SynthesisFailed(_) => true,
                // Same input gives the same answer.
                PipelineError::InvalidQuery(_)
                | PipelineError::NoSourcesFound
                | PipelineError::EmptyInput => false,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Pipeline(PipelineError::InvalidQuery(_)) => StatusCode::BAD_REQUEST,
            Self::Pipeline(PipelineError::NoSourcesFound) => StatusCode::NOT_FOUND,
            Self::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Pipeline(e) => e.to_string(),
            Self::Timeout(d) => format!("research did not finish within {}ms", d.as_millis()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.message(),
                "stage": self.stage(),
                "retryable": self.retryable(),
            }
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_json())).into_response()
    }
}
