//! API Error Types

use alerting::PipelineError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use enrichment::ModeError;
use serde_json::json;
use thiserror::Error;

/// Errors returned to HTTP callers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<ModeError> for ApiError {
    fn from(e: ModeError) -> Self {
        match e {
            ModeError::NoSharedStore => Self::Conflict(e.to_string()),
            ModeError::Store(_) => Self::Unavailable(e.to_string()),
        }
    }
}
