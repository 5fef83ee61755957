//! Alert History Routes

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::AlertRecord;

use crate::error::ApiError;
use crate::AppState;

/// Query parameters for alerts endpoint
#[derive(Debug, Deserialize)]
pub struct AlertQuery {
    /// Filter by fingerprint
    pub fingerprint: Option<String>,
    /// Filter by status
    pub status: Option<String>,
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Response for alerts endpoint
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    pub data: Vec<AlertRecord>,
    pub count: usize,
    pub firing_count: usize,
}

/// Get recently stored alerts, newest first
pub async fn get_alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertQuery>,
) -> Result<Json<AlertResponse>, ApiError> {
    let limit = params.limit.min(1_000);
    let records = match params.fingerprint.as_deref() {
        Some(fingerprint) => state.repository.get_by_fingerprint(fingerprint, limit),
        None => state.repository.get_recent(limit),
    }
    .map_err(|e| ApiError::Unavailable(e.to_string()))?;

    let alerts: Vec<AlertRecord> = records
        .into_iter()
        .filter(|r| {
            params
                .status
                .as_deref()
                .map_or(true, |s| r.status.eq_ignore_ascii_case(s))
        })
        .collect();

    let firing = alerts.iter().filter(|a| a.status == "firing").count();

    Ok(Json(AlertResponse {
        count: alerts.len(),
        firing_count: firing,
        data: alerts,
    }))
}
