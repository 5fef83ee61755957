//! Enrichment Mode Routes

use axum::{extract::State, Json};
use enrichment::{EnrichmentMode, ModeState};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;

/// Body for a mode change
#[derive(Debug, Deserialize)]
pub struct ModeChange {
    pub mode: String,
}

/// Get the mode a request without override would use
pub async fn get_mode(State(state): State<Arc<AppState>>) -> Json<ModeState> {
    Json(state.pipeline.modes().current(None).await)
}

/// Set the mode for every instance sharing the store
pub async fn set_mode(
    State(state): State<Arc<AppState>>,
    Json(change): Json<ModeChange>,
) -> Result<Json<ModeState>, ApiError> {
    let mode: EnrichmentMode = change.mode.parse().map_err(ApiError::BadRequest)?;
    Ok(Json(state.pipeline.modes().set_mode(mode).await?))
}
