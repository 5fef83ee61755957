//! Webhook Routes

use axum::{
    body::Bytes,
    extract::{Query, State},
    Json,
};
use alerting::{BatchResponse, WebhookPayload};
use coordination::{run_idempotent, IdempotencyScope, Idempotent};
use enrichment::EnrichmentMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::AppState;

/// Query parameters for the webhook endpoint
#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    /// Explicit enrichment mode for this request
    pub mode: Option<String>,
}

/// Response for the webhook endpoint
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    /// Batch was already accepted within the idempotency window
    pub duplicate: bool,
    pub idempotency_scope: IdempotencyScope,
    #[serde(flatten)]
    pub result: Option<BatchResponse>,
}

fn parse_mode(raw: Option<&str>) -> Result<Option<EnrichmentMode>, ApiError> {
    raw.filter(|m| !m.is_empty())
        .map(|m| m.parse::<EnrichmentMode>().map_err(ApiError::BadRequest))
        .transpose()
}

/// Ingest a batch, suppressing resubmissions of the same batch
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WebhookQuery>,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let mode = parse_mode(params.mode.as_deref())?;
    let payload = WebhookPayload::from_json(&body)?;
    let key = payload.idempotency_key(mode);

    let outcome = run_idempotent(
        &state.coordinator,
        &key,
        state.config.idempotency_ttl(),
        state.pipeline.process(payload, mode),
    )
    .await;

    let scope = outcome.scope();
    Ok(Json(match outcome {
        Idempotent::Executed { value, .. } => WebhookResponse {
            duplicate: false,
            idempotency_scope: scope,
            result: Some(value),
        },
        Idempotent::Skipped { .. } => {
            info!("Duplicate batch {} acknowledged without processing", key);
            metrics::counter!("webhook_duplicates_total").increment(1);
            WebhookResponse {
                duplicate: true,
                idempotency_scope: scope,
                result: None,
            }
        }
    }))
}

/// Ingest a batch through the legacy store-and-count contract
pub async fn receive_legacy(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<BatchResponse>, ApiError> {
    let payload = WebhookPayload::from_json(&body)?;
    Ok(Json(state.pipeline.process_legacy(payload).await))
}
