//! Webhook ingress: validated swap events enter the pipeline channel.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use walltrack_core::types::{SwapDirection, SwapEvent};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SwapEventRequest {
    pub tx_signature: String,
    pub wallet_address: String,
    pub token_address: String,
    pub direction: SwapDirection,
    pub amount_token: Decimal,
    pub amount_sol: Decimal,
    pub slot: i64,
    pub block_time: DateTime<Utc>,
}

/// Accept a swap event. Deduplication happens downstream in the pipeline.
pub async fn ingest_swap(
    State(state): State<AppState>,
    Json(request): Json<SwapEventRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let event = SwapEvent {
        tx_signature: request.tx_signature,
        wallet_address: request.wallet_address,
        token_address: request.token_address,
        direction: request.direction,
        amount_token: request.amount_token,
        amount_sol: request.amount_sol,
        slot: request.slot,
        block_time: request.block_time,
    };
    event.validate()?;

    let tx_signature = event.tx_signature.clone();
    state
        .event_tx
        .send(event)
        .await
        .map_err(|_| ApiError::conflict("ingress channel closed"))?;

    debug!(tx = %tx_signature, "swap event accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "accepted": true, "tx_signature": tx_signature })),
    ))
}
