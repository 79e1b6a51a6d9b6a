//! Operator control: pause/resume trading, cancel and retry orders.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use risk_manager::system_state::{PauseRequest, ResumeRequest};
use walltrack_core::types::{OrderStatus, PauseReason};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PauseBody {
    pub operator: String,
    #[serde(default = "default_pause_reason")]
    pub reason: PauseReason,
    pub note: Option<String>,
}

fn default_pause_reason() -> PauseReason {
    PauseReason::Manual
}

pub async fn pause(
    State(state): State<AppState>,
    Json(body): Json<PauseBody>,
) -> ApiResult<Json<Value>> {
    let new_state = state
        .system_state
        .pause(PauseRequest {
            operator: body.operator,
            reason: body.reason,
            note: body.note,
        })
        .await?;
    Ok(Json(json!({ "state": new_state })))
}

#[derive(Debug, Deserialize)]
pub struct ResumeBody {
    pub operator: String,
    #[serde(default)]
    pub acknowledge_warning: bool,
}

pub async fn resume(
    State(state): State<AppState>,
    Json(body): Json<ResumeBody>,
) -> ApiResult<Json<Value>> {
    let new_state = state
        .system_state
        .resume(ResumeRequest {
            operator: body.operator,
            acknowledge_warning: body.acknowledge_warning,
        })
        .await?;
    Ok(Json(json!({ "state": new_state })))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub reason: Option<String>,
}

/// Cancel a non-terminal order.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<CancelBody>,
) -> ApiResult<Json<Value>> {
    let mut order = state
        .orders
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("order {id}")))?;

    let from = order.status;
    order.last_error = body.reason.clone().or(order.last_error);
    order.transition(OrderStatus::Cancelled)?;
    state.orders.update(&order).await?;
    state
        .orders
        .append_status_log(order.id, from, order.status, body.reason.as_deref())
        .await?;

    info!(order_id = %id, "order cancelled by operator");
    Ok(Json(json!({ "order": order })))
}

/// Make a failed order immediately eligible for the retry worker.
pub async fn retry_order_now(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut order = state
        .orders
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("order {id}")))?;

    if !order.can_retry() {
        return Err(ApiError::conflict(format!(
            "order {id} is not retryable ({:?}, attempt {}/{})",
            order.status, order.attempt_count, order.max_attempts
        )));
    }

    order.next_retry_at = Some(Utc::now());
    state.orders.update(&order).await?;

    info!(order_id = %id, "order scheduled for immediate retry");
    Ok((StatusCode::ACCEPTED, Json(json!({ "order": order }))))
}
