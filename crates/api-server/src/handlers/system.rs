//! System state and queue status.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn system_state(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let current = state.system_state.state().await;
    Ok(Json(json!({
        "state": current,
        "can_trade": state.system_state.can_trade(),
        "can_exit": state.system_state.can_exit(),
        "pause_duration_seconds": current.pause_duration_seconds(),
    })))
}

pub async fn queue_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let queue = state.slots.get_queue_status().await;
    Ok(Json(json!({
        "depth": queue.len(),
        "queue": queue,
    })))
}
