//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let worker = state.profiling_worker.status().await;
    let orders: HashMap<&str, i64> = state
        .orders
        .count_by_status()
        .await?
        .into_iter()
        .map(|(status, count)| (status.as_str(), count))
        .collect();

    Ok(Json(json!({
        "status": "ok",
        "can_trade": state.system_state.can_trade(),
        "orders_by_status": orders,
        "profiling_worker": worker,
    })))
}
