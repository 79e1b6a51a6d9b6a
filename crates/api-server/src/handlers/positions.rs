//! Position query surface.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn open_positions(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let positions = state.positions.list_open().await?;
    Ok(Json(json!({
        "count": positions.len(),
        "positions": positions,
    })))
}
