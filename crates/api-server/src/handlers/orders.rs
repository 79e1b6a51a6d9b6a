//! Order query surface: history and per-order detail with timeline.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use walltrack_core::db::OrderHistoryFilter;
use walltrack_core::types::{OrderKind, OrderStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OrderHistoryQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub token: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn order_history(
    State(state): State<AppState>,
    Query(query): Query<OrderHistoryQuery>,
) -> ApiResult<Json<Value>> {
    let filter = OrderHistoryFilter {
        status: query.status.as_deref().map(OrderStatus::parse),
        kind: query.kind.as_deref().map(OrderKind::parse),
        token_address: query.token,
        limit: query.limit.clamp(1, 500),
        offset: query.offset.max(0),
    };

    let orders = state.orders.get_history(&filter).await?;
    Ok(Json(json!({
        "orders": orders,
        "limit": filter.limit,
        "offset": filter.offset,
    })))
}

/// Order detail: the order, its status timeline, slippage, and derived flags.
pub async fn order_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let order = state
        .orders
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("order {id}")))?;

    let timeline = state.orders.get_status_log(id).await?;

    Ok(Json(json!({
        "order": order,
        "timeline": timeline,
        "slippage_bps": order.slippage_bps(),
        "can_retry": order.can_retry(),
        "is_terminal": order.status.is_terminal(),
    })))
}
