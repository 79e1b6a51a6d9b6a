//! API route definitions.

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handlers::{control, health, ingress, orders, positions, system};
use crate::state::AppState;

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/webhook/swap", post(ingress::ingest_swap))
        .route("/control/pause", post(control::pause))
        .route("/control/resume", post(control::resume))
        .route("/control/orders/{id}/cancel", post(control::cancel_order))
        .route("/control/orders/{id}/retry", post(control::retry_order_now))
        .route("/state", get(system::system_state))
        .route("/queue", get(system::queue_status))
        .route("/positions", get(positions::open_positions))
        .route("/orders", get(orders::order_history))
        .route("/orders/{id}", get(orders::order_detail))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
