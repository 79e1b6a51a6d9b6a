//! Application state shared across handlers.

use std::sync::Arc;
use tokio::sync::mpsc;

use risk_manager::position_slots::PositionSlotManager;
use risk_manager::system_state::SystemStateManager;
use trading_engine::retry_worker::RetryWorker;
use walltrack_core::config::SharedConfig;
use walltrack_core::stores::{OrderStore, PositionStore, SignalLog};
use walltrack_core::types::SwapEvent;
use wallet_tracker::profiling_worker::WalletProfilingWorker;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Ingress channel into the signal processor.
    pub event_tx: mpsc::Sender<SwapEvent>,
    pub system_state: Arc<SystemStateManager>,
    pub slots: Arc<PositionSlotManager>,
    pub orders: Arc<dyn OrderStore>,
    pub positions: Arc<dyn PositionStore>,
    pub signals: Arc<dyn SignalLog>,
    pub retry_worker: Arc<RetryWorker>,
    pub profiling_worker: Arc<WalletProfilingWorker>,
    pub config: SharedConfig,
}
