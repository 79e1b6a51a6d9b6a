//! Store ports: the persistence interfaces the services are written against.
//!
//! The sqlx repositories in [`crate::db`] are the production implementations;
//! tests use the generated mocks. Backing stores are substitutable as long as
//! they honor the conditional-update semantics documented per method.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::config::TradingConfig;
use crate::db::OrderHistoryFilter;
use crate::types::{
    CircuitBreakerTrigger, DecayEvent, DecayStatus, ExecutionStatus, ExitExecution, ExitStrategy,
    Order, OrderStatus, OrderStatusChange, Position, PositionSlotEvent, QueuedSignal,
    SignalRecord, StrategyStatus, SystemState, SystemStatus, WalletProfile, WalletStatus,
};
use crate::Result;

/// Wallet profile store.
#[automock]
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn upsert(&self, wallet: &WalletProfile) -> Result<()>;
    async fn get_by_address(&self, address: &str) -> Result<Option<WalletProfile>>;
    async fn list_by_status(&self, status: WalletStatus, limit: i64) -> Result<Vec<WalletProfile>>;
    async fn update_status(&self, address: &str, status: WalletStatus) -> Result<()>;
    async fn update_decay(
        &self,
        address: &str,
        decay_status: DecayStatus,
        score: f64,
        rolling_win_rate: f64,
        consecutive_losses: u32,
        last_activity_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

/// Order store with conditional status updates and retry leasing.
#[automock]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, order: &Order) -> Result<()>;
    async fn update(&self, order: &Order) -> Result<()>;
    /// Commits iff the stored status equals `from`.
    async fn transition_status(&self, id: Uuid, from: OrderStatus, to: OrderStatus)
        -> Result<bool>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>>;
    /// Due retries, exits first, oldest `next_retry_at` first.
    async fn get_pending_retries(&self, limit: i64) -> Result<Vec<Order>>;
    /// Whether an exit order for this position is still in flight (pending,
    /// submitted, confirming, or failed with retries remaining).
    async fn has_active_exit_order(&self, position_id: Uuid) -> Result<bool>;
    /// Succeeds only when the order is unleased or the lease expired.
    async fn acquire_lease(&self, id: Uuid, owner: &str, ttl_secs: i64) -> Result<bool>;
    async fn release_lease(&self, id: Uuid, owner: &str) -> Result<()>;
    async fn get_history(&self, filter: &OrderHistoryFilter) -> Result<Vec<Order>>;
    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>>;
    async fn append_status_log<'a>(
        &self,
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
        detail: Option<&'a str>,
    ) -> Result<()>;
    async fn get_status_log(&self, order_id: Uuid) -> Result<Vec<OrderStatusChange>>;
}

/// Position store.
#[automock]
#[async_trait]
pub trait PositionStore: Send + Sync {
    async fn create(&self, position: &Position) -> Result<()>;
    async fn update(&self, position: &Position) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Position>>;
    async fn list_open(&self) -> Result<Vec<Position>>;
    async fn count_open(&self) -> Result<i64>;
    async fn open_for_token(&self, token_address: &str) -> Result<Vec<Position>>;
    async fn token_allocation(&self, token_address: &str) -> Result<Decimal>;
    /// SOL committed at entry across all open positions.
    async fn total_allocation(&self) -> Result<Decimal>;
    async fn count_open_in_cluster(&self, cluster_id: &str) -> Result<i64>;
    async fn cluster_allocation(&self, cluster_id: &str) -> Result<Decimal>;
    async fn save_exit_execution(&self, execution: &ExitExecution) -> Result<()>;
    async fn list_exit_executions(&self, position_id: Uuid) -> Result<Vec<ExitExecution>>;
}

/// Append-only signal log.
#[automock]
#[async_trait]
pub trait SignalLog: Send + Sync {
    /// Returns `false` when the record was dropped as a duplicate.
    async fn append(&self, record: &SignalRecord) -> Result<bool>;
    async fn exists_tx(&self, tx_signature: &str) -> Result<bool>;
    async fn update_execution_status<'a>(
        &self,
        signal_id: Uuid,
        status: ExecutionStatus,
        detail: Option<&'a str>,
    ) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<SignalRecord>>;
    async fn recent(&self, limit: i64) -> Result<Vec<SignalRecord>>;
}

/// Append-only event logs.
#[automock]
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn append_breaker_trigger(&self, trigger: &CircuitBreakerTrigger) -> Result<()>;
    async fn append_decay_event(&self, event: &DecayEvent) -> Result<()>;
    async fn append_slot_event(&self, event: &PositionSlotEvent) -> Result<()>;
    async fn append_state_event<'a>(
        &self,
        from: SystemStatus,
        to: SystemStatus,
        operator: &str,
        detail: Option<&'a str>,
    ) -> Result<()>;
}

/// Versioned exit strategy store.
#[automock]
#[async_trait]
pub trait StrategyStore: Send + Sync {
    async fn insert(&self, strategy: &ExitStrategy) -> Result<()>;
    async fn get_by_id(&self, id: Uuid) -> Result<Option<ExitStrategy>>;
    async fn get_active_by_name(&self, name: &str) -> Result<Option<ExitStrategy>>;
    async fn list_by_status(&self, status: StrategyStatus) -> Result<Vec<ExitStrategy>>;
    async fn activate(&self, id: Uuid) -> Result<()>;
}

/// Singleton system state store with optimistic versioning.
#[automock]
#[async_trait]
pub trait SystemStateStore: Send + Sync {
    async fn load(&self) -> Result<Option<SystemState>>;
    /// Persists iff the stored version equals `expected_version`.
    async fn save(&self, state: &SystemState, expected_version: i64) -> Result<bool>;
}

/// Persisted mirror of the signal queue.
#[automock]
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn insert(&self, queued: &QueuedSignal) -> Result<()>;
    async fn remove(&self, id: Uuid) -> Result<()>;
    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<u64>;
    async fn list_all(&self) -> Result<Vec<QueuedSignal>>;
}

/// Persisted trading configuration.
#[automock]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load(&self) -> Result<Option<TradingConfig>>;
    async fn save(&self, config: &TradingConfig) -> Result<()>;
}
