//! Append-only event records and feedback types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::order::OrderStatus;

/// Which aggregate metric tripped a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerType {
    Drawdown,
    WinRate,
    ConsecutiveLoss,
}

impl CircuitBreakerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitBreakerType::Drawdown => "drawdown",
            CircuitBreakerType::WinRate => "win_rate",
            CircuitBreakerType::ConsecutiveLoss => "consecutive_loss",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "win_rate" => CircuitBreakerType::WinRate,
            "consecutive_loss" => CircuitBreakerType::ConsecutiveLoss,
            _ => CircuitBreakerType::Drawdown,
        }
    }
}

/// Audit record appended whenever a breaker trips.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerTrigger {
    pub id: Uuid,
    pub breaker_type: CircuitBreakerType,
    pub threshold_value: Decimal,
    pub actual_value: Decimal,
    pub capital_at_trigger: Decimal,
    pub created_at: DateTime<Utc>,
}

impl CircuitBreakerTrigger {
    pub fn new(
        breaker_type: CircuitBreakerType,
        threshold_value: Decimal,
        actual_value: Decimal,
        capital_at_trigger: Decimal,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            breaker_type,
            threshold_value,
            actual_value,
            capital_at_trigger,
            created_at: Utc::now(),
        }
    }
}

/// Kind of wallet decay transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayEventType {
    DecayDetected,
    ConsecutiveLosses,
    Dormancy,
    Recovery,
}

impl DecayEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayEventType::DecayDetected => "decay_detected",
            DecayEventType::ConsecutiveLosses => "consecutive_losses",
            DecayEventType::Dormancy => "dormancy",
            DecayEventType::Recovery => "recovery",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "consecutive_losses" => DecayEventType::ConsecutiveLosses,
            "dormancy" => DecayEventType::Dormancy,
            "recovery" => DecayEventType::Recovery,
            _ => DecayEventType::DecayDetected,
        }
    }
}

/// Record appended when a wallet's decay status changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayEvent {
    pub id: Uuid,
    pub wallet_address: String,
    pub event_type: DecayEventType,
    pub rolling_win_rate: f64,
    pub lifetime_win_rate: Option<f64>,
    pub consecutive_losses: u32,
    pub score_before: f64,
    pub score_after: f64,
    pub created_at: DateTime<Utc>,
}

/// Kind of position-slot event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotEventType {
    Allowed,
    Queued,
    BlockedNoQueue,
    Released,
    Expired,
    QueueOverflow,
}

impl SlotEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotEventType::Allowed => "allowed",
            SlotEventType::Queued => "queued",
            SlotEventType::BlockedNoQueue => "blocked_no_queue",
            SlotEventType::Released => "released",
            SlotEventType::Expired => "expired",
            SlotEventType::QueueOverflow => "queue_overflow",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "allowed" => SlotEventType::Allowed,
            "queued" => SlotEventType::Queued,
            "blocked_no_queue" => SlotEventType::BlockedNoQueue,
            "released" => SlotEventType::Released,
            "expired" => SlotEventType::Expired,
            _ => SlotEventType::QueueOverflow,
        }
    }
}

/// Record appended for every slot-admission outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSlotEvent {
    pub id: Uuid,
    pub event_type: SlotEventType,
    pub signal_id: Option<Uuid>,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PositionSlotEvent {
    pub fn new(event_type: SlotEventType, signal_id: Option<Uuid>, detail: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            signal_id,
            detail,
            created_at: Utc::now(),
        }
    }
}

/// Signal waiting for a position slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedSignal {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl QueuedSignal {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Immutable feedback record for one closed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub position_id: Uuid,
    pub wallet_address: String,
    pub pnl_sol: Decimal,
    pub is_win: bool,
    pub closed_at: DateTime<Utc>,
}

/// One row of an order's status timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChange {
    pub order_id: Uuid,
    pub old_status: OrderStatus,
    pub new_status: OrderStatus,
    pub detail: Option<String>,
    pub changed_at: DateTime<Utc>,
}
