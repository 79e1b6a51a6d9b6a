//! Orders and their lifecycle state machine.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Default retry backoff schedule in seconds, indexed by `attempt_count - 1`.
pub const RETRY_DELAYS_SECS: [i64; 3] = [5, 15, 45];

/// Default number of execution attempts before an order is cancelled.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Whether the order opens or closes a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Entry,
    Exit,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Entry => "entry",
            OrderKind::Exit => "exit",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "exit" => OrderKind::Exit,
            _ => OrderKind::Entry,
        }
    }
}

/// Side of the swap submitted to the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sell" => OrderSide::Sell,
            _ => OrderSide::Buy,
        }
    }
}

/// Current status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created or re-armed for retry, not yet handed to the venue.
    Pending,
    /// Swap submitted, awaiting a transaction signature.
    Submitted,
    /// Transaction broadcast, awaiting confirmation.
    Confirming,
    /// Confirmed with an acceptable fill.
    Filled,
    /// Attempt failed; may be retried while attempts remain.
    Failed,
    /// Terminal: retries exhausted or operator cancelled.
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Confirming => "confirming",
            OrderStatus::Filled => "filled",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => OrderStatus::Pending,
            "submitted" => OrderStatus::Submitted,
            "confirming" => OrderStatus::Confirming,
            "filled" => OrderStatus::Filled,
            "failed" => OrderStatus::Failed,
            _ => OrderStatus::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }

    /// Allowed successor states.
    fn successors(&self) -> &'static [OrderStatus] {
        match self {
            OrderStatus::Pending => &[OrderStatus::Submitted, OrderStatus::Cancelled],
            OrderStatus::Submitted => &[
                OrderStatus::Confirming,
                OrderStatus::Failed,
                OrderStatus::Cancelled,
            ],
            OrderStatus::Confirming => &[OrderStatus::Filled, OrderStatus::Failed],
            OrderStatus::Failed => &[OrderStatus::Pending, OrderStatus::Cancelled],
            OrderStatus::Filled | OrderStatus::Cancelled => &[],
        }
    }
}

/// A market swap order, entry or exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub kind: OrderKind,
    pub side: OrderSide,
    pub signal_id: Option<Uuid>,
    pub position_id: Option<Uuid>,
    pub token_address: String,
    pub amount_sol: Decimal,
    pub amount_tokens: Option<Decimal>,
    pub expected_price: Decimal,
    pub actual_price: Option<Decimal>,
    pub max_slippage_bps: u32,
    pub tx_signature: Option<String>,
    pub status: OrderStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub lease_owner: Option<String>,
    pub lease_until: Option<DateTime<Utc>>,
    pub is_simulated: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a buy order that will open a position when filled.
    pub fn entry(
        signal_id: Uuid,
        token_address: impl Into<String>,
        amount_sol: Decimal,
        expected_price: Decimal,
        max_slippage_bps: u32,
    ) -> Self {
        Self::new(
            OrderKind::Entry,
            OrderSide::Buy,
            Some(signal_id),
            None,
            token_address,
            amount_sol,
            expected_price,
            max_slippage_bps,
        )
    }

    /// Create a sell order that reduces or closes an existing position.
    pub fn exit(
        position_id: Uuid,
        token_address: impl Into<String>,
        amount_sol: Decimal,
        amount_tokens: Decimal,
        expected_price: Decimal,
        max_slippage_bps: u32,
    ) -> Self {
        let mut order = Self::new(
            OrderKind::Exit,
            OrderSide::Sell,
            None,
            Some(position_id),
            token_address,
            amount_sol,
            expected_price,
            max_slippage_bps,
        );
        order.amount_tokens = Some(amount_tokens);
        order
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        kind: OrderKind,
        side: OrderSide,
        signal_id: Option<Uuid>,
        position_id: Option<Uuid>,
        token_address: impl Into<String>,
        amount_sol: Decimal,
        expected_price: Decimal,
        max_slippage_bps: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            side,
            signal_id,
            position_id,
            token_address: token_address.into(),
            amount_sol,
            amount_tokens: None,
            expected_price,
            actual_price: None,
            max_slippage_bps,
            tx_signature: None,
            status: OrderStatus::Pending,
            attempt_count: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            next_retry_at: None,
            last_error: None,
            lease_owner: None,
            lease_until: None,
            is_simulated: false,
            created_at: now,
            updated_at: now,
            filled_at: None,
        }
    }

    pub fn simulated(mut self) -> Self {
        self.is_simulated = true;
        self
    }

    /// Apply a status transition, rejecting anything outside the state machine.
    ///
    /// Invalid transitions return an error and leave the order unchanged.
    pub fn transition(&mut self, to: OrderStatus) -> Result<()> {
        if !self.status.successors().contains(&to) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        if to == OrderStatus::Filled {
            self.filled_at = Some(self.updated_at);
        }
        Ok(())
    }

    /// Whether a failed order still has attempts left.
    pub fn can_retry(&self) -> bool {
        self.status == OrderStatus::Failed && self.attempt_count < self.max_attempts
    }

    /// Record a failed attempt and schedule the next retry per the backoff table.
    ///
    /// No retry is scheduled once attempts are exhausted.
    pub fn record_failure(&mut self, error: impl Into<String>, delays_secs: &[i64]) {
        self.attempt_count += 1;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();

        if self.attempt_count < self.max_attempts && !delays_secs.is_empty() {
            let idx = (self.attempt_count as usize - 1).min(delays_secs.len() - 1);
            self.next_retry_at = Some(Utc::now() + Duration::seconds(delays_secs[idx]));
        } else {
            self.next_retry_at = None;
        }
    }

    /// Realized slippage in basis points, available once both prices are known.
    ///
    /// `|actual - expected| / expected * 10_000`, rounded; always absolute.
    pub fn slippage_bps(&self) -> Option<u32> {
        let actual = self.actual_price?;
        if self.expected_price <= Decimal::ZERO {
            return None;
        }
        let bps = ((actual - self.expected_price).abs() / self.expected_price
            * Decimal::new(10_000, 0))
        .round();
        bps.to_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_order() -> Order {
        Order::entry(
            Uuid::new_v4(),
            "TokenA",
            Decimal::new(5, 1),
            Decimal::new(1, 3),
            100,
        )
    }

    #[test]
    fn test_entry_order_defaults() {
        let order = entry_order();
        assert_eq!(order.kind, OrderKind::Entry);
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.attempt_count, 0);
        assert_eq!(order.max_attempts, 3);
        assert!(!order.is_simulated);
    }

    #[test]
    fn test_exit_order_carries_tokens() {
        let order = Order::exit(
            Uuid::new_v4(),
            "TokenA",
            Decimal::new(5, 1),
            Decimal::new(500, 0),
            Decimal::new(1, 3),
            200,
        );
        assert_eq!(order.kind, OrderKind::Exit);
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.amount_tokens, Some(Decimal::new(500, 0)));
    }

    #[test]
    fn test_pending_to_submitted() {
        let mut order = entry_order();
        assert!(order.transition(OrderStatus::Submitted).is_ok());
        assert_eq!(order.status, OrderStatus::Submitted);
    }

    #[test]
    fn test_pending_to_cancelled() {
        let mut order = entry_order();
        assert!(order.transition(OrderStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_pending_to_filled_invalid() {
        let mut order = entry_order();
        let err = order.transition(OrderStatus::Filled).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn test_pending_to_confirming_invalid() {
        let mut order = entry_order();
        assert!(order.transition(OrderStatus::Confirming).is_err());
    }

    #[test]
    fn test_full_fill_chain() {
        let mut order = entry_order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Confirming).unwrap();
        order.transition(OrderStatus::Filled).unwrap();
        assert!(order.filled_at.is_some());
    }

    #[test]
    fn test_failed_to_pending_retry() {
        let mut order = entry_order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Failed).unwrap();
        assert!(order.transition(OrderStatus::Pending).is_ok());
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut order = entry_order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Confirming).unwrap();
        order.transition(OrderStatus::Filled).unwrap();
        assert!(order.transition(OrderStatus::Pending).is_err());

        let mut order = entry_order();
        order.transition(OrderStatus::Cancelled).unwrap();
        assert!(order.transition(OrderStatus::Pending).is_err());
    }

    #[test]
    fn test_retry_backoff_schedule() {
        let mut order = entry_order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Failed).unwrap();

        order.record_failure("slippage exceeded", &RETRY_DELAYS_SECS);
        assert_eq!(order.attempt_count, 1);
        let first = order.next_retry_at.unwrap();
        let delta = (first - Utc::now()).num_seconds();
        assert!((4..=5).contains(&delta));
        assert!(order.can_retry());

        order.record_failure("slippage exceeded", &RETRY_DELAYS_SECS);
        assert_eq!(order.attempt_count, 2);
        let second = order.next_retry_at.unwrap();
        assert!(second > first);
        assert!(order.can_retry());
    }

    #[test]
    fn test_no_retry_scheduled_when_exhausted() {
        let mut order = entry_order();
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Failed).unwrap();
        for _ in 0..3 {
            order.record_failure("venue rejection", &RETRY_DELAYS_SECS);
        }
        assert_eq!(order.attempt_count, 3);
        assert!(order.next_retry_at.is_none());
        assert!(!order.can_retry());
    }

    #[test]
    fn test_slippage_five_percent() {
        let mut order = entry_order();
        order.expected_price = Decimal::new(100, 2);
        order.actual_price = Some(Decimal::new(105, 2));
        assert_eq!(order.slippage_bps(), Some(500));
    }

    #[test]
    fn test_slippage_is_absolute() {
        let mut order = entry_order();
        order.expected_price = Decimal::new(100, 2);
        order.actual_price = Some(Decimal::new(95, 2));
        assert_eq!(order.slippage_bps(), Some(500));
    }

    #[test]
    fn test_slippage_one_percent() {
        let mut order = entry_order();
        order.expected_price = Decimal::new(1000, 3);
        order.actual_price = Some(Decimal::new(1010, 3));
        assert_eq!(order.slippage_bps(), Some(100));
    }

    #[test]
    fn test_slippage_none_when_not_filled() {
        let order = entry_order();
        assert_eq!(order.slippage_bps(), None);
    }
}
