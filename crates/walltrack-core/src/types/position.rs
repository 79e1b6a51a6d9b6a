//! Positions, their price levels, and exit accounting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::signal::ConvictionTier;

/// Lifecycle status of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    PartialExit,
    /// All take-profits hit; only the moonbag remainder is held.
    Moonbag,
    Closed,
}

impl PositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionStatus::Open => "open",
            PositionStatus::PartialExit => "partial_exit",
            PositionStatus::Moonbag => "moonbag",
            PositionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "open" => PositionStatus::Open,
            "partial_exit" => PositionStatus::PartialExit,
            "moonbag" => PositionStatus::Moonbag,
            _ => PositionStatus::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, PositionStatus::Closed)
    }
}

/// Why a position (or part of it) was exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    MoonbagStop,
    TrailingStop,
    TakeProfit,
    TimeLimit,
    Stagnation,
    Manual,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::MoonbagStop => "moonbag_stop",
            ExitReason::TrailingStop => "trailing_stop",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::TimeLimit => "time_limit",
            ExitReason::Stagnation => "stagnation",
            ExitReason::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "stop_loss" => ExitReason::StopLoss,
            "moonbag_stop" => ExitReason::MoonbagStop,
            "trailing_stop" => ExitReason::TrailingStop,
            "take_profit" => ExitReason::TakeProfit,
            "time_limit" => ExitReason::TimeLimit,
            "stagnation" => ExitReason::Stagnation,
            _ => ExitReason::Manual,
        }
    }
}

/// A single take-profit rung on the ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatedLevel {
    /// Identifies the rung, e.g. "tp_1".
    pub level_type: String,
    pub trigger_price: Decimal,
    /// Percentage of the tradeable portion to sell when triggered, in (0, 100].
    pub sell_percentage: Decimal,
    pub is_triggered: bool,
    pub triggered_at: Option<DateTime<Utc>>,
    pub tx_signature: Option<String>,
}

/// Price levels derived from the bound exit strategy at entry time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLevels {
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub moonbag_stop_price: Option<Decimal>,
    pub trailing_stop_current_price: Option<Decimal>,
    /// Ordered by ascending trigger price.
    pub take_profit_levels: Vec<CalculatedLevel>,
}

impl PositionLevels {
    /// The first untriggered take-profit rung, if any.
    pub fn next_take_profit(&self) -> Option<&CalculatedLevel> {
        self.take_profit_levels.iter().find(|l| !l.is_triggered)
    }

    pub fn all_take_profits_hit(&self) -> bool {
        !self.take_profit_levels.is_empty()
            && self.take_profit_levels.iter().all(|l| l.is_triggered)
    }

    /// Mark a rung as triggered, recording when and by which transaction.
    pub fn mark_triggered(&mut self, level_type: &str, tx_signature: &str) {
        if let Some(level) = self
            .take_profit_levels
            .iter_mut()
            .find(|l| l.level_type == level_type)
        {
            level.is_triggered = true;
            level.triggered_at = Some(Utc::now());
            level.tx_signature = Some(tx_signature.to_string());
        }
    }
}

/// Record of one executed exit (partial or full).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitExecution {
    pub id: Uuid,
    pub position_id: Uuid,
    pub exit_reason: ExitReason,
    /// Which level fired, e.g. "tp_1" or "stop_loss".
    pub trigger_level: String,
    pub sell_percentage: Decimal,
    pub amount_tokens_sold: Decimal,
    pub amount_sol_received: Decimal,
    pub exit_price: Decimal,
    pub tx_signature: String,
    pub realized_pnl_sol: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// An open or closed position created from a filled entry order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub token_address: String,
    pub wallet_address: String,
    pub cluster_id: Option<String>,
    pub status: PositionStatus,
    pub entry_price: Decimal,
    pub entry_amount_sol: Decimal,
    pub entry_amount_tokens: Decimal,
    pub current_amount_tokens: Decimal,
    pub peak_price: Option<Decimal>,
    pub last_price_check: Option<DateTime<Utc>>,
    pub conviction_tier: ConvictionTier,
    pub exit_strategy_id: Uuid,
    pub levels: PositionLevels,
    pub exit_tx_signatures: Vec<String>,
    pub realized_pnl_sol: Decimal,
    pub unrealized_pnl_sol: Decimal,
    pub exit_time: Option<DateTime<Utc>>,
    pub exit_reason: Option<ExitReason>,
    pub exit_price: Option<Decimal>,
    pub is_moonbag: bool,
    pub is_simulated: bool,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        signal_id: Uuid,
        token_address: impl Into<String>,
        wallet_address: impl Into<String>,
        cluster_id: Option<String>,
        entry_price: Decimal,
        entry_amount_sol: Decimal,
        entry_amount_tokens: Decimal,
        conviction_tier: ConvictionTier,
        exit_strategy_id: Uuid,
        levels: PositionLevels,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            signal_id,
            token_address: token_address.into(),
            wallet_address: wallet_address.into(),
            cluster_id,
            status: PositionStatus::Open,
            entry_price,
            entry_amount_sol,
            entry_amount_tokens,
            current_amount_tokens: entry_amount_tokens,
            peak_price: Some(entry_price),
            last_price_check: None,
            conviction_tier,
            exit_strategy_id,
            levels,
            exit_tx_signatures: Vec::new(),
            realized_pnl_sol: Decimal::ZERO,
            unrealized_pnl_sol: Decimal::ZERO,
            exit_time: None,
            exit_reason: None,
            exit_price: None,
            is_moonbag: false,
            is_simulated: false,
            opened_at: now,
            updated_at: now,
        }
    }

    pub fn simulated(mut self) -> Self {
        self.is_simulated = true;
        self
    }

    /// Tokens sold across all exits so far.
    pub fn tokens_sold(&self) -> Decimal {
        self.entry_amount_tokens - self.current_amount_tokens
    }

    /// Raise the peak if the current price exceeds it.
    pub fn update_peak(&mut self, current_price: Decimal) {
        match self.peak_price {
            Some(peak) if current_price <= peak => {}
            _ => self.peak_price = Some(current_price),
        }
    }

    /// Recompute unrealized PnL against the current price.
    pub fn update_unrealized(&mut self, current_price: Decimal) {
        self.unrealized_pnl_sol =
            (current_price - self.entry_price) * self.current_amount_tokens;
        self.last_price_check = Some(Utc::now());
    }

    /// Apply an executed exit to the position state.
    ///
    /// This is the single source of truth for partial-exit accounting:
    /// decrement `current_amount_tokens`, accumulate realized PnL, append the
    /// transaction signature, then resolve the status. The token-conservation
    /// invariant `entry = current + Σ sold` holds because the only mutation of
    /// `current_amount_tokens` is the subtraction here.
    pub fn apply_exit(
        &mut self,
        execution: &ExitExecution,
        is_full_exit: bool,
        moonbag_configured: bool,
        current_price: Decimal,
    ) {
        self.current_amount_tokens -= execution.amount_tokens_sold;
        self.realized_pnl_sol += execution.realized_pnl_sol;
        self.exit_tx_signatures.push(execution.tx_signature.clone());
        self.updated_at = Utc::now();

        if is_full_exit || self.current_amount_tokens <= Decimal::ZERO {
            self.status = PositionStatus::Closed;
            self.exit_reason = Some(execution.exit_reason);
            self.exit_time = Some(Utc::now());
            self.exit_price = Some(current_price);
            self.unrealized_pnl_sol = Decimal::ZERO;
        } else if self.levels.all_take_profits_hit() && moonbag_configured {
            self.status = PositionStatus::Moonbag;
            self.is_moonbag = true;
        } else {
            self.status = PositionStatus::PartialExit;
        }
    }

    pub fn is_win(&self) -> bool {
        self.realized_pnl_sol > Decimal::ZERO
    }

    /// Realized PnL as a percentage of the entry cost.
    pub fn realized_pnl_pct(&self) -> Option<Decimal> {
        if self.entry_amount_sol.is_zero() {
            return None;
        }
        Some(self.realized_pnl_sol / self.entry_amount_sol * Decimal::new(100, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn levels_with_tps(entry: Decimal, tps: &[(Decimal, Decimal)]) -> PositionLevels {
        PositionLevels {
            entry_price: entry,
            stop_loss_price: entry / dec!(2),
            moonbag_stop_price: None,
            trailing_stop_current_price: None,
            take_profit_levels: tps
                .iter()
                .enumerate()
                .map(|(i, (trigger, pct))| CalculatedLevel {
                    level_type: format!("tp_{}", i + 1),
                    trigger_price: *trigger,
                    sell_percentage: *pct,
                    is_triggered: false,
                    triggered_at: None,
                    tx_signature: None,
                })
                .collect(),
        }
    }

    fn open_position() -> Position {
        Position::open(
            Uuid::new_v4(),
            "TokenA",
            "WalletA",
            None,
            dec!(1.0),
            dec!(1.0),
            dec!(1000),
            ConvictionTier::Standard,
            Uuid::new_v4(),
            levels_with_tps(dec!(1.0), &[(dec!(1.5), dec!(50)), (dec!(2.0), dec!(50))]),
        )
    }

    fn execution(position: &Position, tokens: Decimal, price: Decimal) -> ExitExecution {
        ExitExecution {
            id: Uuid::new_v4(),
            position_id: position.id,
            exit_reason: ExitReason::TakeProfit,
            trigger_level: "tp_1".to_string(),
            sell_percentage: dec!(33),
            amount_tokens_sold: tokens,
            amount_sol_received: tokens * price,
            exit_price: price,
            tx_signature: "tx1".to_string(),
            realized_pnl_sol: tokens * (price - position.entry_price),
            executed_at: Utc::now(),
        }
    }

    #[test]
    fn test_token_conservation_after_partial_exit() {
        let mut position = open_position();
        let exec = execution(&position, dec!(330), dec!(1.5));
        position.apply_exit(&exec, false, true, dec!(1.5));

        assert_eq!(position.status, PositionStatus::PartialExit);
        assert_eq!(
            position.entry_amount_tokens,
            position.current_amount_tokens + position.tokens_sold()
        );
        assert_eq!(position.current_amount_tokens, dec!(670));
        assert_eq!(position.exit_tx_signatures.len(), 1);
    }

    #[test]
    fn test_full_exit_closes_with_zero_tokens() {
        let mut position = open_position();
        let all = position.current_amount_tokens;
        let exec = execution(&position, all, dec!(0.49));
        position.apply_exit(&exec, true, false, dec!(0.49));

        assert_eq!(position.status, PositionStatus::Closed);
        assert_eq!(position.current_amount_tokens, Decimal::ZERO);
        assert!(position.exit_time.is_some());
        assert_eq!(position.exit_price, Some(dec!(0.49)));
    }

    #[test]
    fn test_moonbag_transition_when_all_tps_hit() {
        let mut position = open_position();
        position.levels.mark_triggered("tp_1", "tx1");
        position.levels.mark_triggered("tp_2", "tx2");

        let exec = execution(&position, dec!(330), dec!(2.0));
        position.apply_exit(&exec, false, true, dec!(2.0));

        assert_eq!(position.status, PositionStatus::Moonbag);
        assert!(position.is_moonbag);
    }

    #[test]
    fn test_next_take_profit_ordering() {
        let position = open_position();
        let next = position.levels.next_take_profit().unwrap();
        assert_eq!(next.level_type, "tp_1");
        assert_eq!(next.trigger_price, dec!(1.5));
    }

    #[test]
    fn test_peak_only_rises() {
        let mut position = open_position();
        position.update_peak(dec!(1.8));
        assert_eq!(position.peak_price, Some(dec!(1.8)));
        position.update_peak(dec!(1.2));
        assert_eq!(position.peak_price, Some(dec!(1.8)));
    }

    #[test]
    fn test_realized_pnl_accumulates() {
        let mut position = open_position();
        let exec = execution(&position, dec!(330), dec!(1.5));
        position.apply_exit(&exec, false, true, dec!(1.5));
        assert_eq!(position.realized_pnl_sol, dec!(330) * dec!(0.5));
    }
}
