//! Exit manager: monitors open positions against their exit strategy and
//! executes stop-loss, trailing-stop, take-profit, and time-based exits.

use chrono::Utc;
use dashmap::DashSet;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use risk_manager::circuit_breaker::CircuitBreakerService;
use risk_manager::position_slots::PositionSlotManager;
use walltrack_core::stores::{OrderStore, PositionStore, StrategyStore};
use walltrack_core::types::{
    ExitExecution, ExitReason, ExitStrategy, Order, Position, PositionStatus, TradeOutcome,
};
use walltrack_core::{Error, Result};

use crate::executor::OrderExecutor;
use crate::levels::LevelCalculator;
use crate::time_exits::TimeExitManager;

/// Exits tolerate more slippage than entries; getting out matters more than
/// the fill price.
const EXIT_SLIPPAGE_BPS: u32 = 200;

/// What the exit check decided for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitCheckResult {
    pub should_exit: bool,
    pub exit_reason: Option<ExitReason>,
    /// The take-profit rung that fired, when applicable.
    pub level_type: Option<String>,
    /// Percentage of current holdings to sell.
    pub sell_percentage: Decimal,
    pub is_full_exit: bool,
}

impl ExitCheckResult {
    fn hold() -> Self {
        Self {
            should_exit: false,
            exit_reason: None,
            level_type: None,
            sell_percentage: Decimal::ZERO,
            is_full_exit: false,
        }
    }

    fn full(reason: ExitReason) -> Self {
        Self {
            should_exit: true,
            exit_reason: Some(reason),
            level_type: None,
            sell_percentage: Decimal::new(100, 0),
            is_full_exit: true,
        }
    }
}

/// Per-position exit evaluation and execution.
///
/// `process_position` is serialized per position id; a tick that arrives
/// while the previous one is still in flight is skipped.
pub struct ExitManager {
    strategies: Arc<dyn StrategyStore>,
    positions: Arc<dyn PositionStore>,
    orders: Arc<dyn OrderStore>,
    executor: Arc<OrderExecutor>,
    slots: Arc<PositionSlotManager>,
    breakers: Arc<CircuitBreakerService>,
    time_exits: TimeExitManager,
    in_flight: DashSet<Uuid>,
}

impl ExitManager {
    pub fn new(
        strategies: Arc<dyn StrategyStore>,
        positions: Arc<dyn PositionStore>,
        orders: Arc<dyn OrderStore>,
        executor: Arc<OrderExecutor>,
        slots: Arc<PositionSlotManager>,
        breakers: Arc<CircuitBreakerService>,
    ) -> Self {
        Self {
            strategies,
            positions,
            orders,
            executor,
            slots,
            breakers,
            time_exits: TimeExitManager::new(),
            in_flight: DashSet::new(),
        }
    }

    /// Evaluate exit conditions in priority order: stop-loss, trailing stop,
    /// take-profit, then time rules.
    pub fn check_exit_conditions(
        &self,
        position: &Position,
        current_price: Decimal,
        strategy: &ExitStrategy,
    ) -> ExitCheckResult {
        let levels = &position.levels;
        let hundred = Decimal::new(100, 0);

        // Stop-loss. Once the position is a moonbag, only the moonbag stop
        // can close it; without one, the moonbag rides.
        if position.is_moonbag {
            if let Some(moonbag_stop) = levels.moonbag_stop_price {
                if current_price <= moonbag_stop {
                    info!(
                        position_id = %position.id,
                        price = %current_price,
                        stop = %moonbag_stop,
                        "moonbag stop triggered"
                    );
                    return ExitCheckResult::full(ExitReason::MoonbagStop);
                }
            }
        } else if levels.stop_loss_price > Decimal::ZERO
            && current_price <= levels.stop_loss_price
        {
            info!(
                position_id = %position.id,
                price = %current_price,
                stop = %levels.stop_loss_price,
                "stop loss triggered"
            );
            return ExitCheckResult::full(ExitReason::StopLoss);
        }

        // Trailing stop is disarmed once the moonbag remains.
        if !position.is_moonbag {
            if let Some(trailing) = levels.trailing_stop_current_price {
                if current_price <= trailing {
                    let has_moonbag = strategy.moonbag.has_moonbag();
                    let sell_pct = if has_moonbag {
                        hundred - strategy.moonbag.percentage
                    } else {
                        hundred
                    };
                    info!(
                        position_id = %position.id,
                        price = %current_price,
                        trailing = %trailing,
                        peak = ?position.peak_price,
                        "trailing stop triggered"
                    );
                    return ExitCheckResult {
                        should_exit: true,
                        exit_reason: Some(ExitReason::TrailingStop),
                        level_type: None,
                        sell_percentage: sell_pct,
                        is_full_exit: !has_moonbag,
                    };
                }
            }

            // Take-profit ladder: only the next untriggered rung can fire.
            if let Some(next) = levels.next_take_profit() {
                if current_price >= next.trigger_price {
                    let sell_pct = next.sell_percentage
                        * (hundred - strategy.moonbag.percentage)
                        / hundred;
                    info!(
                        position_id = %position.id,
                        level = %next.level_type,
                        price = %current_price,
                        trigger = %next.trigger_price,
                        "take profit triggered"
                    );
                    return ExitCheckResult {
                        should_exit: true,
                        exit_reason: Some(ExitReason::TakeProfit),
                        level_type: Some(next.level_type.clone()),
                        sell_percentage: sell_pct,
                        is_full_exit: false,
                    };
                }
            }
        }

        if strategy.has_time_limits() {
            if let Some(reason) =
                self.time_exits
                    .check(position, strategy, current_price, Utc::now())
            {
                return ExitCheckResult::full(reason);
            }
        }

        ExitCheckResult::hold()
    }

    /// Run one price tick for a position: update the peak and trailing stop,
    /// evaluate conditions, and execute an exit if indicated.
    pub async fn process_position(
        &self,
        position_id: Uuid,
        current_price: Decimal,
    ) -> Result<Option<ExitExecution>> {
        // One in-flight check per position; a busy position skips the tick.
        if !self.in_flight.insert(position_id) {
            debug!(position_id = %position_id, "exit check already in flight, skipping tick");
            return Ok(None);
        }
        let result = self.process_position_inner(position_id, current_price).await;
        self.in_flight.remove(&position_id);
        result
    }

    async fn process_position_inner(
        &self,
        position_id: Uuid,
        current_price: Decimal,
    ) -> Result<Option<ExitExecution>> {
        let Some(mut position) = self.positions.get_by_id(position_id).await? else {
            return Err(Error::NotFound(format!("position {position_id}")));
        };
        if !position.status.is_open() {
            return Ok(None);
        }

        // A missing strategy is fatal for this tick, not for the worker.
        let Some(strategy) = self.strategies.get_by_id(position.exit_strategy_id).await? else {
            error!(
                position_id = %position.id,
                strategy_id = %position.exit_strategy_id,
                "exit strategy not found"
            );
            return Ok(None);
        };

        position.update_peak(current_price);
        if !position.is_moonbag {
            if let Some(peak) = position.peak_price {
                LevelCalculator::recalculate_trailing(&mut position.levels, peak, &strategy);
            }
        }

        let check = self.check_exit_conditions(&position, current_price, &strategy);

        if check.should_exit {
            // A failed exit order still owned by the retry worker must not be
            // doubled with a fresh sell.
            if self.orders.has_active_exit_order(position.id).await? {
                debug!(
                    position_id = %position.id,
                    "exit indicated but an exit order is already in flight"
                );
            } else {
                let execution = self
                    .execute_exit(&mut position, &check, current_price, &strategy)
                    .await?;
                return Ok(execution);
            }
        }

        position.update_unrealized(current_price);
        self.positions.update(&position).await?;
        Ok(None)
    }

    /// Execute an indicated exit: sell, record the execution, and update the
    /// position. A failed sell leaves the position untouched so the next
    /// tick retries.
    pub async fn execute_exit(
        &self,
        position: &mut Position,
        check: &ExitCheckResult,
        current_price: Decimal,
        strategy: &ExitStrategy,
    ) -> Result<Option<ExitExecution>> {
        let hundred = Decimal::new(100, 0);
        // Percentage exits prorate against the entry amount so the ladder
        // sells equal slices and the moonbag remainder comes out exact; a
        // trailing stop sells down to the moonbag floor.
        let tokens_to_sell = if check.is_full_exit {
            position.current_amount_tokens
        } else {
            match check.exit_reason {
                Some(ExitReason::TrailingStop) => {
                    let moonbag_floor =
                        position.entry_amount_tokens * strategy.moonbag.percentage / hundred;
                    position.current_amount_tokens - moonbag_floor
                }
                _ => position.entry_amount_tokens * check.sell_percentage / hundred,
            }
            .min(position.current_amount_tokens)
        };
        if tokens_to_sell <= Decimal::ZERO {
            return Ok(None);
        }

        let estimated_sol = tokens_to_sell * current_price;
        let mut order = Order::exit(
            position.id,
            position.token_address.clone(),
            estimated_sol,
            tokens_to_sell,
            current_price,
            EXIT_SLIPPAGE_BPS,
        );
        if position.is_simulated {
            order = order.simulated();
        }
        self.orders.create(&order).await?;

        let result = self.executor.execute(order).await?;
        if !result.success {
            // No optimistic state: the position only changes on a real fill.
            warn!(
                position_id = %position.id,
                error = ?result.error,
                "exit execution failed, will retry on next tick"
            );
            return Ok(None);
        }

        let sol_received = result.output_amount.unwrap_or(Decimal::ZERO);
        let entry_cost_prorated = tokens_to_sell * position.entry_price;
        let realized_pnl = sol_received - entry_cost_prorated;
        let tx_signature = result.tx_signature.clone().unwrap_or_default();

        let execution = ExitExecution {
            id: Uuid::new_v4(),
            position_id: position.id,
            exit_reason: check.exit_reason.unwrap_or(ExitReason::Manual),
            trigger_level: check
                .level_type
                .clone()
                .unwrap_or_else(|| {
                    check
                        .exit_reason
                        .map(|r| r.as_str().to_string())
                        .unwrap_or_default()
                }),
            sell_percentage: check.sell_percentage,
            amount_tokens_sold: tokens_to_sell,
            amount_sol_received: sol_received,
            exit_price: current_price,
            tx_signature: tx_signature.clone(),
            realized_pnl_sol: realized_pnl,
            executed_at: Utc::now(),
        };

        if let Some(level_type) = &check.level_type {
            position.levels.mark_triggered(level_type, &tx_signature);
        }
        position.apply_exit(
            &execution,
            check.is_full_exit,
            strategy.moonbag.has_moonbag(),
            current_price,
        );
        position.update_unrealized(current_price);

        self.positions.save_exit_execution(&execution).await?;
        self.positions.update(position).await?;

        info!(
            position_id = %position.id,
            reason = execution.exit_reason.as_str(),
            tokens = %tokens_to_sell,
            pnl = %realized_pnl,
            status = position.status.as_str(),
            "exit executed"
        );

        if position.status == PositionStatus::Closed {
            self.on_position_closed(position).await;
        }

        Ok(Some(execution))
    }

    async fn on_position_closed(&self, position: &Position) {
        self.time_exits.remove(position.id);

        if let Err(e) = self.slots.on_position_closed(position.id).await {
            warn!(position_id = %position.id, error = %e, "slot release failed");
        }

        let outcome = TradeOutcome {
            position_id: position.id,
            wallet_address: position.wallet_address.clone(),
            pnl_sol: position.realized_pnl_sol,
            is_win: position.is_win(),
            closed_at: position.exit_time.unwrap_or_else(Utc::now),
        };
        info!(
            position_id = %outcome.position_id,
            wallet = %outcome.wallet_address,
            pnl = %outcome.pnl_sol,
            is_win = outcome.is_win,
            "trade outcome recorded"
        );
        let capital = self
            .positions
            .total_allocation()
            .await
            .unwrap_or(Decimal::ZERO);
        if let Err(e) = self
            .breakers
            .record_trade_outcome(outcome.pnl_sol, outcome.is_win, capital)
            .await
        {
            warn!(position_id = %position.id, error = %e, "breaker feedback failed");
        }
    }
}
