//! Circuit breakers: aggregate-metric checks that drive the system pause.

use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, warn};

use walltrack_core::config::SharedConfig;
use walltrack_core::stores::EventLog;
use walltrack_core::types::{CircuitBreakerTrigger, CircuitBreakerType};
use walltrack_core::Result;

use crate::system_state::SystemStateManager;

struct RollingOutcomes {
    /// Newest at the back, capped at the configured window size.
    window: VecDeque<bool>,
    consecutive_losses: u32,
}

/// Evaluates drawdown, rolling win-rate, and consecutive losses against
/// configured thresholds, pausing the system through the state manager.
///
/// A breaker does not re-trigger while a pause is already active; resuming
/// with acknowledgement clears the active trigger.
pub struct CircuitBreakerService {
    state: Arc<SystemStateManager>,
    events: Arc<dyn EventLog>,
    config: SharedConfig,
    outcomes: RwLock<RollingOutcomes>,
}

impl CircuitBreakerService {
    pub fn new(
        state: Arc<SystemStateManager>,
        events: Arc<dyn EventLog>,
        config: SharedConfig,
    ) -> Self {
        Self {
            state,
            events,
            config,
            outcomes: RwLock::new(RollingOutcomes {
                window: VecDeque::new(),
                consecutive_losses: 0,
            }),
        }
    }

    /// Feed one closed trade into the rolling window and run the win-rate
    /// and consecutive-loss breakers.
    pub async fn record_trade_outcome(
        &self,
        pnl_sol: Decimal,
        is_win: bool,
        capital_sol: Decimal,
    ) -> Result<Option<CircuitBreakerType>> {
        let (window_size, win_rate_threshold, loss_threshold) = {
            let config = self.config.read().await;
            (
                config.risk.win_rate_window_size,
                config.risk.win_rate_threshold_pct,
                config.risk.consecutive_loss_threshold,
            )
        };

        let (consecutive, win_rate, window_full) = {
            let mut outcomes = self.outcomes.write().await;
            outcomes.window.push_back(is_win);
            while outcomes.window.len() > window_size {
                outcomes.window.pop_front();
            }
            if is_win {
                outcomes.consecutive_losses = 0;
            } else {
                outcomes.consecutive_losses += 1;
            }

            let wins = outcomes.window.iter().filter(|w| **w).count();
            let win_rate = wins as f64 / outcomes.window.len() as f64 * 100.0;
            (
                outcomes.consecutive_losses,
                win_rate,
                outcomes.window.len() >= window_size,
            )
        };

        tracing::debug!(
            pnl = %pnl_sol,
            is_win,
            consecutive,
            win_rate = format!("{win_rate:.1}"),
            "trade outcome recorded"
        );

        if consecutive >= loss_threshold {
            return self
                .trip(
                    CircuitBreakerType::ConsecutiveLoss,
                    Decimal::from(loss_threshold),
                    Decimal::from(consecutive),
                    capital_sol,
                )
                .await;
        }

        // The win-rate breaker only fires on a full window.
        if window_full && win_rate < win_rate_threshold {
            return self
                .trip(
                    CircuitBreakerType::WinRate,
                    Decimal::try_from(win_rate_threshold).unwrap_or_default(),
                    Decimal::try_from(win_rate).unwrap_or_default(),
                    capital_sol,
                )
                .await;
        }

        Ok(None)
    }

    /// Run the drawdown breaker against the observed drawdown percentage.
    pub async fn update_drawdown(
        &self,
        drawdown_pct: Decimal,
        capital_sol: Decimal,
    ) -> Result<Option<CircuitBreakerType>> {
        let threshold = self.config.read().await.risk.drawdown_threshold_pct;

        // Trips at exactly the threshold, not only beyond it.
        if drawdown_pct >= threshold {
            return self
                .trip(
                    CircuitBreakerType::Drawdown,
                    threshold,
                    drawdown_pct,
                    capital_sol,
                )
                .await;
        }

        Ok(None)
    }

    /// Drop the rolling window, typically on acknowledged resume.
    pub async fn reset_window(&self) {
        let mut outcomes = self.outcomes.write().await;
        outcomes.window.clear();
        outcomes.consecutive_losses = 0;
    }

    async fn trip(
        &self,
        breaker: CircuitBreakerType,
        threshold_value: Decimal,
        actual_value: Decimal,
        capital_sol: Decimal,
    ) -> Result<Option<CircuitBreakerType>> {
        // Already paused: the breaker stays tripped, no duplicate trigger.
        if !self.state.can_trade() {
            return Ok(None);
        }

        error!(
            breaker = breaker.as_str(),
            threshold = %threshold_value,
            actual = %actual_value,
            "circuit breaker tripped"
        );

        self.state.set_circuit_breaker_pause(breaker).await?;

        let trigger =
            CircuitBreakerTrigger::new(breaker, threshold_value, actual_value, capital_sol);
        if let Err(e) = self.events.append_breaker_trigger(&trigger).await {
            warn!(error = %e, "failed to append circuit breaker trigger");
        }

        Ok(Some(breaker))
    }
}
