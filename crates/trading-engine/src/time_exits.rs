//! Time-based exits: maximum hold duration and stagnation windows.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use walltrack_core::types::{ExitReason, ExitStrategy, Position};

/// Per-position stagnation tracking.
#[derive(Debug, Clone)]
pub struct StagnationWindow {
    pub window_start: DateTime<Utc>,
    pub price_at_start: Decimal,
    pub window_hours: i64,
}

impl StagnationWindow {
    pub fn is_complete(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start >= Duration::hours(self.window_hours)
    }
}

/// Evaluates max-hold and stagnation rules for open positions.
///
/// Stagnation windows live in memory keyed by position id; a window that
/// completes without enough price movement fires, otherwise it rolls forward
/// from the current price.
pub struct TimeExitManager {
    windows: DashMap<Uuid, StagnationWindow>,
}

impl TimeExitManager {
    pub fn new() -> Self {
        Self {
            windows: DashMap::new(),
        }
    }

    /// Check time rules; either rule yields a full exit.
    pub fn check(
        &self,
        position: &Position,
        strategy: &ExitStrategy,
        current_price: Decimal,
        now: DateTime<Utc>,
    ) -> Option<ExitReason> {
        if let Some(max_hold_hours) = strategy.max_hold_hours {
            if now - position.opened_at >= Duration::hours(max_hold_hours) {
                debug!(
                    position_id = %position.id,
                    held_hours = (now - position.opened_at).num_hours(),
                    "max hold duration reached"
                );
                return Some(ExitReason::TimeLimit);
            }
        }

        if let (Some(window_hours), Some(threshold_pct)) =
            (strategy.stagnation_hours, strategy.stagnation_threshold_pct)
        {
            let mut window = self
                .windows
                .entry(position.id)
                .or_insert_with(|| StagnationWindow {
                    window_start: position.opened_at,
                    price_at_start: position.entry_price,
                    window_hours,
                });

            if window.is_complete(now) {
                let movement_pct = if window.price_at_start.is_zero() {
                    Decimal::ZERO
                } else {
                    ((current_price - window.price_at_start) / window.price_at_start
                        * Decimal::new(100, 0))
                    .abs()
                };

                if movement_pct <= threshold_pct {
                    debug!(
                        position_id = %position.id,
                        movement_pct = %movement_pct,
                        threshold = %threshold_pct,
                        "stagnation window fired"
                    );
                    return Some(ExitReason::Stagnation);
                }

                // Enough movement: roll the window from here.
                window.window_start = now;
                window.price_at_start = current_price;
            }
        }

        None
    }

    /// Drop tracking for a closed position.
    pub fn remove(&self, position_id: Uuid) {
        self.windows.remove(&position_id);
    }

    #[cfg(test)]
    fn set_window(&self, position_id: Uuid, window: StagnationWindow) {
        self.windows.insert(position_id, window);
    }
}

impl Default for TimeExitManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use walltrack_core::types::{ConvictionTier, PositionLevels};

    fn position(opened_hours_ago: i64) -> Position {
        let mut position = Position::open(
            Uuid::new_v4(),
            "TokenA",
            "W1",
            None,
            dec!(1.0),
            dec!(1.0),
            dec!(1000),
            ConvictionTier::Standard,
            Uuid::new_v4(),
            PositionLevels {
                entry_price: dec!(1.0),
                stop_loss_price: dec!(0.5),
                moonbag_stop_price: None,
                trailing_stop_current_price: None,
                take_profit_levels: vec![],
            },
        );
        position.opened_at = Utc::now() - Duration::hours(opened_hours_ago);
        position
    }

    fn strategy(max_hold: Option<i64>, stagnation: Option<(i64, Decimal)>) -> ExitStrategy {
        let mut strategy = ExitStrategy::new("time", vec![]).unwrap();
        strategy.max_hold_hours = max_hold;
        if let Some((hours, threshold)) = stagnation {
            strategy.stagnation_hours = Some(hours);
            strategy.stagnation_threshold_pct = Some(threshold);
        }
        strategy
    }

    #[test]
    fn test_no_exit_before_max_hold() {
        let manager = TimeExitManager::new();
        let result = manager.check(
            &position(10),
            &strategy(Some(24), None),
            dec!(1.0),
            Utc::now(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_exit_at_max_hold() {
        let manager = TimeExitManager::new();
        let result = manager.check(
            &position(25),
            &strategy(Some(24), None),
            dec!(1.4),
            Utc::now(),
        );
        assert_eq!(result, Some(ExitReason::TimeLimit));
    }

    #[test]
    fn test_no_stagnation_before_window_completes() {
        let manager = TimeExitManager::new();
        let result = manager.check(
            &position(2),
            &strategy(None, Some((6, dec!(5)))),
            dec!(1.01),
            Utc::now(),
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_stagnation_fires_on_flat_price() {
        let manager = TimeExitManager::new();
        let position = position(7);
        manager.set_window(
            position.id,
            StagnationWindow {
                window_start: Utc::now() - Duration::hours(7),
                price_at_start: dec!(1.0),
                window_hours: 6,
            },
        );

        let result = manager.check(
            &position,
            &strategy(None, Some((6, dec!(5)))),
            dec!(1.02),
            Utc::now(),
        );
        assert_eq!(result, Some(ExitReason::Stagnation));
    }

    #[test]
    fn test_no_stagnation_with_movement_rolls_window() {
        let manager = TimeExitManager::new();
        let position = position(7);
        manager.set_window(
            position.id,
            StagnationWindow {
                window_start: Utc::now() - Duration::hours(7),
                price_at_start: dec!(1.0),
                window_hours: 6,
            },
        );

        let result = manager.check(
            &position,
            &strategy(None, Some((6, dec!(5)))),
            dec!(1.30),
            Utc::now(),
        );
        assert!(result.is_none());

        // The window rolled: price_at_start is now the current price.
        let window = manager.windows.get(&position.id).unwrap();
        assert_eq!(window.price_at_start, dec!(1.30));
    }

    #[test]
    fn test_stagnation_can_fire_in_profit() {
        // Up 48% since entry but flat within the window still stagnates.
        let manager = TimeExitManager::new();
        let position = position(20);
        manager.set_window(
            position.id,
            StagnationWindow {
                window_start: Utc::now() - Duration::hours(7),
                price_at_start: dec!(1.48),
                window_hours: 6,
            },
        );

        let result = manager.check(
            &position,
            &strategy(None, Some((6, dec!(5)))),
            dec!(1.50),
            Utc::now(),
        );
        assert_eq!(result, Some(ExitReason::Stagnation));
    }

    #[test]
    fn test_remove_drops_window() {
        let manager = TimeExitManager::new();
        let position = position(7);
        manager.check(
            &position,
            &strategy(None, Some((6, dec!(5)))),
            dec!(1.0),
            Utc::now(),
        );
        assert!(manager.windows.contains_key(&position.id));
        manager.remove(position.id);
        assert!(!manager.windows.contains_key(&position.id));
    }
}
