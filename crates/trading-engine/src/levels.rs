//! Derives position price levels from an exit strategy.

use rust_decimal::Decimal;

use walltrack_core::types::{CalculatedLevel, ExitStrategy, PositionLevels};

/// Translates strategy rule percentages into absolute price levels at entry
/// time, and keeps the trailing stop ratcheted to the peak afterwards.
pub struct LevelCalculator;

impl LevelCalculator {
    /// Build the levels for a position entered at `entry_price`.
    pub fn calculate(entry_price: Decimal, strategy: &ExitStrategy) -> PositionLevels {
        let hundred = Decimal::new(100, 0);

        // No stop rule leaves the stop at zero, which can never trigger.
        let stop_loss_price = strategy
            .stop_loss_rule()
            .map(|rule| entry_price * (hundred + rule.trigger_pct) / hundred)
            .unwrap_or(Decimal::ZERO);

        let mut take_profit_levels: Vec<CalculatedLevel> = strategy
            .take_profit_rules()
            .iter()
            .map(|rule| CalculatedLevel {
                level_type: String::new(),
                trigger_price: entry_price * (hundred + rule.trigger_pct) / hundred,
                sell_percentage: rule.exit_pct,
                is_triggered: false,
                triggered_at: None,
                tx_signature: None,
            })
            .collect();
        take_profit_levels.sort_by(|a, b| a.trigger_price.cmp(&b.trigger_price));
        for (i, level) in take_profit_levels.iter_mut().enumerate() {
            level.level_type = format!("tp_{}", i + 1);
        }

        let moonbag_stop_price = if strategy.moonbag.has_moonbag() {
            strategy
                .moonbag
                .stop_pct
                .map(|pct| entry_price * (hundred + pct) / hundred)
        } else {
            None
        };

        PositionLevels {
            entry_price,
            stop_loss_price,
            moonbag_stop_price,
            // Arms once the activation profit is reached.
            trailing_stop_current_price: None,
            take_profit_levels,
        }
    }

    /// Recompute the trailing stop from a new peak price.
    ///
    /// The stop only ratchets upward, and only once the peak has cleared the
    /// rule's activation profit.
    pub fn recalculate_trailing(
        levels: &mut PositionLevels,
        peak_price: Decimal,
        strategy: &ExitStrategy,
    ) {
        let Some(rule) = strategy.trailing_stop_rule() else {
            return;
        };
        let hundred = Decimal::new(100, 0);

        let activation_pct = rule.params.activation_pct.unwrap_or(Decimal::ZERO);
        let activation_price = levels.entry_price * (hundred + activation_pct) / hundred;
        if peak_price < activation_price {
            return;
        }

        let candidate = peak_price * (hundred + rule.trigger_pct) / hundred;
        match levels.trailing_stop_current_price {
            Some(current) if candidate <= current => {}
            _ => levels.trailing_stop_current_price = Some(candidate),
        }
    }
}
