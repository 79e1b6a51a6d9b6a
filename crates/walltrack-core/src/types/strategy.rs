//! Exit strategies: versioned rule sets bound to positions at entry.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Lifecycle of a strategy version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyStatus {
    Draft,
    Active,
    Archived,
}

impl StrategyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyStatus::Draft => "draft",
            StrategyStatus::Active => "active",
            StrategyStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "draft" => StrategyStatus::Draft,
            "active" => StrategyStatus::Active,
            _ => StrategyStatus::Archived,
        }
    }
}

/// Kind of exit rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitRuleType {
    StopLoss,
    TakeProfit,
    TrailingStop,
    TimeBased,
}

/// Extra parameters for specific rule types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitRuleParams {
    /// Profit percentage at which a trailing stop arms.
    pub activation_pct: Option<Decimal>,
}

/// One rule inside an exit strategy.
///
/// `trigger_pct` interpretation depends on the rule type: negative for
/// stop-loss and trailing offset, positive profit percentage for take-profit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitRule {
    pub rule_type: ExitRuleType,
    pub trigger_pct: Decimal,
    /// Percentage of the tradeable portion to sell, in (0, 100].
    pub exit_pct: Decimal,
    pub priority: i32,
    pub enabled: bool,
    #[serde(default)]
    pub params: ExitRuleParams,
}

impl ExitRule {
    pub fn validate(&self) -> Result<()> {
        if self.exit_pct <= Decimal::ZERO || self.exit_pct > Decimal::new(100, 0) {
            return Err(Error::Validation(format!(
                "exit_pct must be in (0, 100], got {}",
                self.exit_pct
            )));
        }
        match self.rule_type {
            ExitRuleType::StopLoss | ExitRuleType::TrailingStop => {
                if self.trigger_pct >= Decimal::ZERO {
                    return Err(Error::Validation(format!(
                        "{:?} trigger_pct must be negative, got {}",
                        self.rule_type, self.trigger_pct
                    )));
                }
            }
            ExitRuleType::TakeProfit => {
                if self.trigger_pct <= Decimal::ZERO {
                    return Err(Error::Validation(format!(
                        "take-profit trigger_pct must be positive, got {}",
                        self.trigger_pct
                    )));
                }
            }
            ExitRuleType::TimeBased => {}
        }
        Ok(())
    }
}

/// Moonbag settings: the portion kept after all take-profits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoonbagConfig {
    pub enabled: bool,
    /// Percentage of the position retained, in [0, 100).
    pub percentage: Decimal,
    /// Loss percentage from entry at which the moonbag is stopped out.
    /// Absent means the moonbag rides to zero.
    pub stop_pct: Option<Decimal>,
}

impl MoonbagConfig {
    pub fn has_moonbag(&self) -> bool {
        self.enabled && self.percentage > Decimal::ZERO
    }
}

/// A versioned exit strategy.
///
/// Active versions are immutable: edits fork a new draft, and activating a
/// version archives the currently active version of the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitStrategy {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub status: StrategyStatus,
    /// Ordered by ascending priority.
    pub rules: Vec<ExitRule>,
    pub moonbag: MoonbagConfig,
    pub max_hold_hours: Option<i64>,
    pub stagnation_hours: Option<i64>,
    pub stagnation_threshold_pct: Option<Decimal>,
}

impl ExitStrategy {
    pub fn new(name: impl Into<String>, rules: Vec<ExitRule>) -> Result<Self> {
        let mut rules = rules;
        for rule in &rules {
            rule.validate()?;
        }
        rules.sort_by_key(|r| r.priority);
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            version: 1,
            status: StrategyStatus::Draft,
            rules,
            moonbag: MoonbagConfig::default(),
            max_hold_hours: None,
            stagnation_hours: None,
            stagnation_threshold_pct: None,
        })
    }

    /// Fork a new draft with the next version number.
    ///
    /// This is the only way to "edit" an active strategy.
    pub fn fork_draft(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: self.version + 1,
            status: StrategyStatus::Draft,
            ..self.clone()
        }
    }

    pub fn stop_loss_rule(&self) -> Option<&ExitRule> {
        self.rules
            .iter()
            .find(|r| r.enabled && r.rule_type == ExitRuleType::StopLoss)
    }

    /// Enabled take-profit rules in priority order.
    pub fn take_profit_rules(&self) -> Vec<&ExitRule> {
        self.rules
            .iter()
            .filter(|r| r.enabled && r.rule_type == ExitRuleType::TakeProfit)
            .collect()
    }

    pub fn trailing_stop_rule(&self) -> Option<&ExitRule> {
        self.rules
            .iter()
            .find(|r| r.enabled && r.rule_type == ExitRuleType::TrailingStop)
    }

    pub fn has_time_limits(&self) -> bool {
        self.max_hold_hours.is_some() || self.stagnation_hours.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn stop_loss(trigger: Decimal) -> ExitRule {
        ExitRule {
            rule_type: ExitRuleType::StopLoss,
            trigger_pct: trigger,
            exit_pct: dec!(100),
            priority: 0,
            enabled: true,
            params: ExitRuleParams::default(),
        }
    }

    fn take_profit(trigger: Decimal, exit_pct: Decimal, priority: i32) -> ExitRule {
        ExitRule {
            rule_type: ExitRuleType::TakeProfit,
            trigger_pct: trigger,
            exit_pct,
            priority,
            enabled: true,
            params: ExitRuleParams::default(),
        }
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let strategy = ExitStrategy::new(
            "ladder",
            vec![
                take_profit(dec!(100), dec!(50), 2),
                stop_loss(dec!(-50)),
                take_profit(dec!(50), dec!(50), 1),
            ],
        )
        .unwrap();

        let priorities: Vec<i32> = strategy.rules.iter().map(|r| r.priority).collect();
        assert_eq!(priorities, vec![0, 1, 2]);
    }

    #[test]
    fn test_positive_stop_loss_rejected() {
        let result = ExitStrategy::new("bad", vec![stop_loss(dec!(50))]);
        assert!(result.is_err());
    }

    #[test]
    fn test_fork_bumps_version_and_resets_status() {
        let mut strategy = ExitStrategy::new("ladder", vec![stop_loss(dec!(-50))]).unwrap();
        strategy.status = StrategyStatus::Active;

        let draft = strategy.fork_draft();
        assert_eq!(draft.version, 2);
        assert_eq!(draft.status, StrategyStatus::Draft);
        assert_ne!(draft.id, strategy.id);
        assert_eq!(draft.name, strategy.name);
    }

    #[test]
    fn test_take_profit_rules_filtered_and_ordered() {
        let mut disabled = take_profit(dec!(200), dec!(100), 3);
        disabled.enabled = false;
        let strategy = ExitStrategy::new(
            "ladder",
            vec![
                stop_loss(dec!(-50)),
                take_profit(dec!(50), dec!(50), 1),
                take_profit(dec!(100), dec!(50), 2),
                disabled,
            ],
        )
        .unwrap();

        let tps = strategy.take_profit_rules();
        assert_eq!(tps.len(), 2);
        assert_eq!(tps[0].trigger_pct, dec!(50));
    }
}
