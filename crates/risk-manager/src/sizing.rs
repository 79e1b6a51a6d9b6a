//! Position sizing: conviction-scaled order sizes under capital and
//! concentration constraints.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use walltrack_core::config::{SharedConfig, SizingMode};
use walltrack_core::types::ConvictionTier;
use walltrack_core::Result;

use crate::concentration::{ConcentrationChecker, ConcentrationMetrics};

/// Inputs to one sizing decision.
#[derive(Debug, Clone)]
pub struct SizeRequest {
    pub signal_score: f64,
    pub available_balance_sol: Decimal,
    pub current_position_count: usize,
    pub current_allocated_sol: Decimal,
    /// Stop distance for risk-based sizing; falls back to the configured
    /// default when absent.
    pub stop_loss_pct: Option<Decimal>,
    pub token_address: String,
    pub cluster_id: Option<String>,
}

/// Why a signal was skipped before any order was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    LowScore,
    MaxPositions,
    MinSize,
    NoBalance,
}

/// Why a signal was blocked by concentration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Duplicate,
    Concentration,
}

/// Final sizing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingDecision {
    Approved,
    /// Approved but smaller than requested (cap or concentration).
    Reduced,
    Skipped(SkipReason),
    Blocked(BlockReason),
}

/// Full sizing result with audit fields.
#[derive(Debug, Clone)]
pub struct SizeResult {
    pub decision: SizingDecision,
    pub conviction_tier: ConvictionTier,
    pub multiplier: Decimal,
    pub base_size_sol: Decimal,
    /// Size before the concentration checker had its say.
    pub pre_concentration_size_sol: Decimal,
    pub final_size_sol: Decimal,
    pub reason: Option<String>,
    pub concentration: Option<ConcentrationMetrics>,
}

impl SizeResult {
    pub fn should_trade(&self) -> bool {
        matches!(
            self.decision,
            SizingDecision::Approved | SizingDecision::Reduced
        )
    }

    fn skipped(reason: SkipReason, detail: impl Into<String>) -> Self {
        Self {
            decision: SizingDecision::Skipped(reason),
            conviction_tier: ConvictionTier::None,
            multiplier: Decimal::ZERO,
            base_size_sol: Decimal::ZERO,
            pre_concentration_size_sol: Decimal::ZERO,
            final_size_sol: Decimal::ZERO,
            reason: Some(detail.into()),
            concentration: None,
        }
    }
}

/// Resolves the final order size for an eligible signal.
pub struct PositionSizer {
    config: SharedConfig,
    concentration: Arc<ConcentrationChecker>,
}

impl PositionSizer {
    pub fn new(config: SharedConfig, concentration: Arc<ConcentrationChecker>) -> Self {
        Self {
            config,
            concentration,
        }
    }

    pub async fn calculate(&self, request: &SizeRequest) -> Result<SizeResult> {
        let sizing = self.config.read().await.sizing.clone();
        let hundred = Decimal::new(100, 0);

        if request.signal_score < sizing.min_conviction_threshold {
            return Ok(SizeResult::skipped(
                SkipReason::LowScore,
                format!(
                    "score {:.3} below sizing threshold {}",
                    request.signal_score, sizing.min_conviction_threshold
                ),
            ));
        }

        if request.current_position_count >= sizing.max_concurrent_positions {
            return Ok(SizeResult::skipped(
                SkipReason::MaxPositions,
                format!(
                    "{} positions open, limit {}",
                    request.current_position_count, sizing.max_concurrent_positions
                ),
            ));
        }

        let (conviction_tier, multiplier) =
            if request.signal_score >= sizing.high_conviction_threshold {
                (ConvictionTier::High, sizing.high_conviction_multiplier)
            } else {
                (
                    ConvictionTier::Standard,
                    sizing.standard_conviction_multiplier,
                )
            };

        let total_capital = request.available_balance_sol + request.current_allocated_sol;
        let usable = request.available_balance_sol - sizing.reserve_sol;
        let allocation_room = sizing.max_capital_allocation_pct / hundred * total_capital
            - request.current_allocated_sol;
        let capital_base = usable.min(allocation_room);

        if capital_base <= Decimal::ZERO {
            return Ok(SizeResult::skipped(
                SkipReason::NoBalance,
                "no usable capital after reserve and allocation cap",
            ));
        }

        let base_size_sol = match sizing.mode {
            SizingMode::FixedPercent => capital_base * sizing.base_position_pct / hundred,
            SizingMode::RiskBased => {
                let stop_loss_pct = request
                    .stop_loss_pct
                    .unwrap_or(sizing.default_stop_loss_pct);
                let max_risk = total_capital * sizing.risk_per_trade_pct / hundred;
                max_risk / (stop_loss_pct / hundred)
            }
        };

        let raw_size = base_size_sol * multiplier;

        // Clamp into the configured bounds and what capital actually allows.
        let mut final_size = raw_size.min(sizing.max_position_sol).min(capital_base);
        let mut decision = if final_size < raw_size {
            SizingDecision::Reduced
        } else {
            SizingDecision::Approved
        };

        if final_size < sizing.min_position_sol {
            return Ok(SizeResult::skipped(
                SkipReason::MinSize,
                format!(
                    "size {} below minimum {}",
                    final_size, sizing.min_position_sol
                ),
            ));
        }

        let pre_concentration_size_sol = final_size;

        let metrics = self
            .concentration
            .check_entry(
                &request.token_address,
                final_size,
                total_capital,
                request.cluster_id.as_deref(),
            )
            .await?;

        if metrics.is_blocked() {
            let block = if metrics.is_duplicate {
                BlockReason::Duplicate
            } else {
                BlockReason::Concentration
            };
            return Ok(SizeResult {
                decision: SizingDecision::Blocked(block),
                conviction_tier,
                multiplier,
                base_size_sol,
                pre_concentration_size_sol,
                final_size_sol: Decimal::ZERO,
                reason: Some("blocked by concentration limits".into()),
                concentration: Some(metrics),
            });
        }

        if metrics.was_adjusted {
            final_size = metrics.max_allowed_sol;
            decision = SizingDecision::Reduced;
            if final_size < sizing.min_position_sol {
                return Ok(SizeResult::skipped(
                    SkipReason::MinSize,
                    "concentration allowance below minimum position size",
                ));
            }
        }

        debug!(
            token = %request.token_address,
            tier = conviction_tier.as_str(),
            size = %final_size,
            decision = ?decision,
            "position sized"
        );

        Ok(SizeResult {
            decision,
            conviction_tier,
            multiplier,
            base_size_sol,
            pre_concentration_size_sol,
            final_size_sol: final_size,
            reason: None,
            concentration: Some(metrics),
        })
    }
}
