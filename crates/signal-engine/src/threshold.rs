//! Threshold gate: trade eligibility and conviction tiering.

use tracing::debug;

use walltrack_core::config::SharedConfig;
use walltrack_core::types::{
    ConvictionTier, EligibilityStatus, GateDecision, ScoredSignal, TokenCharacteristics,
};

/// Compares composite scores against the configured threshold and tags the
/// conviction tier with its sizing multiplier.
pub struct ThresholdGate {
    config: SharedConfig,
}

impl ThresholdGate {
    pub fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    pub async fn gate(
        &self,
        scored: &ScoredSignal,
        token: &TokenCharacteristics,
    ) -> GateDecision {
        let config = self.config.read().await;
        let threshold = config.scoring.trade_threshold;

        // A honeypot never trades, no matter the score.
        if token.is_honeypot {
            return GateDecision {
                eligibility: EligibilityStatus::BelowThreshold,
                conviction: ConvictionTier::None,
                position_multiplier: config.sizing.standard_conviction_multiplier,
                threshold_used: threshold,
                reason: Some("token flagged as honeypot".into()),
            };
        }

        // Threshold comparison is inclusive.
        if scored.final_score < threshold {
            return GateDecision {
                eligibility: EligibilityStatus::BelowThreshold,
                conviction: ConvictionTier::None,
                position_multiplier: config.sizing.standard_conviction_multiplier,
                threshold_used: threshold,
                reason: Some(format!(
                    "score {:.3} below threshold {threshold}",
                    scored.final_score
                )),
            };
        }

        let (conviction, position_multiplier) =
            if scored.final_score >= config.scoring.high_conviction_threshold {
                (
                    ConvictionTier::High,
                    config.sizing.high_conviction_multiplier,
                )
            } else {
                (
                    ConvictionTier::Standard,
                    config.sizing.standard_conviction_multiplier,
                )
            };

        debug!(
            score = format!("{:.3}", scored.final_score),
            conviction = conviction.as_str(),
            "signal trade eligible"
        );

        GateDecision {
            eligibility: EligibilityStatus::Eligible,
            conviction,
            position_multiplier,
            threshold_used: threshold,
            reason: None,
        }
    }
}
