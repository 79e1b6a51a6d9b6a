//! Composite signal scoring: a two-factor wallet score with cluster
//! amplification.

use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use walltrack_core::config::SharedConfig;
use walltrack_core::ports::ClusterService;
use walltrack_core::types::{ScoreBreakdown, ScoredSignal, SwapEvent, WalletProfile};

/// Produces a composite score in [0, 1] for a filtered swap event.
///
/// Every intermediate term is kept on the breakdown so a decision can be
/// explained without re-running the scorer.
pub struct SignalScorer {
    clusters: Arc<dyn ClusterService>,
    config: SharedConfig,
}

impl SignalScorer {
    pub fn new(clusters: Arc<dyn ClusterService>, config: SharedConfig) -> Self {
        Self { clusters, config }
    }

    pub async fn score(&self, event: &SwapEvent, wallet: &WalletProfile) -> ScoredSignal {
        let start = Instant::now();
        let scoring = self.config.read().await.scoring.clone();

        // Missing metrics contribute zero after normalization.
        let win_rate_norm = if wallet.total_trades == 0 {
            0.0
        } else {
            wallet.win_rate.unwrap_or(0.0).clamp(0.0, 1.0)
        };
        let pnl_norm = if wallet.total_trades == 0 {
            0.0
        } else {
            let avg_pnl = wallet.avg_pnl_per_trade_sol.to_f64().unwrap_or(0.0);
            ((avg_pnl - scoring.pnl_normalize_min)
                / (scoring.pnl_normalize_max - scoring.pnl_normalize_min))
                .clamp(0.0, 1.0)
        };

        let win_rate_component = win_rate_norm * scoring.wallet_win_rate_weight;
        let pnl_component = pnl_norm * scoring.wallet_pnl_weight;
        let mut wallet_score = win_rate_component + pnl_component;

        let cluster = match self.clusters.get_cluster_for(&event.wallet_address).await {
            Ok(info) => info,
            Err(e) => {
                warn!(wallet = %short(&event.wallet_address), error = %e, "cluster lookup failed");
                None
            }
        };

        let leader_bonus_applied = cluster.as_ref().map(|c| c.is_leader).unwrap_or(false);
        if leader_bonus_applied {
            wallet_score *= scoring.leader_bonus;
        }

        let cluster_multiplier_raw = cluster.as_ref().map(|c| c.multiplier).unwrap_or(1.0);
        let cluster_multiplier = if cluster.is_some() {
            cluster_multiplier_raw.clamp(scoring.min_cluster_boost, scoring.max_cluster_boost)
        } else {
            1.0
        };

        let final_score = (wallet_score * cluster_multiplier).clamp(0.0, 1.0);

        let breakdown = ScoreBreakdown {
            win_rate_component,
            pnl_component,
            wallet_score,
            leader_bonus_applied,
            leader_bonus: scoring.leader_bonus,
            cluster_multiplier_raw,
            cluster_multiplier,
            final_score,
        };

        let scoring_latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        debug!(
            wallet = %short(&event.wallet_address),
            score = format!("{final_score:.3}"),
            cluster = ?cluster.as_ref().and_then(|c| c.cluster_id.as_deref()),
            "signal scored"
        );

        ScoredSignal {
            signal_id: Uuid::new_v4(),
            event: event.clone(),
            breakdown,
            final_score,
            cluster_id: cluster.and_then(|c| c.cluster_id),
            scoring_latency_ms,
        }
    }
}

fn short(address: &str) -> &str {
    &address[..address.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use walltrack_core::config::TradingConfig;
    use walltrack_core::ports::{ClusterInfo, MockClusterService};
    use walltrack_core::types::SwapDirection;

    fn event() -> SwapEvent {
        SwapEvent {
            tx_signature: "sig1".into(),
            wallet_address: "W1".into(),
            token_address: "TokenA".into(),
            direction: SwapDirection::Buy,
            amount_token: dec!(1000),
            amount_sol: dec!(1.2),
            slot: 1,
            block_time: Utc::now(),
        }
    }

    fn wallet(win_rate: f64, avg_pnl: rust_decimal::Decimal, trades: u32) -> WalletProfile {
        let mut w = WalletProfile::default_for("W1");
        w.win_rate = Some(win_rate);
        w.avg_pnl_per_trade_sol = avg_pnl;
        w.total_trades = trades;
        w
    }

    fn scorer_with(cluster: Option<ClusterInfo>) -> SignalScorer {
        let mut clusters = MockClusterService::new();
        clusters
            .expect_get_cluster_for()
            .returning(move |_| Ok(cluster.clone()));
        SignalScorer::new(Arc::new(clusters), TradingConfig::default().shared())
    }

    #[tokio::test]
    async fn test_two_factor_wallet_score() {
        // win_rate 0.8 * 0.6 + pnl_norm 0.5 * 0.4 = 0.68
        // pnl_norm: (2.0 - (-1.0)) / (5.0 - (-1.0)) = 0.5
        let scorer = scorer_with(None);
        let scored = scorer.score(&event(), &wallet(0.8, dec!(2.0), 30)).await;

        assert!((scored.breakdown.wallet_score - 0.68).abs() < 1e-9);
        assert!((scored.final_score - 0.68).abs() < 1e-9);
        assert!(!scored.breakdown.leader_bonus_applied);
        assert_eq!(scored.breakdown.cluster_multiplier, 1.0);
    }

    #[tokio::test]
    async fn test_unknown_wallet_scores_zero_components() {
        let scorer = scorer_with(None);
        let scored = scorer.score(&event(), &wallet(0.9, dec!(5), 0)).await;
        assert_eq!(scored.breakdown.wallet_score, 0.0);
        assert_eq!(scored.final_score, 0.0);
    }

    #[tokio::test]
    async fn test_leader_bonus_applied() {
        let scorer = scorer_with(Some(ClusterInfo {
            cluster_id: Some("c1".into()),
            is_leader: true,
            multiplier: 1.0,
        }));
        let scored = scorer.score(&event(), &wallet(0.8, dec!(2.0), 30)).await;

        assert!(scored.breakdown.leader_bonus_applied);
        // 0.68 * 1.2 leader bonus = 0.816
        assert!((scored.breakdown.wallet_score - 0.816).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cluster_multiplier_clamped() {
        let scorer = scorer_with(Some(ClusterInfo {
            cluster_id: Some("c1".into()),
            is_leader: false,
            multiplier: 3.0,
        }));
        let scored = scorer.score(&event(), &wallet(0.5, dec!(0.5), 30)).await;

        assert_eq!(scored.breakdown.cluster_multiplier_raw, 3.0);
        // Clamped to max_cluster_boost = 1.5.
        assert_eq!(scored.breakdown.cluster_multiplier, 1.5);
    }

    #[tokio::test]
    async fn test_final_score_clamped_to_one() {
        let scorer = scorer_with(Some(ClusterInfo {
            cluster_id: Some("c1".into()),
            is_leader: true,
            multiplier: 1.5,
        }));
        let scored = scorer.score(&event(), &wallet(1.0, dec!(10), 50)).await;
        assert_eq!(scored.final_score, 1.0);
    }

    #[tokio::test]
    async fn test_breakdown_carries_intermediates() {
        let scorer = scorer_with(None);
        let scored = scorer.score(&event(), &wallet(0.8, dec!(2.0), 30)).await;

        let b = &scored.breakdown;
        assert!((b.win_rate_component - 0.48).abs() < 1e-9);
        assert!((b.pnl_component - 0.2).abs() < 1e-9);
        assert_eq!(b.final_score, scored.final_score);
        assert!(scored.scoring_latency_ms >= 0.0);
    }
}
