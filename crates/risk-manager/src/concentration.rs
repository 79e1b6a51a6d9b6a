//! Concentration limits: per-token, per-cluster, and duplicate-position
//! enforcement.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use walltrack_core::config::SharedConfig;
use walltrack_core::stores::PositionStore;
use walltrack_core::Result;

/// Everything the checker measured, plus the adjusted allowance.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ConcentrationMetrics {
    pub requested_sol: Decimal,
    /// The amount the caller may actually commit.
    pub max_allowed_sol: Decimal,
    pub was_adjusted: bool,
    pub is_duplicate: bool,
    pub is_token_limit_hit: bool,
    pub is_cluster_limit_hit: bool,
    pub is_cluster_max_positions: bool,
    pub current_token_allocation_sol: Decimal,
}

impl ConcentrationMetrics {
    pub fn is_blocked(&self) -> bool {
        self.is_duplicate
            || self.is_token_limit_hit
            || self.is_cluster_limit_hit
            || self.is_cluster_max_positions
    }

    fn pass_through(requested_sol: Decimal) -> Self {
        Self {
            requested_sol,
            max_allowed_sol: requested_sol,
            ..Default::default()
        }
    }
}

/// Enforces portfolio concentration limits before an entry is sized.
pub struct ConcentrationChecker {
    positions: Arc<dyn PositionStore>,
    config: SharedConfig,
}

impl ConcentrationChecker {
    pub fn new(positions: Arc<dyn PositionStore>, config: SharedConfig) -> Self {
        Self { positions, config }
    }

    /// Check an entry of `requested_sol` into `token_address` against the
    /// current portfolio. May reduce the allowance or block outright.
    pub async fn check_entry(
        &self,
        token_address: &str,
        requested_sol: Decimal,
        portfolio_value_sol: Decimal,
        cluster_id: Option<&str>,
    ) -> Result<ConcentrationMetrics> {
        let config = self.config.read().await.concentration.clone();
        if !config.enabled {
            return Ok(ConcentrationMetrics::pass_through(requested_sol));
        }

        let mut metrics = ConcentrationMetrics {
            requested_sol,
            max_allowed_sol: requested_sol,
            ..Default::default()
        };

        if config.block_duplicate_positions {
            let existing = self.positions.open_for_token(token_address).await?;
            if !existing.is_empty() {
                metrics.is_duplicate = true;
                metrics.max_allowed_sol = Decimal::ZERO;
                return Ok(metrics);
            }
        }

        let current = self.positions.token_allocation(token_address).await?;
        metrics.current_token_allocation_sol = current;

        // The first position into an empty portfolio has nothing to be
        // concentrated against.
        if portfolio_value_sol > Decimal::ZERO {
            let hundred = Decimal::new(100, 0);
            let token_cap = config.max_token_concentration_pct / hundred * portfolio_value_sol;

            if current >= token_cap {
                metrics.is_token_limit_hit = true;
                metrics.max_allowed_sol = Decimal::ZERO;
                return Ok(metrics);
            }

            let token_room = token_cap - current;
            if requested_sol > token_room {
                metrics.max_allowed_sol = token_room;
                metrics.was_adjusted = true;
            }

            if let Some(cluster_id) = cluster_id {
                let cluster_positions =
                    self.positions.count_open_in_cluster(cluster_id).await?;
                if cluster_positions as usize >= config.max_positions_per_cluster {
                    metrics.is_cluster_max_positions = true;
                    metrics.max_allowed_sol = Decimal::ZERO;
                    return Ok(metrics);
                }

                let cluster_current = self.positions.cluster_allocation(cluster_id).await?;
                let cluster_cap =
                    config.max_cluster_concentration_pct / hundred * portfolio_value_sol;
                if cluster_current >= cluster_cap {
                    metrics.is_cluster_limit_hit = true;
                    metrics.max_allowed_sol = Decimal::ZERO;
                    return Ok(metrics);
                }

                let cluster_room = cluster_cap - cluster_current;
                if metrics.max_allowed_sol > cluster_room {
                    metrics.max_allowed_sol = cluster_room;
                    metrics.was_adjusted = true;
                }
            }
        }

        if metrics.was_adjusted {
            debug!(
                token = %token_address,
                requested = %requested_sol,
                allowed = %metrics.max_allowed_sol,
                "entry reduced by concentration limits"
            );
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use walltrack_core::config::TradingConfig;
    use walltrack_core::stores::MockPositionStore;
    use walltrack_core::types::Position;

    fn checker(
        duplicates: bool,
        token_alloc: Decimal,
        cluster_count: i64,
        cluster_alloc: Decimal,
        enabled: bool,
    ) -> ConcentrationChecker {
        let mut config = TradingConfig::default();
        config.concentration.enabled = enabled;

        let mut positions = MockPositionStore::new();
        positions.expect_open_for_token().returning(move |_| {
            if duplicates {
                Ok(vec![sample_position()])
            } else {
                Ok(vec![])
            }
        });
        positions
            .expect_token_allocation()
            .returning(move |_| Ok(token_alloc));
        positions
            .expect_count_open_in_cluster()
            .returning(move |_| Ok(cluster_count));
        positions
            .expect_cluster_allocation()
            .returning(move |_| Ok(cluster_alloc));

        ConcentrationChecker::new(Arc::new(positions), config.shared())
    }

    fn sample_position() -> Position {
        use walltrack_core::types::{CalculatedLevel, ConvictionTier, PositionLevels};
        Position::open(
            uuid::Uuid::new_v4(),
            "TokenA",
            "W1",
            None,
            dec!(1),
            dec!(1),
            dec!(1000),
            ConvictionTier::Standard,
            uuid::Uuid::new_v4(),
            PositionLevels {
                entry_price: dec!(1),
                stop_loss_price: dec!(0.5),
                moonbag_stop_price: None,
                trailing_stop_current_price: None,
                take_profit_levels: Vec::<CalculatedLevel>::new(),
            },
        )
    }

    #[tokio::test]
    async fn test_first_position_allowed_in_full() {
        let checker = checker(false, dec!(0), 0, dec!(0), true);
        let metrics = checker
            .check_entry("TokenA", dec!(1), dec!(0), None)
            .await
            .unwrap();
        assert!(!metrics.is_blocked());
        assert_eq!(metrics.max_allowed_sol, dec!(1));
    }

    #[tokio::test]
    async fn test_duplicate_position_blocked() {
        let checker = checker(true, dec!(0), 0, dec!(0), true);
        let metrics = checker
            .check_entry("TokenA", dec!(1), dec!(100), None)
            .await
            .unwrap();
        assert!(metrics.is_duplicate);
        assert!(metrics.is_blocked());
        assert_eq!(metrics.max_allowed_sol, dec!(0));
    }

    #[tokio::test]
    async fn test_reduced_to_token_room() {
        // Portfolio 100, cap 10% = 10, current 4 -> room 6.
        let checker = checker(false, dec!(4), 0, dec!(0), true);
        let metrics = checker
            .check_entry("TokenA", dec!(8), dec!(100), None)
            .await
            .unwrap();
        assert!(metrics.was_adjusted);
        assert!(!metrics.is_blocked());
        assert_eq!(metrics.max_allowed_sol, dec!(6));
    }

    #[tokio::test]
    async fn test_blocked_when_token_at_limit() {
        // Portfolio 100, cap 10, current 10 -> hit.
        let checker = checker(false, dec!(10), 0, dec!(0), true);
        let metrics = checker
            .check_entry("TokenA", dec!(1), dec!(100), None)
            .await
            .unwrap();
        assert!(metrics.is_token_limit_hit);
        assert!(metrics.is_blocked());
    }

    #[tokio::test]
    async fn test_cluster_max_positions_blocked() {
        let checker = checker(false, dec!(0), 3, dec!(0), true);
        let metrics = checker
            .check_entry("TokenA", dec!(1), dec!(100), Some("c1"))
            .await
            .unwrap();
        assert!(metrics.is_cluster_max_positions);
        assert!(metrics.is_blocked());
    }

    #[tokio::test]
    async fn test_cluster_allocation_reduces() {
        // Cluster cap 20% of 100 = 20, current 18 -> room 2.
        let checker = checker(false, dec!(0), 1, dec!(18), true);
        let metrics = checker
            .check_entry("TokenA", dec!(5), dec!(100), Some("c1"))
            .await
            .unwrap();
        assert!(metrics.was_adjusted);
        assert_eq!(metrics.max_allowed_sol, dec!(2));
    }

    #[tokio::test]
    async fn test_disabled_allows_everything() {
        let checker = checker(true, dec!(1000), 10, dec!(1000), false);
        let metrics = checker
            .check_entry("TokenA", dec!(50), dec!(10), Some("c1"))
            .await
            .unwrap();
        assert!(!metrics.is_blocked());
        assert_eq!(metrics.max_allowed_sol, dec!(50));
    }
}
