//! Position creation and close bookkeeping.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use walltrack_core::stores::{PositionStore, StrategyStore};
use walltrack_core::types::{ConvictionTier, ExitStrategy, Order, Position};
use walltrack_core::{Error, Result};

use crate::levels::LevelCalculator;

/// Name of the strategy bound to new positions.
pub const DEFAULT_EXIT_STRATEGY: &str = "default";

/// Creates positions from filled entry orders with their levels derived from
/// the active exit strategy.
pub struct PositionService {
    positions: Arc<dyn PositionStore>,
    strategies: Arc<dyn StrategyStore>,
}

impl PositionService {
    pub fn new(positions: Arc<dyn PositionStore>, strategies: Arc<dyn StrategyStore>) -> Self {
        Self {
            positions,
            strategies,
        }
    }

    /// The strategy bound to new entries.
    pub async fn active_strategy(&self) -> Result<ExitStrategy> {
        self.strategies
            .get_active_by_name(DEFAULT_EXIT_STRATEGY)
            .await?
            .ok_or_else(|| {
                Error::Rejected(format!(
                    "no active exit strategy named '{DEFAULT_EXIT_STRATEGY}'"
                ))
            })
    }

    /// Create a position from a filled entry order.
    pub async fn create_from_fill(
        &self,
        order: &Order,
        wallet_address: &str,
        cluster_id: Option<String>,
        conviction: ConvictionTier,
        strategy: &ExitStrategy,
    ) -> Result<Position> {
        let entry_price = order
            .actual_price
            .ok_or_else(|| Error::Rejected("filled order has no actual price".into()))?;
        let entry_tokens = order
            .amount_tokens
            .filter(|tokens| *tokens > Decimal::ZERO)
            .ok_or_else(|| Error::Rejected("filled order has no token amount".into()))?;
        let signal_id = order
            .signal_id
            .ok_or_else(|| Error::Rejected("entry order has no signal".into()))?;

        let levels = LevelCalculator::calculate(entry_price, strategy);

        let mut position = Position::open(
            signal_id,
            order.token_address.clone(),
            wallet_address,
            cluster_id,
            entry_price,
            order.amount_sol,
            entry_tokens,
            conviction,
            strategy.id,
            levels,
        );
        if order.is_simulated {
            position = position.simulated();
        }

        self.positions.create(&position).await?;

        info!(
            position_id = %position.id,
            token = %position.token_address,
            entry_price = %entry_price,
            amount_sol = %order.amount_sol,
            conviction = conviction.as_str(),
            "position opened"
        );

        Ok(position)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Position>> {
        self.positions.get_by_id(id).await
    }
}
