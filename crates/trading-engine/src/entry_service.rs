//! Entry order service: turns a gated, sized signal into an order and a
//! position.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use risk_manager::sizing::{PositionSizer, SizeRequest};
use risk_manager::system_state::SystemStateManager;
use walltrack_core::config::SharedConfig;
use walltrack_core::oracle::PriceOracle;
use walltrack_core::ports::TradeClient;
use walltrack_core::stores::{OrderStore, PositionStore, SignalLog};
use walltrack_core::types::{
    ConvictionTier, ExecutionStatus, GateDecision, Order, OrderStatus, ScoredSignal,
};
use walltrack_core::Result;

use crate::executor::{OrderExecutor, OrderResult};
use crate::position_service::PositionService;

/// Entry slippage tolerance by conviction tier.
fn entry_slippage_bps(conviction: ConvictionTier) -> u32 {
    match conviction {
        ConvictionTier::High => 150,
        _ => 100,
    }
}

/// Drives the entry path: risk gate, pricing, sizing, order creation,
/// execution, and position creation on fill.
pub struct EntryOrderService {
    state: Arc<SystemStateManager>,
    oracle: Arc<PriceOracle>,
    sizer: Arc<PositionSizer>,
    executor: Arc<OrderExecutor>,
    client: Arc<dyn TradeClient>,
    orders: Arc<dyn OrderStore>,
    signals: Arc<dyn SignalLog>,
    positions: Arc<dyn PositionStore>,
    position_service: Arc<PositionService>,
    config: SharedConfig,
}

impl EntryOrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: Arc<SystemStateManager>,
        oracle: Arc<PriceOracle>,
        sizer: Arc<PositionSizer>,
        executor: Arc<OrderExecutor>,
        client: Arc<dyn TradeClient>,
        orders: Arc<dyn OrderStore>,
        signals: Arc<dyn SignalLog>,
        positions: Arc<dyn PositionStore>,
        position_service: Arc<PositionService>,
        config: SharedConfig,
    ) -> Self {
        Self {
            state,
            oracle,
            sizer,
            executor,
            client,
            orders,
            signals,
            positions,
            position_service,
            config,
        }
    }

    /// Process an eligible, slot-admitted signal into an order.
    ///
    /// Returns the order when one was created (filled or awaiting retry);
    /// `None` when the signal was blocked, skipped, or failed before an
    /// order existed.
    pub async fn process_signal(
        &self,
        scored: &ScoredSignal,
        decision: &GateDecision,
    ) -> Result<Option<Order>> {
        let signal_id = scored.signal_id;

        if !self.state.can_trade() {
            self.signals
                .update_execution_status(signal_id, ExecutionStatus::Blocked, Some("system paused"))
                .await?;
            info!(signal_id = %signal_id, "entry blocked: system paused");
            return Ok(None);
        }

        let quote = match self.oracle.price_of(&scored.event.token_address).await {
            Ok(quote) => quote,
            Err(e) => {
                warn!(signal_id = %signal_id, error = %e, "entry aborted: price fetch failed");
                self.signals
                    .update_execution_status(
                        signal_id,
                        ExecutionStatus::Failed,
                        Some("price fetch failed"),
                    )
                    .await?;
                return Ok(None);
            }
        };

        let available = self.client.available_balance_sol().await?;
        let allocated = self.positions.total_allocation().await?;
        let open_count = self.positions.count_open().await?;

        let size = self
            .sizer
            .calculate(&SizeRequest {
                signal_score: scored.final_score,
                available_balance_sol: available,
                current_position_count: open_count as usize,
                current_allocated_sol: allocated,
                stop_loss_pct: None,
                token_address: scored.event.token_address.clone(),
                cluster_id: scored.cluster_id.clone(),
            })
            .await?;

        if !size.should_trade() {
            let detail = size
                .reason
                .clone()
                .unwrap_or_else(|| format!("{:?}", size.decision));
            let status = match size.decision {
                risk_manager::sizing::SizingDecision::Blocked(_) => ExecutionStatus::Blocked,
                _ => ExecutionStatus::Skipped,
            };
            self.signals
                .update_execution_status(signal_id, status, Some(&detail))
                .await?;
            info!(signal_id = %signal_id, detail = %detail, "entry not sized");
            return Ok(None);
        }

        let strategy = match self.position_service.active_strategy().await {
            Ok(strategy) => strategy,
            Err(e) => {
                warn!(signal_id = %signal_id, error = %e, "entry aborted: no exit strategy");
                self.signals
                    .update_execution_status(
                        signal_id,
                        ExecutionStatus::Failed,
                        Some("no active exit strategy"),
                    )
                    .await?;
                return Ok(None);
            }
        };

        let max_attempts = self.config.read().await.retry.max_attempts;
        let mut order = Order::entry(
            signal_id,
            scored.event.token_address.clone(),
            size.final_size_sol,
            quote.price,
            entry_slippage_bps(decision.conviction),
        );
        order.max_attempts = max_attempts;
        self.orders.create(&order).await?;

        info!(
            order_id = %order.id,
            signal_id = %signal_id,
            amount_sol = %order.amount_sol,
            expected_price = %quote.price,
            "entry order created"
        );

        let result = self.executor.execute(order).await?;
        self.settle_entry(result, scored, decision.conviction).await
    }

    /// Re-arm and re-execute a failed entry order under the retry worker's
    /// lease. Creates the position on late success with the conviction of
    /// the originating signal.
    pub async fn retry_failed_order(&self, mut order: Order) -> Result<OrderResult> {
        if order.status == OrderStatus::Failed {
            let from = order.status;
            order.transition(OrderStatus::Pending)?;
            self.orders.update(&order).await?;
            self.orders
                .append_status_log(order.id, from, order.status, Some("re-armed for retry"))
                .await?;
        }

        let result = self.executor.execute(order).await?;

        if result.success {
            if let Some(signal_id) = result.order.signal_id {
                let (conviction, wallet, cluster) = match self.signals.get_by_id(signal_id).await?
                {
                    Some(record) => (
                        record.conviction_tier.unwrap_or(ConvictionTier::Standard),
                        record.wallet_address,
                        None,
                    ),
                    None => (ConvictionTier::Standard, String::new(), None),
                };
                let strategy = self.position_service.active_strategy().await?;
                self.position_service
                    .create_from_fill(&result.order, &wallet, cluster, conviction, &strategy)
                    .await?;
                self.signals
                    .update_execution_status(signal_id, ExecutionStatus::Executed, None)
                    .await?;
            }
        }

        Ok(result)
    }

    async fn settle_entry(
        &self,
        result: OrderResult,
        scored: &ScoredSignal,
        conviction: ConvictionTier,
    ) -> Result<Option<Order>> {
        let signal_id = scored.signal_id;

        if result.success {
            let strategy = self.position_service.active_strategy().await?;
            let position = self
                .position_service
                .create_from_fill(
                    &result.order,
                    &scored.event.wallet_address,
                    scored.cluster_id.clone(),
                    conviction,
                    &strategy,
                )
                .await?;
            self.signals
                .update_execution_status(
                    signal_id,
                    ExecutionStatus::Executed,
                    Some(&position.id.to_string()),
                )
                .await?;
            return Ok(Some(result.order));
        }

        if result.can_retry {
            // The retry worker owns it from here; the signal stays as-is.
            info!(
                order_id = %result.order.id,
                next_retry = ?result.order.next_retry_at,
                "entry failed, queued for retry"
            );
            Ok(Some(result.order))
        } else {
            let detail = result
                .error
                .clone()
                .unwrap_or_else(|| "execution failed".to_string());
            self.signals
                .update_execution_status(signal_id, ExecutionStatus::Failed, Some(&detail))
                .await?;
            Ok(Some(result.order))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use risk_manager::concentration::ConcentrationChecker;
    use rust_decimal_macros::dec;
    use walltrack_core::config::TradingConfig;
    use walltrack_core::oracle::OracleConfig;
    use walltrack_core::ports::{
        MockPriceProvider, MockTradeClient, PriceSource, SwapReceipt,
    };
    use walltrack_core::stores::{
        MockOrderStore, MockPositionStore, MockSignalLog, MockStrategyStore,
    };
    use walltrack_core::types::{
        EligibilityStatus, ExitRule, ExitRuleType, ExitStrategy, ScoreBreakdown, StrategyStatus,
        SwapDirection, SwapEvent,
    };

    fn scored(score: f64) -> ScoredSignal {
        ScoredSignal {
            signal_id: uuid::Uuid::new_v4(),
            event: SwapEvent {
                tx_signature: "sig1".into(),
                wallet_address: "W1".into(),
                token_address: "TokenA".into(),
                direction: SwapDirection::Buy,
                amount_token: dec!(1000),
                amount_sol: dec!(1.2),
                slot: 1,
                block_time: Utc::now(),
            },
            breakdown: ScoreBreakdown::default(),
            final_score: score,
            cluster_id: None,
            scoring_latency_ms: 0.1,
        }
    }

    fn decision(conviction: ConvictionTier) -> GateDecision {
        GateDecision {
            eligibility: EligibilityStatus::Eligible,
            conviction,
            position_multiplier: dec!(1.0),
            threshold_used: 0.65,
            reason: None,
        }
    }

    fn active_strategy() -> ExitStrategy {
        let mut strategy = ExitStrategy::new(
            crate::position_service::DEFAULT_EXIT_STRATEGY,
            vec![ExitRule {
                rule_type: ExitRuleType::StopLoss,
                trigger_pct: dec!(-50),
                exit_pct: dec!(100),
                priority: 0,
                enabled: true,
                params: Default::default(),
            }],
        )
        .unwrap();
        strategy.status = StrategyStatus::Active;
        strategy
    }

    struct Harness {
        service: EntryOrderService,
    }

    async fn harness(swap_succeeds: bool, paused: bool) -> Harness {
        let config = TradingConfig::default().shared();

        let mut provider = MockPriceProvider::new();
        provider
            .expect_source()
            .return_const(PriceSource::PrimaryFeed);
        provider
            .expect_quote()
            .returning(|_| Ok(Some(dec!(0.001))));
        provider
            .expect_quote_batch()
            .returning(|_| Ok(Default::default()));
        let oracle = Arc::new(PriceOracle::new(
            vec![Arc::new(provider)],
            OracleConfig::default(),
        ));

        let mut client = MockTradeClient::new();
        client
            .expect_available_balance_sol()
            .returning(|| Ok(dec!(10)));
        client.expect_swap().returning(move |request| {
            if swap_succeeds {
                // Fill exactly at the expected 0.001.
                Ok(SwapReceipt::confirmed(
                    "tx123",
                    request.amount_sol / dec!(0.001),
                ))
            } else {
                Ok(SwapReceipt::failed("venue rejected"))
            }
        });
        let client: Arc<dyn TradeClient> = Arc::new(client);

        let mut orders = MockOrderStore::new();
        orders.expect_create().returning(|_| Ok(()));
        orders.expect_update().returning(|_| Ok(()));
        orders
            .expect_append_status_log()
            .returning(|_, _, _, _| Ok(()));
        let orders: Arc<dyn OrderStore> = Arc::new(orders);

        let mut signals = MockSignalLog::new();
        signals
            .expect_update_execution_status()
            .returning(|_, _, _| Ok(()));
        let signals: Arc<dyn SignalLog> = Arc::new(signals);

        let mut positions = MockPositionStore::new();
        positions.expect_total_allocation().returning(|| Ok(dec!(0)));
        positions.expect_count_open().returning(|| Ok(0));
        positions.expect_open_for_token().returning(|_| Ok(vec![]));
        positions
            .expect_token_allocation()
            .returning(|_| Ok(dec!(0)));
        positions
            .expect_count_open_in_cluster()
            .returning(|_| Ok(0));
        positions
            .expect_cluster_allocation()
            .returning(|_| Ok(dec!(0)));
        positions.expect_create().returning(|_| Ok(()));
        let positions: Arc<dyn PositionStore> = Arc::new(positions);

        let mut strategies = MockStrategyStore::new();
        strategies
            .expect_get_active_by_name()
            .returning(|_| Ok(Some(active_strategy())));
        let strategies: Arc<dyn walltrack_core::stores::StrategyStore> = Arc::new(strategies);

        let state = Arc::new(SystemStateManager::new());
        if paused {
            state
                .pause(risk_manager::system_state::PauseRequest {
                    operator: "test".into(),
                    reason: walltrack_core::types::PauseReason::Manual,
                    note: None,
                })
                .await
                .unwrap();
        }

        let sizer = Arc::new(PositionSizer::new(
            config.clone(),
            Arc::new(ConcentrationChecker::new(positions.clone(), config.clone())),
        ));
        let executor = Arc::new(OrderExecutor::new(
            client.clone(),
            orders.clone(),
            config.clone(),
        ));
        let position_service =
            Arc::new(PositionService::new(positions.clone(), strategies));

        Harness {
            service: EntryOrderService::new(
                state,
                oracle,
                sizer,
                executor,
                client,
                orders,
                signals,
                positions,
                position_service,
                config,
            ),
        }
    }

    #[tokio::test]
    async fn test_happy_path_creates_order_and_position() {
        let harness = harness(true, false).await;
        let order = harness
            .service
            .process_signal(&scored(0.75), &decision(ConvictionTier::Standard))
            .await
            .unwrap()
            .expect("order should exist");

        assert_eq!(order.status, OrderStatus::Filled);
        // 10 SOL balance, 50% allocation cap, 2% base -> 0.10 SOL.
        assert_eq!(order.amount_sol, dec!(0.10));
        assert_eq!(order.max_slippage_bps, 100);
    }

    #[tokio::test]
    async fn test_high_conviction_gets_wider_slippage() {
        let harness = harness(true, false).await;
        let order = harness
            .service
            .process_signal(&scored(0.90), &decision(ConvictionTier::High))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(order.max_slippage_bps, 150);
    }

    #[tokio::test]
    async fn test_paused_system_blocks_entry() {
        let harness = harness(true, true).await;
        let order = harness
            .service
            .process_signal(&scored(0.75), &decision(ConvictionTier::Standard))
            .await
            .unwrap();
        assert!(order.is_none());
    }

    #[tokio::test]
    async fn test_low_score_not_sized() {
        let harness = harness(true, false).await;
        let order = harness
            .service
            .process_signal(&scored(0.66), &decision(ConvictionTier::Standard))
            .await
            .unwrap();
        assert!(order.is_none());
    }

    #[tokio::test]
    async fn test_failed_swap_leaves_retryable_order() {
        let harness = harness(false, false).await;
        let order = harness
            .service
            .process_signal(&scored(0.75), &decision(ConvictionTier::Standard))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(order.status, OrderStatus::Failed);
        assert!(order.can_retry());
        assert!(order.next_retry_at.is_some());
    }
}
