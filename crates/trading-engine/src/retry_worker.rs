//! Retry worker: reprocesses failed and due orders under per-order leases.

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use rust_decimal::Decimal;
use walltrack_core::config::SharedConfig;
use walltrack_core::stores::{OrderStore, PositionStore, SignalLog, StrategyStore};
use walltrack_core::types::{
    ExecutionStatus, ExitExecution, ExitReason, Order, OrderKind, OrderStatus, PositionStatus,
};
use walltrack_core::Result;

use crate::entry_service::EntryOrderService;
use crate::executor::OrderExecutor;

const EXHAUSTED_REASON: &str = "Max retries exceeded";

/// Counters for the retry worker's observability surface.
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub retries_attempted: u64,
    pub retries_succeeded: u64,
    pub retries_failed: u64,
    pub orders_processed_last_run: usize,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl RetryMetrics {
    pub fn record_attempt(&mut self, success: bool) {
        self.retries_attempted += 1;
        if success {
            self.retries_succeeded += 1;
        } else {
            self.retries_failed += 1;
        }
    }

    pub fn record_run(&mut self, orders_processed: usize) {
        self.orders_processed_last_run = orders_processed;
        self.last_run_at = Some(Utc::now());
    }

    pub fn success_rate_pct(&self) -> f64 {
        if self.retries_attempted == 0 {
            return 0.0;
        }
        (self.retries_succeeded as f64 / self.retries_attempted as f64 * 1000.0).round() / 10.0
    }
}

/// Background loop that re-executes failed and due orders.
///
/// Exit orders always outrank entries in each batch. Every candidate is
/// processed under a lease acquired with a conditional update, and the lease
/// is released on every path out.
pub struct RetryWorker {
    orders: Arc<dyn OrderStore>,
    signals: Arc<dyn SignalLog>,
    positions: Arc<dyn PositionStore>,
    strategies: Arc<dyn StrategyStore>,
    executor: Arc<OrderExecutor>,
    entry_service: Arc<EntryOrderService>,
    config: SharedConfig,
    /// Lease owner identity for this worker instance.
    owner: String,
    metrics: Mutex<RetryMetrics>,
}

impl RetryWorker {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        signals: Arc<dyn SignalLog>,
        positions: Arc<dyn PositionStore>,
        strategies: Arc<dyn StrategyStore>,
        executor: Arc<OrderExecutor>,
        entry_service: Arc<EntryOrderService>,
        config: SharedConfig,
    ) -> Self {
        Self {
            orders,
            signals,
            positions,
            strategies,
            executor,
            entry_service,
            config,
            owner: format!("retry-worker-{}", Uuid::new_v4()),
            metrics: Mutex::new(RetryMetrics::default()),
        }
    }

    /// Run until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let poll_interval = {
            let config = self.config.read().await;
            std::time::Duration::from_secs(config.retry.poll_interval_secs)
        };
        info!(owner = %self.owner, interval_secs = poll_interval.as_secs(), "retry worker started");

        let mut ticker = tokio::time::interval(poll_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(owner = %self.owner, "retry worker stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.process_once().await {
                        error!(error = %e, "retry cycle failed");
                    }
                }
            }
        }
    }

    /// One retry cycle. Returns the number of orders processed.
    pub async fn process_once(&self) -> Result<usize> {
        let (batch_size, lease_ttl, max_concurrent) = {
            let config = self.config.read().await;
            (
                config.retry.batch_size as i64,
                config.retry.lease_ttl_secs,
                config.retry.max_concurrent.max(1),
            )
        };

        let candidates = self.orders.get_pending_retries(batch_size).await?;
        if candidates.is_empty() {
            self.metrics.lock().await.record_run(0);
            return Ok(0);
        }

        // The store already put exits first; bounded concurrency must not
        // reorder them behind entries, so the window stays small.
        let processed: usize = stream::iter(candidates)
            .map(|order| self.process_order(order, lease_ttl))
            .buffer_unordered(max_concurrent)
            .fold(0usize, |acc, processed| async move {
                acc + usize::from(processed)
            })
            .await;

        self.metrics.lock().await.record_run(processed);
        Ok(processed)
    }

    pub async fn metrics(&self) -> RetryMetrics {
        self.metrics.lock().await.clone()
    }

    /// Process one candidate under its lease. Returns whether the order was
    /// actually processed (lease acquired).
    async fn process_order(&self, order: Order, lease_ttl: i64) -> bool {
        let order_id = order.id;
        match self.orders.acquire_lease(order_id, &self.owner, lease_ttl).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "lease acquisition failed");
                return false;
            }
        }

        let outcome = self.handle_leased(order).await;

        // The lease is released no matter how processing went.
        if let Err(e) = self.orders.release_lease(order_id, &self.owner).await {
            error!(order_id = %order_id, error = %e, "lease release failed");
        }

        if let Err(e) = outcome {
            warn!(order_id = %order_id, error = %e, "retry processing failed");
        }
        true
    }

    async fn handle_leased(&self, order: Order) -> Result<()> {
        // Exhausted before we even try: terminal cancellation.
        if order.status == OrderStatus::Failed && !order.can_retry() {
            return self.cancel_exhausted(order).await;
        }

        let kind = order.kind;
        let result = match kind {
            OrderKind::Entry => self.entry_service.retry_failed_order(order).await?,
            OrderKind::Exit => {
                let mut order = order;
                if order.status == OrderStatus::Failed {
                    let from = order.status;
                    order.transition(OrderStatus::Pending)?;
                    self.orders.update(&order).await?;
                    self.orders
                        .append_status_log(order.id, from, order.status, Some("re-armed for retry"))
                        .await?;
                }
                self.executor.execute(order).await?
            }
        };

        self.metrics.lock().await.record_attempt(result.success);

        if result.success && kind == OrderKind::Exit {
            self.settle_exit_fill(&result.order, result.output_amount)
                .await?;
        }

        if !result.success && !result.can_retry {
            self.cancel_exhausted(result.order).await?;
        }

        Ok(())
    }

    /// Apply a late exit fill to its position.
    ///
    /// The original trigger context is gone by the time a retry lands, so
    /// the execution is recorded with a retry trigger level; token and PnL
    /// accounting stay exact.
    async fn settle_exit_fill(&self, order: &Order, sol_received: Option<Decimal>) -> Result<()> {
        let Some(position_id) = order.position_id else {
            return Ok(());
        };
        let Some(mut position) = self.positions.get_by_id(position_id).await? else {
            warn!(order_id = %order.id, position_id = %position_id, "filled exit has no position");
            return Ok(());
        };
        if position.status == PositionStatus::Closed {
            return Ok(());
        }

        let tokens_sold = order
            .amount_tokens
            .unwrap_or(Decimal::ZERO)
            .min(position.current_amount_tokens);
        if tokens_sold <= Decimal::ZERO {
            return Ok(());
        }
        let sol_received = sol_received.unwrap_or(Decimal::ZERO);
        let exit_price = order.actual_price.unwrap_or(order.expected_price);
        let is_full_exit = tokens_sold >= position.current_amount_tokens;

        let execution = ExitExecution {
            id: Uuid::new_v4(),
            position_id,
            exit_reason: ExitReason::Manual,
            trigger_level: "retry".to_string(),
            sell_percentage: Decimal::ZERO,
            amount_tokens_sold: tokens_sold,
            amount_sol_received: sol_received,
            exit_price,
            tx_signature: order.tx_signature.clone().unwrap_or_default(),
            realized_pnl_sol: sol_received - tokens_sold * position.entry_price,
            executed_at: Utc::now(),
        };

        let moonbag_configured = match self
            .strategies
            .get_by_id(position.exit_strategy_id)
            .await?
        {
            Some(strategy) => strategy.moonbag.has_moonbag(),
            None => false,
        };

        position.apply_exit(&execution, is_full_exit, moonbag_configured, exit_price);
        self.positions.save_exit_execution(&execution).await?;
        self.positions.update(&position).await?;

        info!(
            position_id = %position_id,
            tokens = %tokens_sold,
            pnl = %execution.realized_pnl_sol,
            "late exit fill settled"
        );
        Ok(())
    }

    /// Terminal path: attempts exhausted, the order is cancelled and the
    /// originating signal (for entries) is failed.
    async fn cancel_exhausted(&self, mut order: Order) -> Result<()> {
        let from = order.status;
        order.last_error = Some(EXHAUSTED_REASON.to_string());
        order.transition(OrderStatus::Cancelled)?;
        self.orders.update(&order).await?;
        self.orders
            .append_status_log(order.id, from, order.status, Some(EXHAUSTED_REASON))
            .await?;

        warn!(
            order_id = %order.id,
            kind = order.kind.as_str(),
            attempts = order.attempt_count,
            "order cancelled after exhausting retries"
        );

        if order.kind == OrderKind::Entry {
            if let Some(signal_id) = order.signal_id {
                self.signals
                    .update_execution_status(
                        signal_id,
                        ExecutionStatus::Failed,
                        Some(EXHAUSTED_REASON),
                    )
                    .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk_manager::concentration::ConcentrationChecker;
    use risk_manager::sizing::PositionSizer;
    use risk_manager::system_state::SystemStateManager;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use walltrack_core::config::TradingConfig;
    use walltrack_core::oracle::{OracleConfig, PriceOracle};
    use walltrack_core::ports::{MockTradeClient, SwapReceipt, TradeClient};
    use walltrack_core::stores::{
        MockOrderStore, MockPositionStore, MockSignalLog, MockStrategyStore, PositionStore,
    };
    use walltrack_core::types::RETRY_DELAYS_SECS;

    use crate::position_service::PositionService;

    fn failed_entry(attempts: u32) -> Order {
        let mut order = Order::entry(
            Uuid::new_v4(),
            "TokenA",
            dec!(0.5),
            dec!(0.001),
            100,
        );
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Failed).unwrap();
        for _ in 0..attempts {
            order.record_failure("network error", &RETRY_DELAYS_SECS);
        }
        order.next_retry_at = Some(Utc::now() - chrono::Duration::seconds(10));
        order
    }

    fn failed_exit() -> Order {
        let mut order = Order::exit(
            Uuid::new_v4(),
            "TokenA",
            dec!(0.5),
            dec!(500),
            dec!(0.001),
            200,
        );
        order.transition(OrderStatus::Submitted).unwrap();
        order.transition(OrderStatus::Failed).unwrap();
        order.record_failure("network error", &RETRY_DELAYS_SECS);
        order.next_retry_at = Some(Utc::now() - chrono::Duration::seconds(10));
        order
    }

    struct WorkerHarness {
        worker: Arc<RetryWorker>,
        executed: Arc<AtomicUsize>,
    }

    fn worker_with(
        candidates: Vec<Order>,
        lease_granted: bool,
        swap_succeeds: bool,
        expect_cancel: bool,
    ) -> WorkerHarness {
        let config = TradingConfig::default().shared();

        let mut orders = MockOrderStore::new();
        orders
            .expect_get_pending_retries()
            .returning(move |_| Ok(candidates.clone()));
        orders
            .expect_acquire_lease()
            .returning(move |_, _, _| Ok(lease_granted));
        orders.expect_release_lease().returning(|_, _| Ok(()));
        orders.expect_create().returning(|_| Ok(()));
        if expect_cancel {
            orders
                .expect_update()
                .withf(|order| order.status == OrderStatus::Cancelled)
                .times(1)
                .returning(|_| Ok(()));
        }
        orders.expect_update().returning(|_| Ok(()));
        orders
            .expect_append_status_log()
            .returning(|_, _, _, _| Ok(()));
        let orders: Arc<dyn OrderStore> = Arc::new(orders);

        let executed = Arc::new(AtomicUsize::new(0));
        let executed_in_client = executed.clone();
        let mut client = MockTradeClient::new();
        client.expect_swap().returning(move |request| {
            executed_in_client.fetch_add(1, Ordering::SeqCst);
            if swap_succeeds {
                let output = match request.side {
                    walltrack_core::types::OrderSide::Buy => {
                        request.amount_sol / dec!(0.001)
                    }
                    walltrack_core::types::OrderSide::Sell => {
                        request.amount_tokens.unwrap_or(dec!(0)) * dec!(0.001)
                    }
                };
                Ok(SwapReceipt::confirmed("tx-retry", output))
            } else {
                Ok(SwapReceipt::failed("still failing"))
            }
        });
        client
            .expect_available_balance_sol()
            .returning(|| Ok(dec!(10)));
        let client: Arc<dyn TradeClient> = Arc::new(client);

        let mut signals = MockSignalLog::new();
        signals
            .expect_update_execution_status()
            .returning(|_, _, _| Ok(()));
        signals.expect_get_by_id().returning(|_| Ok(None));
        let signals: Arc<dyn SignalLog> = Arc::new(signals);

        let mut positions = MockPositionStore::new();
        positions.expect_create().returning(|_| Ok(()));
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
        positions.expect_get_by_id().returning(|_| Ok(None));
        let positions: Arc<dyn PositionStore> = Arc::new(positions);

        let mut strategies = MockStrategyStore::new();
        strategies.expect_get_active_by_name().returning(|_| {
            let mut strategy = walltrack_core::types::ExitStrategy::new(
                crate::position_service::DEFAULT_EXIT_STRATEGY,
                vec![],
            )
            .unwrap();
            strategy.status = walltrack_core::types::StrategyStatus::Active;
            Ok(Some(strategy))
        });
        strategies.expect_get_by_id().returning(|_| Ok(None));
        let strategies: Arc<dyn StrategyStore> = Arc::new(strategies);

        let executor = Arc::new(OrderExecutor::new(
            client.clone(),
            orders.clone(),
            config.clone(),
        ));
        let sizer = Arc::new(PositionSizer::new(
            config.clone(),
            Arc::new(ConcentrationChecker::new(positions.clone(), config.clone())),
        ));
        let oracle = Arc::new(PriceOracle::new(vec![], OracleConfig::default()));
        let entry_service = Arc::new(EntryOrderService::new(
            Arc::new(SystemStateManager::new()),
            oracle,
            sizer,
            executor.clone(),
            client,
            orders.clone(),
            signals.clone(),
            positions.clone(),
            Arc::new(PositionService::new(positions.clone(), strategies.clone())),
            config.clone(),
        ));

        WorkerHarness {
            worker: Arc::new(RetryWorker::new(
                orders,
                signals,
                positions,
                strategies,
                executor,
                entry_service,
                config,
            )),
            executed,
        }
    }

    #[test]
    fn test_metrics_success_rate() {
        let mut metrics = RetryMetrics::default();
        assert_eq!(metrics.success_rate_pct(), 0.0);

        metrics.record_attempt(true);
        metrics.record_attempt(true);
        metrics.record_attempt(false);

        assert_eq!(metrics.retries_attempted, 3);
        assert_eq!(metrics.success_rate_pct(), 66.7);
    }

    #[tokio::test]
    async fn test_no_candidates_processes_nothing() {
        let harness = worker_with(vec![], true, true, false);
        let processed = harness.worker.process_once().await.unwrap();
        assert_eq!(processed, 0);
        assert_eq!(harness.executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_retry_recorded() {
        let harness = worker_with(vec![failed_entry(1)], true, true, false);
        let processed = harness.worker.process_once().await.unwrap();

        assert_eq!(processed, 1);
        assert_eq!(harness.executed.load(Ordering::SeqCst), 1);
        let metrics = harness.worker.metrics().await;
        assert_eq!(metrics.retries_succeeded, 1);
        assert_eq!(metrics.orders_processed_last_run, 1);
    }

    #[tokio::test]
    async fn test_locked_orders_skipped() {
        let harness = worker_with(vec![failed_entry(1)], false, true, false);
        let processed = harness.worker.process_once().await.unwrap();

        assert_eq!(processed, 0);
        assert_eq!(harness.executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_retry_tracked() {
        let harness = worker_with(vec![failed_entry(1)], true, false, false);
        harness.worker.process_once().await.unwrap();

        let metrics = harness.worker.metrics().await;
        assert_eq!(metrics.retries_failed, 1);
        assert_eq!(metrics.retries_succeeded, 0);
    }

    #[tokio::test]
    async fn test_exhausted_order_cancelled_without_execution() {
        let harness = worker_with(vec![failed_entry(3)], true, true, true);
        let processed = harness.worker.process_once().await.unwrap();

        assert_eq!(processed, 1);
        // Never reaches the venue.
        assert_eq!(harness.executed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exit_orders_retried() {
        let harness = worker_with(vec![failed_exit()], true, true, false);
        let processed = harness.worker.process_once().await.unwrap();

        assert_eq!(processed, 1);
        assert_eq!(harness.executed.load(Ordering::SeqCst), 1);
        let metrics = harness.worker.metrics().await;
        assert_eq!(metrics.retries_succeeded, 1);
    }
}
