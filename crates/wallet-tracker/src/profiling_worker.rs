//! Wallet profiling worker: turns discovered wallets into profiled (and
//! possibly monitored) ones.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use walltrack_core::config::SharedConfig;
use walltrack_core::ports::SwapHistory;
use walltrack_core::stores::WalletStore;
use walltrack_core::types::{WalletProfile, WalletStatus};
use walltrack_core::Result;

use crate::profiler::{BehavioralProfile, PerformanceMetrics};
use crate::trade_matcher::match_trades;

/// How many consecutive cycle errors stop the worker temporarily.
const MAX_CONSECUTIVE_CYCLE_ERRORS: u32 = 5;

/// Backoff ceiling once the worker has circuit-broken itself.
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Observable state of the worker. For dashboards, never for logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Processing,
    Stopped,
    Error,
}

/// Status snapshot exposed by [`WalletProfilingWorker::status`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkerStatus {
    pub current_state: WorkerState,
    pub processed_last_run: usize,
    pub succeeded_last_run: usize,
    pub failed_last_run: usize,
    pub last_run: Option<DateTime<Utc>>,
}

impl Default for WorkerStatus {
    fn default() -> Self {
        Self {
            current_state: WorkerState::Idle,
            processed_last_run: 0,
            succeeded_last_run: 0,
            failed_last_run: 0,
            last_run: None,
        }
    }
}

/// Poll-based worker that profiles `Discovered` wallets.
///
/// One wallet's failure never fails the batch; inter-wallet pacing applies
/// even after errors. The worker circuit-breaks itself after repeated cycle
/// errors with capped exponential backoff.
pub struct WalletProfilingWorker {
    wallets: Arc<dyn WalletStore>,
    history: Arc<dyn SwapHistory>,
    config: SharedConfig,
    status: RwLock<WorkerStatus>,
}

impl WalletProfilingWorker {
    pub fn new(
        wallets: Arc<dyn WalletStore>,
        history: Arc<dyn SwapHistory>,
        config: SharedConfig,
    ) -> Self {
        Self {
            wallets,
            history,
            config,
            status: RwLock::new(WorkerStatus::default()),
        }
    }

    pub async fn status(&self) -> WorkerStatus {
        self.status.read().await.clone()
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let poll_interval = {
            let config = self.config.read().await;
            Duration::from_secs(config.profiling.poll_interval_secs)
        };
        info!(
            interval_secs = poll_interval.as_secs(),
            "wallet profiling worker started"
        );

        let mut consecutive_errors: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.process_batch(&cancel).await {
                Ok(_) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    error!(
                        error = %e,
                        consecutive = consecutive_errors,
                        "profiling cycle failed"
                    );
                    self.status.write().await.current_state = WorkerState::Error;
                }
            }

            // Self circuit-break: repeated cycle failures back off
            // exponentially instead of hot-looping on a broken dependency.
            let delay = if consecutive_errors >= MAX_CONSECUTIVE_CYCLE_ERRORS {
                let shift = (consecutive_errors - MAX_CONSECUTIVE_CYCLE_ERRORS).min(8);
                (poll_interval * 2u32.saturating_pow(shift)).min(MAX_BACKOFF)
            } else {
                poll_interval
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.status.write().await.current_state = WorkerState::Stopped;
        info!("wallet profiling worker stopped");
    }

    /// Profile one batch of discovered wallets.
    pub async fn process_batch(&self, cancel: &CancellationToken) -> Result<usize> {
        let profiling = self.config.read().await.profiling.clone();

        let batch = self
            .wallets
            .list_by_status(WalletStatus::Discovered, profiling.batch_size as i64)
            .await?;
        if batch.is_empty() {
            let mut status = self.status.write().await;
            status.current_state = WorkerState::Idle;
            status.last_run = Some(Utc::now());
            return Ok(0);
        }

        self.status.write().await.current_state = WorkerState::Processing;
        let mut succeeded = 0;
        let mut failed = 0;

        for wallet in &batch {
            if cancel.is_cancelled() {
                break;
            }

            match self.process_wallet(wallet).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    failed += 1;
                    warn!(wallet = %short(&wallet.address), error = %e, "wallet profiling failed");
                }
            }

            // Pace between wallets, error or not, to stay under provider
            // rate limits.
            tokio::time::sleep(Duration::from_secs(profiling.wallet_delay_seconds)).await;
        }

        let mut status = self.status.write().await;
        status.current_state = WorkerState::Idle;
        status.processed_last_run = succeeded + failed;
        status.succeeded_last_run = succeeded;
        status.failed_last_run = failed;
        status.last_run = Some(Utc::now());

        info!(succeeded, failed, "profiling batch complete");
        Ok(succeeded + failed)
    }

    async fn process_wallet(&self, wallet: &WalletProfile) -> Result<()> {
        let profiling = self.config.read().await.profiling.clone();

        let swaps = self
            .history
            .recent_swaps(&wallet.address, profiling.history_limit)
            .await?;
        let trades = match_trades(&swaps);

        let metrics = PerformanceMetrics::from_trades(&trades);
        let behavior = BehavioralProfile::from_history(&swaps, &trades);

        let mut updated = wallet.clone();
        updated.status = WalletStatus::Profiled;
        updated.win_rate = Some(metrics.win_rate);
        updated.total_pnl_sol = metrics.total_pnl_sol;
        updated.total_trades = metrics.total_trades;
        updated.avg_pnl_per_trade_sol = metrics.avg_pnl_per_trade_sol;
        updated.last_activity_at = trades.last().map(|t| t.exit_time);
        if let Some(behavior) = behavior {
            updated.position_size_style = Some(behavior.position_size_style);
            updated.hold_duration_style = Some(behavior.hold_duration_style);
            updated.behavioral_confidence = Some(behavior.confidence);
        }
        updated.updated_at = Utc::now();
        self.wallets.upsert(&updated).await?;

        // Watchlist decision: monitored or ignored.
        let final_status = if metrics.meets_watchlist(&profiling.watchlist) {
            WalletStatus::Active
        } else {
            WalletStatus::Ignored
        };
        self.wallets
            .update_status(&wallet.address, final_status)
            .await?;

        info!(
            wallet = %short(&wallet.address),
            status = final_status.as_str(),
            trades = metrics.total_trades,
            win_rate = format!("{:.2}", metrics.win_rate),
            "wallet profiled"
        );
        Ok(())
    }
}

fn short(address: &str) -> &str {
    &address[..address.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use walltrack_core::config::TradingConfig;
    use walltrack_core::ports::MockSwapHistory;
    use walltrack_core::stores::MockWalletStore;
    use walltrack_core::types::{SwapDirection, SwapEvent};

    fn history_events(profitable_pairs: usize) -> Vec<SwapEvent> {
        let mut events = Vec::new();
        for i in 0..profitable_pairs {
            let base = Utc::now() - ChronoDuration::days(2);
            events.push(SwapEvent {
                tx_signature: format!("buy-{i}"),
                wallet_address: "W1".into(),
                token_address: format!("T{i}"),
                direction: SwapDirection::Buy,
                amount_token: dec!(1000),
                amount_sol: dec!(1),
                slot: i as i64,
                block_time: base,
            });
            events.push(SwapEvent {
                tx_signature: format!("sell-{i}"),
                wallet_address: "W1".into(),
                token_address: format!("T{i}"),
                direction: SwapDirection::Sell,
                amount_token: dec!(1000),
                amount_sol: dec!(1.5),
                slot: i as i64 + 1,
                block_time: base + ChronoDuration::hours(2),
            });
        }
        events
    }

    fn fast_config() -> SharedConfig {
        let mut config = TradingConfig::default();
        config.profiling.wallet_delay_seconds = 0;
        config.shared()
    }

    #[tokio::test]
    async fn test_profitable_wallet_promoted_to_active() {
        let mut wallets = MockWalletStore::new();
        wallets
            .expect_list_by_status()
            .returning(|_, _| Ok(vec![WalletProfile::discovered("W1")]));
        wallets
            .expect_upsert()
            .withf(|w| w.status == WalletStatus::Profiled && w.total_trades == 12)
            .times(1)
            .returning(|_| Ok(()));
        wallets
            .expect_update_status()
            .withf(|_, status| *status == WalletStatus::Active)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut history = MockSwapHistory::new();
        history
            .expect_recent_swaps()
            .returning(|_, _| Ok(history_events(12)));

        let worker = WalletProfilingWorker::new(
            Arc::new(wallets),
            Arc::new(history),
            fast_config(),
        );

        let processed = worker
            .process_batch(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(processed, 1);

        let status = worker.status().await;
        assert_eq!(status.succeeded_last_run, 1);
        assert_eq!(status.failed_last_run, 0);
        assert!(status.last_run.is_some());
    }

    #[tokio::test]
    async fn test_thin_history_wallet_ignored() {
        let mut wallets = MockWalletStore::new();
        wallets
            .expect_list_by_status()
            .returning(|_, _| Ok(vec![WalletProfile::discovered("W1")]));
        wallets
            .expect_upsert()
            .withf(|w| w.status == WalletStatus::Profiled)
            .times(1)
            .returning(|_| Ok(()));
        wallets
            .expect_update_status()
            .withf(|_, status| *status == WalletStatus::Ignored)
            .times(1)
            .returning(|_, _| Ok(()));

        let mut history = MockSwapHistory::new();
        history
            .expect_recent_swaps()
            .returning(|_, _| Ok(history_events(2)));

        let worker = WalletProfilingWorker::new(
            Arc::new(wallets),
            Arc::new(history),
            fast_config(),
        );

        worker.process_batch(&CancellationToken::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_one_failure_does_not_fail_batch() {
        let mut wallets = MockWalletStore::new();
        wallets.expect_list_by_status().returning(|_, _| {
            Ok(vec![
                WalletProfile::discovered("W-bad"),
                WalletProfile::discovered("W-good"),
            ])
        });
        wallets.expect_upsert().times(1).returning(|_| Ok(()));
        wallets
            .expect_update_status()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut history = MockSwapHistory::new();
        history.expect_recent_swaps().returning(|wallet, _| {
            if wallet == "W-bad" {
                Err(walltrack_core::Error::PriceUnavailable("rpc down".into()))
            } else {
                Ok(history_events(12))
            }
        });

        let worker = WalletProfilingWorker::new(
            Arc::new(wallets),
            Arc::new(history),
            fast_config(),
        );

        let processed = worker
            .process_batch(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(processed, 2);

        let status = worker.status().await;
        assert_eq!(status.succeeded_last_run, 1);
        assert_eq!(status.failed_last_run, 1);
    }

    #[tokio::test]
    async fn test_empty_batch_goes_idle() {
        let mut wallets = MockWalletStore::new();
        wallets
            .expect_list_by_status()
            .returning(|_, _| Ok(vec![]));

        let history = MockSwapHistory::new();
        let worker = WalletProfilingWorker::new(
            Arc::new(wallets),
            Arc::new(history),
            fast_config(),
        );

        let processed = worker
            .process_batch(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(processed, 0);
        assert_eq!(worker.status().await.current_state, WorkerState::Idle);
    }
}
