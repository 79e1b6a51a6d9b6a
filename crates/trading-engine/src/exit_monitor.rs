//! Exit monitor: drives the exit manager with price ticks for every open
//! position.

use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use walltrack_core::oracle::PriceOracle;
use walltrack_core::stores::PositionStore;

use crate::exit_manager::ExitManager;

/// Configuration for the exit monitor loop (env-var driven).
#[derive(Debug, Clone)]
pub struct ExitMonitorConfig {
    pub enabled: bool,
    /// How often to tick open positions (seconds).
    pub poll_interval_secs: u64,
}

impl Default for ExitMonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 10,
        }
    }
}

impl ExitMonitorConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("EXIT_MONITOR_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            poll_interval_secs: std::env::var("EXIT_MONITOR_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        }
    }
}

/// Polls open positions, batch-fetches their prices, and feeds each position
/// through the exit manager. One position's failure never stops the sweep.
pub struct ExitMonitor {
    config: ExitMonitorConfig,
    positions: Arc<dyn PositionStore>,
    oracle: Arc<PriceOracle>,
    exit_manager: Arc<ExitManager>,
}

impl ExitMonitor {
    pub fn new(
        config: ExitMonitorConfig,
        positions: Arc<dyn PositionStore>,
        oracle: Arc<PriceOracle>,
        exit_manager: Arc<ExitManager>,
    ) -> Self {
        Self {
            config,
            positions,
            oracle,
            exit_manager,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        if !self.config.enabled {
            info!("exit monitor is disabled");
            return;
        }

        info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "exit monitor started"
        );

        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(
            self.config.poll_interval_secs,
        ));
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("exit monitor stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "exit sweep failed");
                    }
                }
            }
        }
    }

    /// One sweep over all open positions.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let positions = self.positions.list_open().await?;
        if positions.is_empty() {
            return Ok(0);
        }

        let tokens: Vec<String> = positions
            .iter()
            .map(|p| p.token_address.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let prices = self.oracle.prices_of(&tokens).await;

        let mut processed = 0;
        for position in &positions {
            let Some(quote) = prices.get(&position.token_address) else {
                // No price this tick; the caller decides nothing, we retry
                // on the next sweep.
                debug!(
                    position_id = %position.id,
                    token = %position.token_address,
                    "no price for position this tick"
                );
                continue;
            };

            match self
                .exit_manager
                .process_position(position.id, quote.price)
                .await
            {
                Ok(Some(execution)) => {
                    processed += 1;
                    debug!(
                        position_id = %position.id,
                        reason = execution.exit_reason.as_str(),
                        "exit processed in sweep"
                    );
                }
                Ok(None) => processed += 1,
                Err(e) => {
                    warn!(position_id = %position.id, error = %e, "position tick failed");
                }
            }
        }

        Ok(processed)
    }
}
