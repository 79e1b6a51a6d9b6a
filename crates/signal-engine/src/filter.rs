//! Signal filter: decides whether a raw swap event is worth processing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use rust_decimal::Decimal;
use walltrack_core::config::SharedConfig;
use walltrack_core::stores::{SignalLog, WalletStore};
use walltrack_core::types::{FilterStatus, SwapEvent, WalletStatus};
use walltrack_core::Result;

/// Wrapped SOL mint; a swap whose token is SOL itself is a wallet shuffling
/// funds between its own accounts, not a copyable trade.
pub const NATIVE_SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Outcome of filtering one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    pub status: FilterStatus,
    pub reason: Option<String>,
}

impl FilterResult {
    fn passed() -> Self {
        Self {
            status: FilterStatus::Passed,
            reason: None,
        }
    }

    fn rejected(status: FilterStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == FilterStatus::Passed
    }
}

struct WalletSetCache {
    statuses: HashMap<String, WalletStatus>,
    refreshed_at: Option<Instant>,
}

/// Fail-fast filter over raw swap events.
///
/// The monitored and blacklisted sets are cached from the wallet store and
/// refreshed on a TTL; the profiling worker keeps the underlying store fresh.
pub struct SignalFilter {
    wallets: Arc<dyn WalletStore>,
    signals: Arc<dyn SignalLog>,
    config: SharedConfig,
    cache: RwLock<WalletSetCache>,
}

impl SignalFilter {
    pub fn new(
        wallets: Arc<dyn WalletStore>,
        signals: Arc<dyn SignalLog>,
        config: SharedConfig,
    ) -> Self {
        Self {
            wallets,
            signals,
            config,
            cache: RwLock::new(WalletSetCache {
                statuses: HashMap::new(),
                refreshed_at: None,
            }),
        }
    }

    /// Run the checks in order, returning on the first failure.
    pub async fn filter(&self, event: &SwapEvent) -> Result<FilterResult> {
        let (dust_threshold, cache_ttl) = {
            let config = self.config.read().await;
            (
                config.filter.dust_threshold_sol,
                Duration::from_secs(config.filter.monitored_cache_ttl_secs),
            )
        };

        self.refresh_wallet_sets(cache_ttl).await?;

        let status = {
            let cache = self.cache.read().await;
            cache.statuses.get(&event.wallet_address).copied()
        };

        match status {
            Some(WalletStatus::Blacklisted) => {
                debug!(wallet = %short(&event.wallet_address), "signal from blacklisted wallet");
                return Ok(FilterResult::rejected(
                    FilterStatus::Blacklisted,
                    "wallet is blacklisted",
                ));
            }
            Some(WalletStatus::Active) => {}
            _ => {
                return Ok(FilterResult::rejected(
                    FilterStatus::NotMonitored,
                    "wallet is not in the monitored set",
                ));
            }
        }

        if event.amount_sol < dust_threshold {
            return Ok(FilterResult::rejected(
                FilterStatus::Dust,
                format!(
                    "amount {} below dust threshold {}",
                    event.amount_sol, dust_threshold
                ),
            ));
        }

        if self.signals.exists_tx(&event.tx_signature).await? {
            return Ok(FilterResult::rejected(
                FilterStatus::DuplicateTx,
                "transaction already recorded",
            ));
        }

        if event.token_address == NATIVE_SOL_MINT {
            return Ok(FilterResult::rejected(
                FilterStatus::SelfTrade,
                "swap target is native SOL",
            ));
        }
        if event.amount_token <= Decimal::ZERO {
            return Ok(FilterResult::rejected(
                FilterStatus::SelfTrade,
                "no token amount moved",
            ));
        }

        Ok(FilterResult::passed())
    }

    async fn refresh_wallet_sets(&self, ttl: Duration) -> Result<()> {
        {
            let cache = self.cache.read().await;
            if let Some(at) = cache.refreshed_at {
                if at.elapsed() < ttl {
                    return Ok(());
                }
            }
        }

        let mut statuses = HashMap::new();
        for wallet in self
            .wallets
            .list_by_status(WalletStatus::Active, 10_000)
            .await?
        {
            statuses.insert(wallet.address, WalletStatus::Active);
        }
        for wallet in self
            .wallets
            .list_by_status(WalletStatus::Blacklisted, 10_000)
            .await?
        {
            statuses.insert(wallet.address, WalletStatus::Blacklisted);
        }

        let mut cache = self.cache.write().await;
        debug!(wallets = statuses.len(), "refreshed monitored wallet cache");
        cache.statuses = statuses;
        cache.refreshed_at = Some(Instant::now());
        Ok(())
    }
}

fn short(address: &str) -> &str {
    &address[..address.len().min(8)]
}
