//! Wallet and token enrichment with safe defaults on miss.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use walltrack_core::ports::TokenFetcher;
use walltrack_core::stores::WalletStore;
use walltrack_core::types::{TokenCharacteristics, WalletProfile};

/// Default wallet cache TTL.
const WALLET_CACHE_TTL: Duration = Duration::from_secs(300);

struct CachedWallet {
    profile: WalletProfile,
    cached_at: Instant,
}

/// Wallet lookup with a process-local TTL cache.
///
/// Unknown wallets get a conservative synthesized profile so scoring cannot
/// overrate an address we have no history for.
pub struct WalletEnricher {
    store: Arc<dyn WalletStore>,
    cache: DashMap<String, CachedWallet>,
    ttl: Duration,
}

impl WalletEnricher {
    pub fn new(store: Arc<dyn WalletStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            ttl: WALLET_CACHE_TTL,
        }
    }

    #[cfg(test)]
    fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub async fn enrich(&self, address: &str) -> WalletProfile {
        if let Some(entry) = self.cache.get(address) {
            if entry.cached_at.elapsed() < self.ttl {
                return entry.profile.clone();
            }
        }

        let profile = match self.store.get_by_address(address).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                debug!(wallet = %short(address), "wallet not found, using defaults");
                WalletProfile::default_for(address)
            }
            Err(e) => {
                warn!(wallet = %short(address), error = %e, "wallet lookup failed, using defaults");
                WalletProfile::default_for(address)
            }
        };

        self.cache.insert(
            address.to_string(),
            CachedWallet {
                profile: profile.clone(),
                cached_at: Instant::now(),
            },
        );

        // Keep the cache from growing without bound.
        if self.cache.len() > 1000 {
            self.cache
                .retain(|_, entry| entry.cached_at.elapsed() < self.ttl);
        }

        profile
    }

    pub fn invalidate(&self, address: &str) {
        self.cache.remove(address);
    }
}

/// Token lookup delegating to the injected fetcher.
///
/// Any failure yields the worst-case default (honeypot, new token) so the
/// gate blocks rather than trades blind.
pub struct TokenEnricher {
    fetcher: Arc<dyn TokenFetcher>,
}

impl TokenEnricher {
    pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn enrich(&self, token: &str) -> TokenCharacteristics {
        match self.fetcher.fetch(token).await {
            Ok(Some(characteristics)) => characteristics,
            Ok(None) => TokenCharacteristics::fallback(token),
            Err(e) => {
                warn!(token = %short(token), error = %e, "token fetch failed, assuming worst case");
                TokenCharacteristics::fallback(token)
            }
        }
    }
}

fn short(address: &str) -> &str {
    &address[..address.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use walltrack_core::ports::MockTokenFetcher;
    use walltrack_core::stores::MockWalletStore;
    use walltrack_core::types::WalletStatus;
    use walltrack_core::Error;

    #[tokio::test]
    async fn test_unknown_wallet_gets_default_profile() {
        let mut store = MockWalletStore::new();
        store.expect_get_by_address().returning(|_| Ok(None));

        let enricher = WalletEnricher::new(Arc::new(store));
        let profile = enricher.enrich("W1").await;

        assert_eq!(profile.score, WalletProfile::DEFAULT_SCORE);
        assert_eq!(profile.status, WalletStatus::Active);
    }

    #[tokio::test]
    async fn test_wallet_cached_within_ttl() {
        let mut store = MockWalletStore::new();
        store
            .expect_get_by_address()
            .times(1)
            .returning(|_| Ok(Some(WalletProfile::default_for("W1"))));

        let enricher = WalletEnricher::new(Arc::new(store));
        enricher.enrich("W1").await;
        // Second lookup must hit the cache; the mock allows one call.
        enricher.enrich("W1").await;
    }

    #[tokio::test]
    async fn test_cache_expires() {
        let mut store = MockWalletStore::new();
        store
            .expect_get_by_address()
            .times(2)
            .returning(|_| Ok(Some(WalletProfile::default_for("W1"))));

        let enricher =
            WalletEnricher::new(Arc::new(store)).with_ttl(Duration::from_millis(0));
        enricher.enrich("W1").await;
        enricher.enrich("W1").await;
    }

    #[tokio::test]
    async fn test_store_error_falls_back_to_default() {
        let mut store = MockWalletStore::new();
        store
            .expect_get_by_address()
            .returning(|_| Err(Error::Validation("boom".into())));

        let enricher = WalletEnricher::new(Arc::new(store));
        let profile = enricher.enrich("W1").await;
        assert_eq!(profile.score, WalletProfile::DEFAULT_SCORE);
    }

    #[tokio::test]
    async fn test_token_fetch_failure_assumes_honeypot() {
        let mut fetcher = MockTokenFetcher::new();
        fetcher
            .expect_fetch()
            .returning(|_| Err(Error::PriceUnavailable("down".into())));

        let enricher = TokenEnricher::new(Arc::new(fetcher));
        let token = enricher.enrich("TokenA").await;
        assert!(token.is_honeypot);
        assert!(token.is_new_token);
    }
}
