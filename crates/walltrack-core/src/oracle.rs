//! Multi-source price oracle with fallback, caching, and failure cooldowns.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::ports::{PriceProvider, PriceSource};
use crate::{Error, Result};

/// Prices outside these bounds are treated as provider failures.
pub fn min_valid_price() -> Decimal {
    Decimal::new(1, 12)
}

pub fn max_valid_price() -> Decimal {
    Decimal::new(1_000_000_000_000, 0)
}

/// Oracle tuning knobs.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub cache_ttl: Duration,
    pub failure_cooldown: Duration,
    /// Per-provider call timeout; a timeout counts as a provider failure.
    pub call_timeout: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5),
            failure_cooldown: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// A successfully fetched price.
#[derive(Debug, Clone)]
pub struct PriceQuote {
    pub price: Decimal,
    pub source: PriceSource,
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    pub fn age_seconds(&self) -> f64 {
        (Utc::now() - self.observed_at).num_milliseconds() as f64 / 1000.0
    }
}

struct CachedPrice {
    quote: PriceQuote,
    cached_at: Instant,
}

/// Fetches prices from providers in priority order with automatic fallback.
///
/// Results are cached per token with a short TTL; a provider that errors is
/// skipped for the cooldown window instead of being hammered.
pub struct PriceOracle {
    providers: Vec<Arc<dyn PriceProvider>>,
    config: OracleConfig,
    cache: DashMap<String, CachedPrice>,
    cooldowns: DashMap<PriceSource, Instant>,
}

impl PriceOracle {
    /// Providers must be supplied in fallback priority order.
    pub fn new(providers: Vec<Arc<dyn PriceProvider>>, config: OracleConfig) -> Self {
        Self {
            providers,
            config,
            cache: DashMap::new(),
            cooldowns: DashMap::new(),
        }
    }

    /// Quote a single token, trying each source in order.
    pub async fn price_of(&self, token: &str) -> Result<PriceQuote> {
        if let Some(quote) = self.cached(token) {
            debug!(token = %short(token), source = ?quote.source, "price from cache");
            return Ok(quote);
        }

        let mut errors: Vec<String> = Vec::new();
        for provider in &self.providers {
            let source = provider.source();
            if self.in_cooldown(source) {
                debug!(token = %short(token), source = source.as_str(), "source in cooldown");
                continue;
            }

            match tokio::time::timeout(self.config.call_timeout, provider.quote(token)).await {
                Ok(Ok(Some(price))) if is_valid_price(price) => {
                    let quote = PriceQuote {
                        price,
                        source,
                        observed_at: Utc::now(),
                    };
                    self.cache.insert(
                        token.to_string(),
                        CachedPrice {
                            quote: quote.clone(),
                            cached_at: Instant::now(),
                        },
                    );
                    debug!(token = %short(token), price = %price, source = source.as_str(), "price fetched");
                    return Ok(quote);
                }
                Ok(Ok(Some(price))) => {
                    // Out-of-range value is a provider failure, not a success.
                    errors.push(format!("{}: invalid price {}", source.as_str(), price));
                    self.mark_failed(source);
                }
                Ok(Ok(None)) => {
                    errors.push(format!("{}: no price returned", source.as_str()));
                }
                Ok(Err(e)) => {
                    warn!(token = %short(token), source = source.as_str(), error = %e, "price source failed");
                    errors.push(format!("{}: {}", source.as_str(), e));
                    self.mark_failed(source);
                }
                Err(_) => {
                    warn!(token = %short(token), source = source.as_str(), "price source timed out");
                    errors.push(format!("{}: timeout", source.as_str()));
                    self.mark_failed(source);
                }
            }
        }

        warn!(token = %short(token), errors = ?errors, "all price sources failed");
        Err(Error::PriceUnavailable(format!(
            "{}: {}",
            token,
            errors.join("; ")
        )))
    }

    /// Quote many tokens, using batch provider calls where possible.
    ///
    /// Returns only the tokens that could be priced; callers decide what a
    /// missing entry means for them.
    pub async fn prices_of(&self, tokens: &[String]) -> HashMap<String, PriceQuote> {
        let mut results: HashMap<String, PriceQuote> = HashMap::new();
        let mut remaining: Vec<String> = Vec::new();

        for token in tokens {
            if results.contains_key(token) {
                continue;
            }
            match self.cached(token) {
                Some(quote) => {
                    results.insert(token.clone(), quote);
                }
                None => {
                    if !remaining.contains(token) {
                        remaining.push(token.clone());
                    }
                }
            }
        }

        for provider in &self.providers {
            if remaining.is_empty() {
                break;
            }
            let source = provider.source();
            if self.in_cooldown(source) {
                continue;
            }

            let batch =
                tokio::time::timeout(self.config.call_timeout, provider.quote_batch(&remaining))
                    .await;
            match batch {
                Ok(Ok(prices)) => {
                    let now = Utc::now();
                    remaining.retain(|token| match prices.get(token) {
                        Some(&price) if is_valid_price(price) => {
                            let quote = PriceQuote {
                                price,
                                source,
                                observed_at: now,
                            };
                            self.cache.insert(
                                token.clone(),
                                CachedPrice {
                                    quote: quote.clone(),
                                    cached_at: Instant::now(),
                                },
                            );
                            results.insert(token.clone(), quote);
                            false
                        }
                        _ => true,
                    });
                }
                Ok(Err(e)) => {
                    warn!(source = source.as_str(), error = %e, "batch price source failed");
                    self.mark_failed(source);
                }
                Err(_) => {
                    warn!(source = source.as_str(), "batch price source timed out");
                    self.mark_failed(source);
                }
            }
        }

        results
    }

    pub fn clear_cache(&self, token: Option<&str>) {
        match token {
            Some(token) => {
                self.cache.remove(token);
            }
            None => self.cache.clear(),
        }
    }

    pub fn reset_source_failures(&self) {
        self.cooldowns.clear();
    }

    fn cached(&self, token: &str) -> Option<PriceQuote> {
        let entry = self.cache.get(token)?;
        if entry.cached_at.elapsed() < self.config.cache_ttl {
            Some(entry.quote.clone())
        } else {
            None
        }
    }

    fn in_cooldown(&self, source: PriceSource) -> bool {
        self.cooldowns
            .get(&source)
            .map(|at| at.elapsed() < self.config.failure_cooldown)
            .unwrap_or(false)
    }

    fn mark_failed(&self, source: PriceSource) {
        self.cooldowns.insert(source, Instant::now());
    }
}

fn is_valid_price(price: Decimal) -> bool {
    price >= min_valid_price() && price <= max_valid_price()
}

fn short(address: &str) -> &str {
    &address[..address.len().min(8)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MockPriceProvider;
    use rust_decimal_macros::dec;

    fn provider(
        source: PriceSource,
        result: Result<Option<Decimal>>,
    ) -> Arc<dyn PriceProvider> {
        let mut mock = MockPriceProvider::new();
        mock.expect_source().return_const(source);
        match result {
            Ok(price) => {
                mock.expect_quote().returning(move |_| Ok(price));
            }
            Err(_) => {
                mock.expect_quote()
                    .returning(|_| Err(Error::PriceUnavailable("down".into())));
            }
        }
        mock.expect_quote_batch()
            .returning(|_| Ok(HashMap::new()));
        Arc::new(mock)
    }

    #[tokio::test]
    async fn test_primary_source_wins() {
        let oracle = PriceOracle::new(
            vec![
                provider(PriceSource::PrimaryFeed, Ok(Some(dec!(0.001)))),
                provider(PriceSource::SecondaryFeed, Ok(Some(dec!(0.002)))),
            ],
            OracleConfig::default(),
        );

        let quote = oracle.price_of("TokenA").await.unwrap();
        assert_eq!(quote.price, dec!(0.001));
        assert_eq!(quote.source, PriceSource::PrimaryFeed);
    }

    #[tokio::test]
    async fn test_falls_back_on_provider_error() {
        let oracle = PriceOracle::new(
            vec![
                provider(
                    PriceSource::PrimaryFeed,
                    Err(Error::PriceUnavailable("down".into())),
                ),
                provider(PriceSource::SecondaryFeed, Ok(Some(dec!(0.002)))),
            ],
            OracleConfig::default(),
        );

        let quote = oracle.price_of("TokenA").await.unwrap();
        assert_eq!(quote.source, PriceSource::SecondaryFeed);
    }

    #[tokio::test]
    async fn test_out_of_range_price_is_failure() {
        let oracle = PriceOracle::new(
            vec![
                provider(PriceSource::PrimaryFeed, Ok(Some(Decimal::new(1, 15)))),
                provider(PriceSource::SecondaryFeed, Ok(Some(dec!(0.002)))),
            ],
            OracleConfig::default(),
        );

        let quote = oracle.price_of("TokenA").await.unwrap();
        assert_eq!(quote.source, PriceSource::SecondaryFeed);
    }

    #[tokio::test]
    async fn test_total_failure_returns_error() {
        let oracle = PriceOracle::new(
            vec![provider(
                PriceSource::PrimaryFeed,
                Err(Error::PriceUnavailable("down".into())),
            )],
            OracleConfig::default(),
        );

        assert!(oracle.price_of("TokenA").await.is_err());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_providers() {
        let mut mock = MockPriceProvider::new();
        mock.expect_source().return_const(PriceSource::PrimaryFeed);
        mock.expect_quote()
            .times(1)
            .returning(|_| Ok(Some(dec!(0.001))));
        mock.expect_quote_batch().returning(|_| Ok(HashMap::new()));

        let oracle = PriceOracle::new(vec![Arc::new(mock)], OracleConfig::default());

        oracle.price_of("TokenA").await.unwrap();
        // Second call must come from cache; the mock allows only one call.
        let quote = oracle.price_of("TokenA").await.unwrap();
        assert_eq!(quote.price, dec!(0.001));
    }

    #[tokio::test]
    async fn test_failed_source_enters_cooldown() {
        let mut failing = MockPriceProvider::new();
        failing
            .expect_source()
            .return_const(PriceSource::PrimaryFeed);
        failing
            .expect_quote()
            .times(1)
            .returning(|_| Err(Error::PriceUnavailable("down".into())));
        failing
            .expect_quote_batch()
            .returning(|_| Ok(HashMap::new()));

        let oracle = PriceOracle::new(
            vec![
                Arc::new(failing),
                provider(PriceSource::SecondaryFeed, Ok(Some(dec!(0.002)))),
            ],
            OracleConfig::default(),
        );

        oracle.price_of("TokenA").await.unwrap();
        oracle.clear_cache(None);
        // Primary is in cooldown now; only the secondary may be called.
        let quote = oracle.price_of("TokenA").await.unwrap();
        assert_eq!(quote.source, PriceSource::SecondaryFeed);
    }
}
