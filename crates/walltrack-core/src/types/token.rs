//! Token characteristics used read-only by the scorer and threshold gate.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which feed produced the token data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    PrimaryFeed,
    SecondaryFeed,
    Fallback,
}

impl TokenSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenSource::PrimaryFeed => "primary_feed",
            TokenSource::SecondaryFeed => "secondary_feed",
            TokenSource::Fallback => "fallback",
        }
    }
}

/// Characteristics of a token at signal time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenCharacteristics {
    pub address: String,
    pub liquidity_usd: Option<Decimal>,
    pub market_cap_usd: Option<Decimal>,
    pub age_minutes: Option<i64>,
    pub is_honeypot: bool,
    pub is_new_token: bool,
    pub source: TokenSource,
}

impl TokenCharacteristics {
    /// Worst-case default when the fetcher fails.
    ///
    /// Assuming honeypot blocks the gate, so an unknown token can never trade.
    pub fn fallback(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            liquidity_usd: None,
            market_cap_usd: None,
            age_minutes: None,
            is_honeypot: true,
            is_new_token: true,
            source: TokenSource::Fallback,
        }
    }
}
