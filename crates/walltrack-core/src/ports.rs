//! Consumed ports injected at startup.
//!
//! The core never talks to a concrete RPC, DEX, or data feed. Providers are
//! implemented outside the core and handed in as trait objects; tests use the
//! generated mocks or small in-memory implementations.

use async_trait::async_trait;
use mockall::automock;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::types::{OrderSide, SwapEvent, TokenCharacteristics};
use crate::Result;

/// Identity of a price feed, in fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    PrimaryFeed,
    SecondaryFeed,
    Fallback,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::PrimaryFeed => "primary_feed",
            PriceSource::SecondaryFeed => "secondary_feed",
            PriceSource::Fallback => "fallback",
        }
    }
}

/// A single price feed.
#[automock]
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn source(&self) -> PriceSource;

    /// Quote one token. `Ok(None)` means the provider has no price; an `Err`
    /// counts toward the provider's failure cooldown.
    async fn quote(&self, token: &str) -> Result<Option<Decimal>>;

    /// Batch quote. Providers without a batch API fall back to singles.
    async fn quote_batch(&self, tokens: &[String]) -> Result<HashMap<String, Decimal>>;
}

/// Request handed to the venue client.
#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub token_address: String,
    pub side: OrderSide,
    pub amount_sol: Decimal,
    pub amount_tokens: Option<Decimal>,
    pub slippage_bps: u32,
}

/// Terminal outcome of a swap attempt as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStatus {
    Confirmed,
    Failed,
}

/// Result of a swap submission, after the client's own confirmation wait.
#[derive(Debug, Clone)]
pub struct SwapReceipt {
    pub status: SwapStatus,
    pub tx_signature: Option<String>,
    /// Tokens received on a buy, SOL received on a sell.
    pub output_amount: Option<Decimal>,
    pub error: Option<String>,
}

impl SwapReceipt {
    pub fn confirmed(tx_signature: impl Into<String>, output_amount: Decimal) -> Self {
        Self {
            status: SwapStatus::Confirmed,
            tx_signature: Some(tx_signature.into()),
            output_amount: Some(output_amount),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: SwapStatus::Failed,
            tx_signature: None,
            output_amount: None,
            error: Some(error.into()),
        }
    }
}

/// Venue access for market swaps.
#[automock]
#[async_trait]
pub trait TradeClient: Send + Sync {
    async fn swap(&self, request: SwapRequest) -> Result<SwapReceipt>;

    /// SOL available for new entries in the trading wallet.
    async fn available_balance_sol(&self) -> Result<Decimal>;
}

/// Token characteristics lookup.
#[automock]
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self, token: &str) -> Result<Option<TokenCharacteristics>>;
}

/// Cluster membership as reported by the wallet-graph collaborator.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub cluster_id: Option<String>,
    pub is_leader: bool,
    /// Amplification multiplier derived from cluster participation and size.
    pub multiplier: f64,
}

/// Wallet-graph lookups. Graph internals live outside the core.
#[automock]
#[async_trait]
pub trait ClusterService: Send + Sync {
    async fn get_cluster_for(&self, wallet: &str) -> Result<Option<ClusterInfo>>;
}

/// Historical swap activity for a wallet, newest last.
#[automock]
#[async_trait]
pub trait SwapHistory: Send + Sync {
    async fn recent_swaps(&self, wallet: &str, limit: usize) -> Result<Vec<SwapEvent>>;
}
