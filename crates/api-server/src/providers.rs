//! Edge adapters: HTTP-backed implementations of the consumed ports.
//!
//! The core only sees the traits; these thin clients translate to whatever
//! sidecar services the deployment points them at via environment variables.
//! The cluster service is optional and degrades to "no cluster".

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use walltrack_core::ports::{
    ClusterInfo, ClusterService, PriceProvider, PriceSource, SwapHistory, SwapReceipt,
    SwapRequest, SwapStatus, TokenFetcher, TradeClient,
};
use walltrack_core::types::{SwapDirection, SwapEvent, TokenCharacteristics, TokenSource};
use walltrack_core::{Error, Result};

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(Error::Http)
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| Error::Config(format!("{name} environment variable not set")))
}

/// Price providers in fallback priority order, from the configured feed URLs.
pub fn price_providers() -> Result<Vec<Arc<dyn PriceProvider>>> {
    let mut providers: Vec<Arc<dyn PriceProvider>> = Vec::new();
    for (var, source) in [
        ("PRICE_FEED_PRIMARY_URL", PriceSource::PrimaryFeed),
        ("PRICE_FEED_SECONDARY_URL", PriceSource::SecondaryFeed),
        ("PRICE_FEED_FALLBACK_URL", PriceSource::Fallback),
    ] {
        if let Ok(base_url) = std::env::var(var) {
            providers.push(Arc::new(HttpPriceProvider {
                client: http_client()?,
                base_url,
                source,
            }));
        }
    }
    if providers.is_empty() {
        return Err(Error::Config(
            "at least one PRICE_FEED_*_URL must be set".into(),
        ));
    }
    Ok(providers)
}

pub fn trade_client() -> Result<Arc<dyn TradeClient>> {
    Ok(Arc::new(HttpTradeClient {
        client: http_client()?,
        base_url: required_env("TRADE_VENUE_URL")?,
    }))
}

pub fn token_fetcher() -> Result<Arc<dyn TokenFetcher>> {
    Ok(Arc::new(HttpTokenFetcher {
        client: http_client()?,
        base_url: required_env("TOKEN_FEED_URL")?,
    }))
}

pub fn cluster_service() -> Result<Arc<dyn ClusterService>> {
    match std::env::var("CLUSTER_SERVICE_URL") {
        Ok(base_url) => Ok(Arc::new(HttpClusterService {
            client: http_client()?,
            base_url,
        })),
        Err(_) => Ok(Arc::new(NullClusterService)),
    }
}

pub fn swap_history() -> Result<Arc<dyn SwapHistory>> {
    Ok(Arc::new(HttpSwapHistory {
        client: http_client()?,
        base_url: required_env("SWAP_HISTORY_URL")?,
    }))
}

struct HttpPriceProvider {
    client: reqwest::Client,
    base_url: String,
    source: PriceSource,
}

#[derive(Deserialize)]
struct PriceResponse {
    price: Option<Decimal>,
}

#[async_trait]
impl PriceProvider for HttpPriceProvider {
    fn source(&self) -> PriceSource {
        self.source
    }

    async fn quote(&self, token: &str) -> Result<Option<Decimal>> {
        let response = self
            .client
            .get(format!("{}/price/{token}", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        let body: PriceResponse = response.json().await?;
        Ok(body.price)
    }

    async fn quote_batch(&self, tokens: &[String]) -> Result<HashMap<String, Decimal>> {
        let response = self
            .client
            .post(format!("{}/prices", self.base_url))
            .json(&serde_json::json!({ "tokens": tokens }))
            .send()
            .await?
            .error_for_status()?;
        let body: HashMap<String, Decimal> = response.json().await?;
        Ok(body)
    }
}

struct HttpTradeClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct SwapResponse {
    status: String,
    tx_signature: Option<String>,
    output_amount: Option<Decimal>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct BalanceResponse {
    available_sol: Decimal,
}

#[async_trait]
impl TradeClient for HttpTradeClient {
    async fn swap(&self, request: SwapRequest) -> Result<SwapReceipt> {
        let response = self
            .client
            .post(format!("{}/swap", self.base_url))
            .json(&serde_json::json!({
                "token_address": request.token_address,
                "side": request.side.as_str(),
                "amount_sol": request.amount_sol,
                "amount_tokens": request.amount_tokens,
                "slippage_bps": request.slippage_bps,
            }))
            .send()
            .await?
            .error_for_status()?;
        let body: SwapResponse = response.json().await?;

        let status = match body.status.as_str() {
            "confirmed" => SwapStatus::Confirmed,
            _ => SwapStatus::Failed,
        };
        Ok(SwapReceipt {
            status,
            tx_signature: body.tx_signature,
            output_amount: body.output_amount,
            error: body.error,
        })
    }

    async fn available_balance_sol(&self) -> Result<Decimal> {
        let response = self
            .client
            .get(format!("{}/balance", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        let body: BalanceResponse = response.json().await?;
        Ok(body.available_sol)
    }
}

struct HttpTokenFetcher {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    liquidity_usd: Option<Decimal>,
    market_cap_usd: Option<Decimal>,
    age_minutes: Option<i64>,
    #[serde(default)]
    is_honeypot: bool,
    #[serde(default)]
    is_new_token: bool,
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    async fn fetch(&self, token: &str) -> Result<Option<TokenCharacteristics>> {
        let response = self
            .client
            .get(format!("{}/token/{token}", self.base_url))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: TokenResponse = response.error_for_status()?.json().await?;

        Ok(Some(TokenCharacteristics {
            address: token.to_string(),
            liquidity_usd: body.liquidity_usd,
            market_cap_usd: body.market_cap_usd,
            age_minutes: body.age_minutes,
            is_honeypot: body.is_honeypot,
            is_new_token: body.is_new_token,
            source: TokenSource::PrimaryFeed,
        }))
    }
}

struct HttpClusterService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct ClusterResponse {
    cluster_id: Option<String>,
    #[serde(default)]
    is_leader: bool,
    #[serde(default = "default_multiplier")]
    multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

#[async_trait]
impl ClusterService for HttpClusterService {
    async fn get_cluster_for(&self, wallet: &str) -> Result<Option<ClusterInfo>> {
        let response = self
            .client
            .get(format!("{}/cluster/{wallet}", self.base_url))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: ClusterResponse = response.error_for_status()?.json().await?;
        if body.cluster_id.is_none() {
            return Ok(None);
        }
        Ok(Some(ClusterInfo {
            cluster_id: body.cluster_id,
            is_leader: body.is_leader,
            multiplier: body.multiplier,
        }))
    }
}

/// No wallet-graph deployed: every wallet is clusterless.
struct NullClusterService;

#[async_trait]
impl ClusterService for NullClusterService {
    async fn get_cluster_for(&self, _wallet: &str) -> Result<Option<ClusterInfo>> {
        Ok(None)
    }
}

struct HttpSwapHistory {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct HistorySwap {
    tx_signature: String,
    token_address: String,
    direction: String,
    amount_token: Decimal,
    amount_sol: Decimal,
    slot: i64,
    block_time: DateTime<Utc>,
}

#[async_trait]
impl SwapHistory for HttpSwapHistory {
    async fn recent_swaps(&self, wallet: &str, limit: usize) -> Result<Vec<SwapEvent>> {
        let response = self
            .client
            .get(format!(
                "{}/wallet/{wallet}/swaps?limit={limit}",
                self.base_url
            ))
            .send()
            .await?
            .error_for_status()?;
        let body: Vec<HistorySwap> = response.json().await?;

        Ok(body
            .into_iter()
            .map(|swap| SwapEvent {
                tx_signature: swap.tx_signature,
                wallet_address: wallet.to_string(),
                token_address: swap.token_address,
                direction: match swap.direction.as_str() {
                    "sell" => SwapDirection::Sell,
                    _ => SwapDirection::Buy,
                },
                amount_token: swap.amount_token,
                amount_sol: swap.amount_sol,
                slot: swap.slot,
                block_time: swap.block_time,
            })
            .collect())
    }
}
