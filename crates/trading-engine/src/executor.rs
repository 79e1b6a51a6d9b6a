//! Order executor: submits market swaps through the venue client and walks
//! the order status machine, persisting every transition.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use walltrack_core::config::SharedConfig;
use walltrack_core::ports::{SwapReceipt, SwapRequest, SwapStatus, TradeClient};
use walltrack_core::stores::OrderStore;
use walltrack_core::types::{Order, OrderSide, OrderStatus};
use walltrack_core::{Error, Result};

/// Outcome of one execution attempt.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub success: bool,
    /// The order as it ended up: `Filled` or `Failed`.
    pub order: Order,
    pub tx_signature: Option<String>,
    pub actual_price: Option<Decimal>,
    /// SOL received on a sell, tokens received on a buy.
    pub output_amount: Option<Decimal>,
    pub error: Option<String>,
    pub can_retry: bool,
}

/// Executes pending orders against the venue.
///
/// The executor assumes exclusive ownership of the order for the duration of
/// the call: fresh orders from the entry service are not yet visible to the
/// retry worker, and retried orders are leased.
pub struct OrderExecutor {
    client: Arc<dyn TradeClient>,
    orders: Arc<dyn OrderStore>,
    config: SharedConfig,
    /// Timebox on the venue call; must stay below the retry lease TTL.
    call_timeout: Duration,
}

impl OrderExecutor {
    pub fn new(
        client: Arc<dyn TradeClient>,
        orders: Arc<dyn OrderStore>,
        config: SharedConfig,
    ) -> Self {
        Self {
            client,
            orders,
            config,
            call_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Execute an order that is currently `Pending`.
    pub async fn execute(&self, mut order: Order) -> Result<OrderResult> {
        if order.status != OrderStatus::Pending {
            return Err(Error::Rejected(format!(
                "order {} is {:?}, executor requires pending",
                order.id, order.status
            )));
        }

        self.advance(&mut order, OrderStatus::Submitted, None).await?;

        if order.is_simulated {
            return self.fill_simulated(order).await;
        }

        let request = SwapRequest {
            token_address: order.token_address.clone(),
            side: order.side,
            amount_sol: order.amount_sol,
            amount_tokens: order.amount_tokens,
            slippage_bps: order.max_slippage_bps,
        };

        let receipt = match tokio::time::timeout(self.call_timeout, self.client.swap(request))
            .await
        {
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                return self.fail(order, format!("swap call failed: {e}")).await;
            }
            Err(_) => {
                return self.fail(order, "swap call timed out".to_string()).await;
            }
        };

        match receipt.status {
            SwapStatus::Failed => {
                let reason = receipt
                    .error
                    .unwrap_or_else(|| "venue rejected swap".to_string());
                self.fail(order, reason).await
            }
            SwapStatus::Confirmed => self.confirm(order, receipt).await,
        }
    }

    async fn confirm(&self, mut order: Order, receipt: SwapReceipt) -> Result<OrderResult> {
        order.tx_signature = receipt.tx_signature.clone();
        self.advance(&mut order, OrderStatus::Confirming, receipt.tx_signature.as_deref())
            .await?;

        let output = match receipt.output_amount {
            Some(output) if output > Decimal::ZERO => output,
            _ => {
                return self
                    .fail(order, "confirmed swap reported no output amount".to_string())
                    .await;
            }
        };

        // Derive the realized price from what actually moved.
        let actual_price = match order.side {
            OrderSide::Buy => order.amount_sol / output,
            OrderSide::Sell => match order.amount_tokens {
                Some(tokens) if tokens > Decimal::ZERO => output / tokens,
                _ => {
                    return self
                        .fail(order, "sell order missing token amount".to_string())
                        .await;
                }
            },
        };
        order.actual_price = Some(actual_price);

        if let Some(slippage) = order.slippage_bps() {
            if slippage > order.max_slippage_bps {
                let reason = format!(
                    "slippage {} bps exceeds limit {} bps",
                    slippage, order.max_slippage_bps
                );
                return self.fail(order, reason).await;
            }
        }

        match order.side {
            OrderSide::Buy => order.amount_tokens = Some(output),
            OrderSide::Sell => {}
        }

        self.advance(&mut order, OrderStatus::Filled, None).await?;

        info!(
            order_id = %order.id,
            kind = order.kind.as_str(),
            tx = %order.tx_signature.as_deref().unwrap_or(""),
            price = %actual_price,
            slippage_bps = ?order.slippage_bps(),
            "order filled"
        );

        Ok(OrderResult {
            success: true,
            tx_signature: order.tx_signature.clone(),
            actual_price: Some(actual_price),
            output_amount: Some(output),
            error: None,
            can_retry: false,
            order,
        })
    }

    /// Simulation mode bypasses the venue entirely but walks the same
    /// status chain, synthesizing a deterministic fill at the expected price.
    async fn fill_simulated(&self, mut order: Order) -> Result<OrderResult> {
        let tx_signature = format!("sim-{}", Uuid::new_v4());
        order.tx_signature = Some(tx_signature.clone());
        self.advance(&mut order, OrderStatus::Confirming, Some(&tx_signature))
            .await?;

        order.actual_price = Some(order.expected_price);
        let output = match order.side {
            OrderSide::Buy => {
                let tokens = order.amount_sol / order.expected_price;
                order.amount_tokens = Some(tokens);
                tokens
            }
            OrderSide::Sell => order
                .amount_tokens
                .map(|tokens| tokens * order.expected_price)
                .unwrap_or(Decimal::ZERO),
        };

        self.advance(&mut order, OrderStatus::Filled, Some("simulated")).await?;

        info!(order_id = %order.id, "simulated order filled");

        Ok(OrderResult {
            success: true,
            tx_signature: Some(tx_signature),
            actual_price: Some(order.expected_price),
            output_amount: Some(output),
            error: None,
            can_retry: false,
            order,
        })
    }

    async fn fail(&self, mut order: Order, reason: String) -> Result<OrderResult> {
        warn!(order_id = %order.id, error = %reason, attempt = order.attempt_count + 1, "order attempt failed");

        let delays = self.config.read().await.retry.retry_delays_secs.clone();
        let from = order.status;
        order.record_failure(reason.clone(), &delays);
        order.transition(OrderStatus::Failed)?;
        self.persist(&order, from, Some(&reason)).await;

        Ok(OrderResult {
            success: false,
            tx_signature: order.tx_signature.clone(),
            actual_price: order.actual_price,
            output_amount: None,
            error: Some(reason),
            can_retry: order.can_retry(),
            order,
        })
    }

    async fn advance(
        &self,
        order: &mut Order,
        to: OrderStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        let from = order.status;
        order.transition(to)?;
        self.persist(order, from, detail).await;
        Ok(())
    }

    async fn persist(&self, order: &Order, from: OrderStatus, detail: Option<&str>) {
        if let Err(e) = self.orders.update(order).await {
            error!(order_id = %order.id, error = %e, "failed to persist order");
        }
        if let Err(e) = self
            .orders
            .append_status_log(order.id, from, order.status, detail)
            .await
        {
            error!(order_id = %order.id, error = %e, "failed to append order status log");
        }
    }
}
