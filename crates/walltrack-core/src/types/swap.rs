//! Raw on-chain swap events delivered by the ingress webhook.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Direction of a swap from the monitored wallet's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwapDirection {
    Buy,
    Sell,
}

impl SwapDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapDirection::Buy => "buy",
            SwapDirection::Sell => "sell",
        }
    }
}

/// An immutable swap event observed on-chain.
///
/// Events are deduplicated downstream by `tx_signature` and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapEvent {
    pub tx_signature: String,
    pub wallet_address: String,
    pub token_address: String,
    pub direction: SwapDirection,
    pub amount_token: Decimal,
    pub amount_sol: Decimal,
    pub slot: i64,
    pub block_time: DateTime<Utc>,
}

impl SwapEvent {
    /// Validate the event fields before admitting it into the pipeline.
    pub fn validate(&self) -> Result<()> {
        if self.tx_signature.is_empty() {
            return Err(Error::Validation("tx_signature must not be empty".into()));
        }
        if self.wallet_address.is_empty() {
            return Err(Error::Validation("wallet_address must not be empty".into()));
        }
        if self.token_address.is_empty() {
            return Err(Error::Validation("token_address must not be empty".into()));
        }
        if self.amount_sol < Decimal::ZERO || self.amount_token < Decimal::ZERO {
            return Err(Error::Validation("swap amounts must be non-negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> SwapEvent {
        SwapEvent {
            tx_signature: "sig1".to_string(),
            wallet_address: "WalletA".to_string(),
            token_address: "TokenA".to_string(),
            direction: SwapDirection::Buy,
            amount_token: Decimal::new(1000, 0),
            amount_sol: Decimal::new(12, 1),
            slot: 100,
            block_time: Utc::now(),
        }
    }

    #[test]
    fn test_valid_event_passes() {
        assert!(sample_event().validate().is_ok());
    }

    #[test]
    fn test_empty_signature_rejected() {
        let mut event = sample_event();
        event.tx_signature = String::new();
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut event = sample_event();
        event.amount_sol = Decimal::new(-1, 0);
        assert!(event.validate().is_err());
    }
}
