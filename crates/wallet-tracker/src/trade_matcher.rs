//! FIFO matching of BUY/SELL swaps into completed trades.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

use walltrack_core::types::{SwapDirection, SwapEvent};

/// A completed round trip: one BUY matched to one SELL on the same token.
#[derive(Debug, Clone)]
pub struct MatchedTrade {
    pub token_address: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub buy_sol: Decimal,
    pub sell_sol: Decimal,
    pub pnl_sol: Decimal,
    pub profitable: bool,
}

impl MatchedTrade {
    pub fn hold_duration(&self) -> chrono::Duration {
        self.exit_time - self.entry_time
    }
}

/// Match BUY and SELL swaps per token, oldest to oldest (FIFO).
///
/// Unmatched buys (still holding) and unmatched sells (position predates the
/// history window) are dropped. The result is sorted by exit time, newest
/// last.
pub fn match_trades(events: &[SwapEvent]) -> Vec<MatchedTrade> {
    let mut by_token: HashMap<&str, (Vec<&SwapEvent>, Vec<&SwapEvent>)> = HashMap::new();
    for event in events {
        let entry = by_token.entry(event.token_address.as_str()).or_default();
        match event.direction {
            SwapDirection::Buy => entry.0.push(event),
            SwapDirection::Sell => entry.1.push(event),
        }
    }

    let mut trades: Vec<MatchedTrade> = Vec::new();
    for (token, (mut buys, mut sells)) in by_token {
        buys.sort_by_key(|e| e.block_time);
        sells.sort_by_key(|e| e.block_time);

        for (buy, sell) in buys.iter().zip(sells.iter()) {
            let pnl = sell.amount_sol - buy.amount_sol;
            trades.push(MatchedTrade {
                token_address: token.to_string(),
                entry_time: buy.block_time,
                exit_time: sell.block_time,
                buy_sol: buy.amount_sol,
                sell_sol: sell.amount_sol,
                pnl_sol: pnl,
                profitable: pnl > Decimal::ZERO,
            });
        }
    }

    trades.sort_by_key(|t| t.exit_time);
    trades
}

/// Count losses back from the newest trade until the first win.
pub fn consecutive_losses(trades: &[MatchedTrade]) -> u32 {
    let mut count = 0;
    for trade in trades.iter().rev() {
        if trade.profitable {
            break;
        }
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn swap(
        token: &str,
        direction: SwapDirection,
        amount_sol: Decimal,
        minutes: i64,
    ) -> SwapEvent {
        SwapEvent {
            tx_signature: format!("sig-{token}-{minutes}"),
            wallet_address: "W1".into(),
            token_address: token.into(),
            direction,
            amount_token: dec!(1000),
            amount_sol,
            slot: minutes,
            block_time: Utc::now() + Duration::minutes(minutes),
        }
    }

    #[test]
    fn test_buy_sell_pair_matched() {
        let events = vec![
            swap("T1", SwapDirection::Buy, dec!(1.0), 0),
            swap("T1", SwapDirection::Sell, dec!(1.5), 10),
        ];

        let trades = match_trades(&events);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].pnl_sol, dec!(0.5));
        assert!(trades[0].profitable);
    }

    #[test]
    fn test_fifo_matching_per_token() {
        let events = vec![
            swap("T1", SwapDirection::Buy, dec!(1.0), 0),
            swap("T1", SwapDirection::Buy, dec!(2.0), 5),
            swap("T1", SwapDirection::Sell, dec!(0.8), 10),
            swap("T1", SwapDirection::Sell, dec!(3.0), 20),
        ];

        let trades = match_trades(&events);
        assert_eq!(trades.len(), 2);
        // Oldest buy matches oldest sell.
        assert_eq!(trades[0].pnl_sol, dec!(-0.2));
        assert_eq!(trades[1].pnl_sol, dec!(1.0));
    }

    #[test]
    fn test_unmatched_buys_dropped() {
        let events = vec![
            swap("T1", SwapDirection::Buy, dec!(1.0), 0),
            swap("T1", SwapDirection::Buy, dec!(1.0), 5),
            swap("T1", SwapDirection::Sell, dec!(1.2), 10),
        ];

        let trades = match_trades(&events);
        assert_eq!(trades.len(), 1);
    }

    #[test]
    fn test_tokens_matched_independently() {
        let events = vec![
            swap("T1", SwapDirection::Buy, dec!(1.0), 0),
            swap("T2", SwapDirection::Buy, dec!(1.0), 1),
            swap("T2", SwapDirection::Sell, dec!(0.5), 5),
            swap("T1", SwapDirection::Sell, dec!(2.0), 8),
        ];

        let trades = match_trades(&events);
        assert_eq!(trades.len(), 2);
        // Sorted by exit time.
        assert_eq!(trades[0].token_address, "T2");
        assert_eq!(trades[1].token_address, "T1");
    }

    #[test]
    fn test_consecutive_losses_from_newest() {
        let events = vec![
            swap("T1", SwapDirection::Buy, dec!(1.0), 0),
            swap("T1", SwapDirection::Sell, dec!(2.0), 1),
            swap("T2", SwapDirection::Buy, dec!(1.0), 2),
            swap("T2", SwapDirection::Sell, dec!(0.5), 3),
            swap("T3", SwapDirection::Buy, dec!(1.0), 4),
            swap("T3", SwapDirection::Sell, dec!(0.4), 5),
        ];

        let trades = match_trades(&events);
        assert_eq!(consecutive_losses(&trades), 2);
    }

    #[test]
    fn test_consecutive_losses_zero_after_win() {
        let events = vec![
            swap("T1", SwapDirection::Buy, dec!(1.0), 0),
            swap("T1", SwapDirection::Sell, dec!(0.5), 1),
            swap("T2", SwapDirection::Buy, dec!(1.0), 2),
            swap("T2", SwapDirection::Sell, dec!(2.0), 3),
        ];

        let trades = match_trades(&events);
        assert_eq!(consecutive_losses(&trades), 0);
    }
}
