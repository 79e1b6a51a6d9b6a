//! Performance and behavioral analysis of wallet trade history.

use chrono::Duration;
use rust_decimal::Decimal;

use walltrack_core::config::WatchlistCriteria;
use walltrack_core::types::{
    BehavioralConfidence, HoldDurationStyle, PositionSizeStyle, SwapDirection, SwapEvent,
};

use crate::trade_matcher::MatchedTrade;

/// Lifetime performance metrics computed from matched trades.
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    pub win_rate: f64,
    pub total_pnl_sol: Decimal,
    pub total_trades: u32,
    pub avg_pnl_per_trade_sol: Decimal,
}

impl PerformanceMetrics {
    pub fn from_trades(trades: &[MatchedTrade]) -> Self {
        if trades.is_empty() {
            return Self {
                win_rate: 0.0,
                total_pnl_sol: Decimal::ZERO,
                total_trades: 0,
                avg_pnl_per_trade_sol: Decimal::ZERO,
            };
        }

        let wins = trades.iter().filter(|t| t.profitable).count();
        let total_pnl: Decimal = trades.iter().map(|t| t.pnl_sol).sum();

        Self {
            win_rate: wins as f64 / trades.len() as f64,
            total_pnl_sol: total_pnl,
            total_trades: trades.len() as u32,
            avg_pnl_per_trade_sol: total_pnl / Decimal::from(trades.len()),
        }
    }

    /// Whether the wallet qualifies for the monitored set.
    pub fn meets_watchlist(&self, criteria: &WatchlistCriteria) -> bool {
        self.total_trades >= criteria.min_trades
            && self.win_rate >= criteria.min_win_rate
            && self.total_pnl_sol >= criteria.min_total_pnl_sol
    }
}

/// Behavioral classification of a wallet's trading style.
#[derive(Debug, Clone)]
pub struct BehavioralProfile {
    pub position_size_style: PositionSizeStyle,
    pub hold_duration_style: HoldDurationStyle,
    pub confidence: BehavioralConfidence,
}

impl BehavioralProfile {
    /// Classify from raw swaps (for sizes) and matched trades (for holds).
    pub fn from_history(events: &[SwapEvent], trades: &[MatchedTrade]) -> Option<Self> {
        let mut buy_sizes: Vec<Decimal> = events
            .iter()
            .filter(|e| e.direction == SwapDirection::Buy)
            .map(|e| e.amount_sol)
            .collect();
        if buy_sizes.is_empty() || trades.is_empty() {
            return None;
        }
        buy_sizes.sort();
        let median_size = buy_sizes[buy_sizes.len() / 2];

        let mut holds: Vec<Duration> = trades.iter().map(|t| t.hold_duration()).collect();
        holds.sort();
        let median_hold = holds[holds.len() / 2];

        let position_size_style = if median_size < Decimal::new(5, 1) {
            PositionSizeStyle::Small
        } else if median_size < Decimal::new(2, 0) {
            PositionSizeStyle::Medium
        } else {
            PositionSizeStyle::Large
        };

        let hold_duration_style = if median_hold < Duration::hours(1) {
            HoldDurationStyle::Scalper
        } else if median_hold < Duration::hours(24) {
            HoldDurationStyle::DayTrader
        } else {
            HoldDurationStyle::Swing
        };

        let confidence = match trades.len() {
            0..=4 => BehavioralConfidence::Low,
            5..=19 => BehavioralConfidence::Medium,
            _ => BehavioralConfidence::High,
        };

        Some(Self {
            position_size_style,
            hold_duration_style,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn trade(pnl: Decimal, hold_hours: i64) -> MatchedTrade {
        let entry = Utc::now();
        MatchedTrade {
            token_address: "T1".into(),
            entry_time: entry,
            exit_time: entry + Duration::hours(hold_hours),
            buy_sol: dec!(1),
            sell_sol: dec!(1) + pnl,
            pnl_sol: pnl,
            profitable: pnl > Decimal::ZERO,
        }
    }

    fn buy(amount_sol: Decimal) -> SwapEvent {
        SwapEvent {
            tx_signature: format!("sig-{amount_sol}"),
            wallet_address: "W1".into(),
            token_address: "T1".into(),
            direction: SwapDirection::Buy,
            amount_token: dec!(1000),
            amount_sol,
            slot: 1,
            block_time: Utc::now(),
        }
    }

    #[test]
    fn test_performance_metrics() {
        let trades = vec![trade(dec!(1), 2), trade(dec!(-0.5), 2), trade(dec!(0.5), 2)];
        let metrics = PerformanceMetrics::from_trades(&trades);

        assert!((metrics.win_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(metrics.total_pnl_sol, dec!(1.0));
        assert_eq!(metrics.total_trades, 3);
    }

    #[test]
    fn test_empty_history_is_zeroed() {
        let metrics = PerformanceMetrics::from_trades(&[]);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.win_rate, 0.0);
    }

    #[test]
    fn test_watchlist_criteria() {
        let trades: Vec<MatchedTrade> = (0..12).map(|_| trade(dec!(0.2), 2)).collect();
        let metrics = PerformanceMetrics::from_trades(&trades);
        assert!(metrics.meets_watchlist(&WatchlistCriteria::default()));

        let losers: Vec<MatchedTrade> = (0..12).map(|_| trade(dec!(-0.2), 2)).collect();
        let metrics = PerformanceMetrics::from_trades(&losers);
        assert!(!metrics.meets_watchlist(&WatchlistCriteria::default()));
    }

    #[test]
    fn test_behavior_small_scalper() {
        let events: Vec<SwapEvent> = (0..6).map(|_| buy(dec!(0.1))).collect();
        let trades: Vec<MatchedTrade> = (0..6).map(|_| trade(dec!(0.1), 0)).collect();

        let profile = BehavioralProfile::from_history(&events, &trades).unwrap();
        assert_eq!(profile.position_size_style, PositionSizeStyle::Small);
        assert_eq!(profile.hold_duration_style, HoldDurationStyle::Scalper);
        assert_eq!(profile.confidence, BehavioralConfidence::Medium);
    }

    #[test]
    fn test_behavior_large_swing_high_confidence() {
        let events: Vec<SwapEvent> = (0..25).map(|_| buy(dec!(5))).collect();
        let trades: Vec<MatchedTrade> = (0..25).map(|_| trade(dec!(1), 48)).collect();

        let profile = BehavioralProfile::from_history(&events, &trades).unwrap();
        assert_eq!(profile.position_size_style, PositionSizeStyle::Large);
        assert_eq!(profile.hold_duration_style, HoldDurationStyle::Swing);
        assert_eq!(profile.confidence, BehavioralConfidence::High);
    }

    #[test]
    fn test_no_history_no_profile() {
        assert!(BehavioralProfile::from_history(&[], &[]).is_none());
    }
}
