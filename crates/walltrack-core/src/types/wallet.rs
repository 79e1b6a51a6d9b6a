//! Wallet profiles and their lifecycle states.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a tracked wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    /// Seen on-chain but not yet analyzed.
    Discovered,
    /// Metrics computed, watchlist decision pending.
    Profiled,
    /// On the monitored set; its swaps generate signals.
    Active,
    /// Analyzed and rejected by watchlist criteria.
    Ignored,
    /// Never trade on this wallet's activity.
    Blacklisted,
}

impl WalletStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletStatus::Discovered => "discovered",
            WalletStatus::Profiled => "profiled",
            WalletStatus::Active => "active",
            WalletStatus::Ignored => "ignored",
            WalletStatus::Blacklisted => "blacklisted",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "discovered" => WalletStatus::Discovered,
            "profiled" => WalletStatus::Profiled,
            "active" => WalletStatus::Active,
            "blacklisted" => WalletStatus::Blacklisted,
            _ => WalletStatus::Ignored,
        }
    }
}

/// Decay state derived from rolling trade outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayStatus {
    Ok,
    Flagged,
    Downgraded,
    Dormant,
}

impl DecayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecayStatus::Ok => "ok",
            DecayStatus::Flagged => "flagged",
            DecayStatus::Downgraded => "downgraded",
            DecayStatus::Dormant => "dormant",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "flagged" => DecayStatus::Flagged,
            "downgraded" => DecayStatus::Downgraded,
            "dormant" => DecayStatus::Dormant,
            _ => DecayStatus::Ok,
        }
    }
}

/// Typical position size relative to the wallet's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSizeStyle {
    Small,
    Medium,
    Large,
}

impl PositionSizeStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSizeStyle::Small => "small",
            PositionSizeStyle::Medium => "medium",
            PositionSizeStyle::Large => "large",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "small" => Some(PositionSizeStyle::Small),
            "medium" => Some(PositionSizeStyle::Medium),
            "large" => Some(PositionSizeStyle::Large),
            _ => None,
        }
    }
}

/// Typical hold duration classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldDurationStyle {
    Scalper,
    DayTrader,
    Swing,
}

impl HoldDurationStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldDurationStyle::Scalper => "scalper",
            HoldDurationStyle::DayTrader => "day_trader",
            HoldDurationStyle::Swing => "swing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scalper" => Some(HoldDurationStyle::Scalper),
            "day_trader" => Some(HoldDurationStyle::DayTrader),
            "swing" => Some(HoldDurationStyle::Swing),
            _ => None,
        }
    }
}

/// Confidence in the behavioral classification, driven by sample size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehavioralConfidence {
    Low,
    Medium,
    High,
}

impl BehavioralConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehavioralConfidence::Low => "low",
            BehavioralConfidence::Medium => "medium",
            BehavioralConfidence::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(BehavioralConfidence::Low),
            "medium" => Some(BehavioralConfidence::Medium),
            "high" => Some(BehavioralConfidence::High),
            _ => None,
        }
    }
}

/// Profile of a tracked wallet with lifetime and rolling-window metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletProfile {
    pub address: String,
    pub status: WalletStatus,
    /// Trustworthiness score, always within [0.1, 1.0].
    pub score: f64,
    pub win_rate: Option<f64>,
    pub total_pnl_sol: Decimal,
    pub total_trades: u32,
    pub avg_pnl_per_trade_sol: Decimal,
    pub rolling_win_rate: Option<f64>,
    pub rolling_wins: u32,
    pub rolling_losses: u32,
    pub consecutive_losses: u32,
    pub decay_status: DecayStatus,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub position_size_style: Option<PositionSizeStyle>,
    pub hold_duration_style: Option<HoldDurationStyle>,
    pub behavioral_confidence: Option<BehavioralConfidence>,
    pub discovered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletProfile {
    /// Scores never leave this range, no matter how many penalties stack up.
    pub const MIN_SCORE: f64 = 0.1;
    pub const MAX_SCORE: f64 = 1.0;

    /// Conservative score used for wallets we have no record for.
    pub const DEFAULT_SCORE: f64 = 0.3;

    /// A newly discovered wallet awaiting profiling.
    pub fn discovered(address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            address: address.into(),
            status: WalletStatus::Discovered,
            score: Self::DEFAULT_SCORE,
            win_rate: None,
            total_pnl_sol: Decimal::ZERO,
            total_trades: 0,
            avg_pnl_per_trade_sol: Decimal::ZERO,
            rolling_win_rate: None,
            rolling_wins: 0,
            rolling_losses: 0,
            consecutive_losses: 0,
            decay_status: DecayStatus::Ok,
            last_activity_at: None,
            position_size_style: None,
            hold_duration_style: None,
            behavioral_confidence: None,
            discovered_at: now,
            updated_at: now,
        }
    }

    /// Synthesized default for unknown wallets hit during scoring.
    ///
    /// Conservative score prevents overscoring inputs we know nothing about.
    pub fn default_for(address: impl Into<String>) -> Self {
        Self {
            status: WalletStatus::Active,
            ..Self::discovered(address)
        }
    }

    /// Set the score, enforcing the [0.1, 1.0] bounds on every update.
    pub fn set_score(&mut self, score: f64) {
        self.score = score.clamp(Self::MIN_SCORE, Self::MAX_SCORE);
    }

    pub fn is_blacklisted(&self) -> bool {
        self.status == WalletStatus::Blacklisted
    }

    pub fn is_monitored(&self) -> bool {
        self.status == WalletStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounded_on_update() {
        let mut wallet = WalletProfile::discovered("W1");
        wallet.set_score(5.0);
        assert_eq!(wallet.score, WalletProfile::MAX_SCORE);
        wallet.set_score(-1.0);
        assert_eq!(wallet.score, WalletProfile::MIN_SCORE);
        wallet.set_score(0.45);
        assert_eq!(wallet.score, 0.45);
    }

    #[test]
    fn test_default_profile_is_conservative() {
        let wallet = WalletProfile::default_for("W2");
        assert_eq!(wallet.status, WalletStatus::Active);
        assert_eq!(wallet.score, 0.3);
        assert_eq!(wallet.total_trades, 0);
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            WalletStatus::Discovered,
            WalletStatus::Profiled,
            WalletStatus::Active,
            WalletStatus::Ignored,
            WalletStatus::Blacklisted,
        ] {
            assert_eq!(WalletStatus::parse(status.as_str()), status);
        }
    }
}
