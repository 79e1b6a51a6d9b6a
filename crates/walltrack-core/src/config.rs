//! Configuration: infrastructure settings from the environment, trading
//! parameters as a persisted, hot-reloadable aggregate.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{Error, Result};

/// Shared handle to the hot-reloadable trading configuration.
pub type SharedConfig = Arc<RwLock<TradingConfig>>;

/// Infrastructure configuration loaded once from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    Error::Config("DATABASE_URL environment variable not set".to_string())
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
            },
        })
    }
}

/// Mode used by the position sizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizingMode {
    FixedPercent,
    RiskBased,
}

/// Signal-scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Minimum composite score for trade eligibility (inclusive).
    pub trade_threshold: f64,
    pub high_conviction_threshold: f64,
    /// Wallet sub-score component weights; must sum to 1.0.
    pub wallet_win_rate_weight: f64,
    pub wallet_pnl_weight: f64,
    /// Multiplier applied when the wallet leads its cluster.
    pub leader_bonus: f64,
    /// Average-PnL normalization bounds in SOL.
    pub pnl_normalize_min: f64,
    pub pnl_normalize_max: f64,
    pub min_cluster_boost: f64,
    pub max_cluster_boost: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            trade_threshold: 0.65,
            high_conviction_threshold: 0.85,
            wallet_win_rate_weight: 0.6,
            wallet_pnl_weight: 0.4,
            leader_bonus: 1.2,
            pnl_normalize_min: -1.0,
            pnl_normalize_max: 5.0,
            min_cluster_boost: 1.0,
            max_cluster_boost: 1.5,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.5..=0.9).contains(&self.trade_threshold) {
            return Err(Error::Config(format!(
                "trade_threshold must be in [0.5, 0.9], got {}",
                self.trade_threshold
            )));
        }
        let weight_sum = self.wallet_win_rate_weight + self.wallet_pnl_weight;
        if (weight_sum - 1.0).abs() > 1e-9 {
            return Err(Error::Config(format!(
                "wallet score weights must sum to 1.0, got {}",
                weight_sum
            )));
        }
        if !(1.0..=2.0).contains(&self.leader_bonus) {
            return Err(Error::Config(format!(
                "leader_bonus must be in [1.0, 2.0], got {}",
                self.leader_bonus
            )));
        }
        if self.min_cluster_boost > self.max_cluster_boost {
            return Err(Error::Config(
                "min_cluster_boost must not exceed max_cluster_boost".to_string(),
            ));
        }
        if self.pnl_normalize_min >= self.pnl_normalize_max {
            return Err(Error::Config(
                "pnl_normalize_min must be below pnl_normalize_max".to_string(),
            ));
        }
        Ok(())
    }
}

/// Circuit-breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub drawdown_threshold_pct: Decimal,
    pub win_rate_threshold_pct: f64,
    pub win_rate_window_size: usize,
    pub consecutive_loss_threshold: u32,
    pub no_signal_warning_hours: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            drawdown_threshold_pct: dec!(15),
            win_rate_threshold_pct: 40.0,
            win_rate_window_size: 10,
            consecutive_loss_threshold: 5,
            no_signal_warning_hours: 12,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        if self.win_rate_window_size == 0 {
            return Err(Error::Config("win_rate_window_size must be > 0".into()));
        }
        if self.consecutive_loss_threshold == 0 {
            return Err(Error::Config("consecutive_loss_threshold must be > 0".into()));
        }
        Ok(())
    }
}

/// Position-sizing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    pub mode: SizingMode,
    pub base_position_pct: Decimal,
    pub risk_per_trade_pct: Decimal,
    pub default_stop_loss_pct: Decimal,
    pub min_position_sol: Decimal,
    pub max_position_sol: Decimal,
    pub high_conviction_multiplier: Decimal,
    pub standard_conviction_multiplier: Decimal,
    pub reserve_sol: Decimal,
    pub max_capital_allocation_pct: Decimal,
    pub min_conviction_threshold: f64,
    pub high_conviction_threshold: f64,
    pub max_concurrent_positions: usize,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            mode: SizingMode::FixedPercent,
            base_position_pct: dec!(2),
            risk_per_trade_pct: dec!(1),
            default_stop_loss_pct: dec!(30),
            min_position_sol: dec!(0.01),
            max_position_sol: dec!(1.0),
            high_conviction_multiplier: dec!(1.5),
            standard_conviction_multiplier: dec!(1.0),
            reserve_sol: dec!(0.05),
            max_capital_allocation_pct: dec!(50),
            min_conviction_threshold: 0.70,
            high_conviction_threshold: 0.85,
            max_concurrent_positions: 5,
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_conviction_threshold >= self.high_conviction_threshold {
            return Err(Error::Config(
                "min_conviction_threshold must be below high_conviction_threshold".into(),
            ));
        }
        if self.min_position_sol >= self.max_position_sol {
            return Err(Error::Config(
                "min_position_sol must be below max_position_sol".into(),
            ));
        }
        if self.base_position_pct <= Decimal::ZERO {
            return Err(Error::Config("base_position_pct must be positive".into()));
        }
        if self.default_stop_loss_pct <= Decimal::ZERO {
            return Err(Error::Config("default_stop_loss_pct must be positive".into()));
        }
        Ok(())
    }
}

/// Concentration limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationConfig {
    pub enabled: bool,
    pub max_token_concentration_pct: Decimal,
    pub max_cluster_concentration_pct: Decimal,
    pub max_positions_per_cluster: usize,
    pub block_duplicate_positions: bool,
}

impl Default for ConcentrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_token_concentration_pct: dec!(10),
            max_cluster_concentration_pct: dec!(20),
            max_positions_per_cluster: 3,
            block_duplicate_positions: true,
        }
    }
}

impl ConcentrationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_token_concentration_pct < dec!(5) {
            return Err(Error::Config(
                "max_token_concentration_pct must be >= 5.0".into(),
            ));
        }
        if self.max_cluster_concentration_pct < dec!(10) {
            return Err(Error::Config(
                "max_cluster_concentration_pct must be >= 10.0".into(),
            ));
        }
        if !(1..=10).contains(&self.max_positions_per_cluster) {
            return Err(Error::Config(
                "max_positions_per_cluster must be in [1, 10]".into(),
            ));
        }
        Ok(())
    }
}

/// Wallet decay detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayConfig {
    pub rolling_window_size: usize,
    pub min_trades: usize,
    pub decay_threshold: f64,
    pub recovery_threshold: f64,
    pub consecutive_loss_threshold: u32,
    pub dormancy_days: i64,
    pub score_downgrade_decay: f64,
    pub score_downgrade_loss: f64,
    pub score_recovery_boost: f64,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            rolling_window_size: 20,
            min_trades: 20,
            decay_threshold: 0.40,
            recovery_threshold: 0.50,
            consecutive_loss_threshold: 3,
            dormancy_days: 30,
            score_downgrade_decay: 0.80,
            score_downgrade_loss: 0.95,
            score_recovery_boost: 1.10,
        }
    }
}

impl DecayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.decay_threshold >= self.recovery_threshold {
            return Err(Error::Config(
                "decay_threshold must be below recovery_threshold".into(),
            ));
        }
        if self.min_trades == 0 || self.rolling_window_size == 0 {
            return Err(Error::Config(
                "decay window sizes must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Signal queue behavior when position slots are full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub enable_queue: bool,
    pub max_queue_size: usize,
    pub queue_expiry_minutes: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enable_queue: true,
            max_queue_size: 10,
            queue_expiry_minutes: 60,
        }
    }
}

/// Order retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub retry_delays_secs: Vec<i64>,
    pub max_attempts: u32,
    pub poll_interval_secs: u64,
    pub batch_size: usize,
    pub lease_ttl_secs: i64,
    pub max_concurrent: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_delays_secs: vec![5, 15, 45],
            max_attempts: 3,
            poll_interval_secs: 10,
            batch_size: 10,
            lease_ttl_secs: 60,
            max_concurrent: 4,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retry_delays_secs.is_empty() {
            return Err(Error::Config("retry_delays_secs must not be empty".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be > 0".into()));
        }
        Ok(())
    }
}

/// Criteria for promoting a profiled wallet to the monitored set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistCriteria {
    pub min_trades: u32,
    pub min_win_rate: f64,
    pub min_total_pnl_sol: Decimal,
}

impl Default for WatchlistCriteria {
    fn default() -> Self {
        Self {
            min_trades: 10,
            min_win_rate: 0.5,
            min_total_pnl_sol: dec!(1),
        }
    }
}

/// Wallet profiling worker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilingConfig {
    pub batch_size: usize,
    pub wallet_delay_seconds: u64,
    pub history_limit: usize,
    pub poll_interval_secs: u64,
    pub watchlist: WatchlistCriteria,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            wallet_delay_seconds: 2,
            history_limit: 100,
            poll_interval_secs: 60,
            watchlist: WatchlistCriteria::default(),
        }
    }
}

/// Dust threshold and other filter parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    pub dust_threshold_sol: Decimal,
    pub monitored_cache_ttl_secs: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            dust_threshold_sol: dec!(0.05),
            monitored_cache_ttl_secs: 60,
        }
    }
}

/// The persisted, hot-reloadable trading configuration aggregate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradingConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub concentration: ConcentrationConfig,
    #[serde(default)]
    pub decay: DecayConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub profiling: ProfilingConfig,
    #[serde(default)]
    pub filter: FilterConfig,
}

impl TradingConfig {
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        self.risk.validate()?;
        self.sizing.validate()?;
        self.concentration.validate()?;
        self.decay.validate()?;
        self.retry.validate()?;
        Ok(())
    }

    pub fn shared(self) -> SharedConfig {
        Arc::new(RwLock::new(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(TradingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_weights_must_sum_to_one() {
        let config = ScoringConfig {
            wallet_win_rate_weight: 0.7,
            wallet_pnl_weight: 0.4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_bounds() {
        let config = ScoringConfig {
            trade_threshold: 0.95,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sizing_threshold_ordering() {
        let config = SizingConfig {
            min_conviction_threshold: 0.9,
            high_conviction_threshold: 0.85,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_position_bounds_ordering() {
        let config = SizingConfig {
            min_position_sol: dec!(2),
            max_position_sol: dec!(1),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_concentration_bounds() {
        let config = ConcentrationConfig {
            max_token_concentration_pct: dec!(2),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ConcentrationConfig {
            max_positions_per_cluster: 11,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_decay_threshold_ordering() {
        let config = DecayConfig {
            decay_threshold: 0.6,
            recovery_threshold: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let config = TradingConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TradingConfig = serde_json::from_str(&json).unwrap();
        assert!(back.validate().is_ok());
        assert_eq!(back.scoring.trade_threshold, 0.65);
    }
}
