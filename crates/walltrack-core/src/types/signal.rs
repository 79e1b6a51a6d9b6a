//! Scored signals and the append-only signal log entry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::swap::{SwapDirection, SwapEvent};

/// Outcome of the signal filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStatus {
    Passed,
    NotMonitored,
    Blacklisted,
    Dust,
    SelfTrade,
    DuplicateTx,
}

impl FilterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterStatus::Passed => "passed",
            FilterStatus::NotMonitored => "not_monitored",
            FilterStatus::Blacklisted => "blacklisted",
            FilterStatus::Dust => "dust",
            FilterStatus::SelfTrade => "self_trade",
            FilterStatus::DuplicateTx => "duplicate_tx",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "passed" => FilterStatus::Passed,
            "not_monitored" => FilterStatus::NotMonitored,
            "blacklisted" => FilterStatus::Blacklisted,
            "dust" => FilterStatus::Dust,
            "self_trade" => FilterStatus::SelfTrade,
            _ => FilterStatus::DuplicateTx,
        }
    }
}

/// Whether a scored signal cleared the trade threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityStatus {
    Eligible,
    BelowThreshold,
    Filtered,
}

impl EligibilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EligibilityStatus::Eligible => "eligible",
            EligibilityStatus::BelowThreshold => "below_threshold",
            EligibilityStatus::Filtered => "filtered",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "eligible" => EligibilityStatus::Eligible,
            "below_threshold" => EligibilityStatus::BelowThreshold,
            _ => EligibilityStatus::Filtered,
        }
    }
}

/// Conviction classification of an eligible signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvictionTier {
    High,
    Standard,
    None,
}

impl ConvictionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConvictionTier::High => "high",
            ConvictionTier::Standard => "standard",
            ConvictionTier::None => "none",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "high" => ConvictionTier::High,
            "standard" => ConvictionTier::Standard,
            _ => ConvictionTier::None,
        }
    }
}

/// How far an eligible signal got through the execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Trading is paused; the signal was not executed.
    Blocked,
    /// Sizing or risk declined the trade.
    Skipped,
    /// Waiting in the position-slot queue.
    Queued,
    /// An order was created and filled.
    Executed,
    /// The order path failed terminally.
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Blocked => "blocked",
            ExecutionStatus::Skipped => "skipped",
            ExecutionStatus::Queued => "queued",
            ExecutionStatus::Executed => "executed",
            ExecutionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "blocked" => ExecutionStatus::Blocked,
            "skipped" => ExecutionStatus::Skipped,
            "queued" => ExecutionStatus::Queued,
            "executed" => ExecutionStatus::Executed,
            _ => ExecutionStatus::Failed,
        }
    }
}

/// Every intermediate term of the composite score.
///
/// Kept so any scoring decision can be explained without re-running it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Normalized win-rate component, already weighted.
    pub win_rate_component: f64,
    /// Normalized average-PnL component, already weighted.
    pub pnl_component: f64,
    /// Weighted sum of the two wallet components before any multiplier.
    pub wallet_score: f64,
    pub leader_bonus_applied: bool,
    pub leader_bonus: f64,
    /// Multiplier reported by the cluster service before clamping.
    pub cluster_multiplier_raw: f64,
    /// Multiplier after clamping to the configured boost range.
    pub cluster_multiplier: f64,
    /// Composite score clamped to [0, 1].
    pub final_score: f64,
}

/// A swap event with its computed score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredSignal {
    pub signal_id: Uuid,
    pub event: SwapEvent,
    pub breakdown: ScoreBreakdown,
    pub final_score: f64,
    pub cluster_id: Option<String>,
    pub scoring_latency_ms: f64,
}

/// Threshold-gate decision for a scored signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub eligibility: EligibilityStatus,
    pub conviction: ConvictionTier,
    pub position_multiplier: Decimal,
    pub threshold_used: f64,
    pub reason: Option<String>,
}

/// Row appended to the signal log for every processed event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: Uuid,
    pub tx_signature: String,
    pub wallet_address: String,
    pub token_address: String,
    pub direction: SwapDirection,
    pub amount_token: Decimal,
    pub amount_sol: Decimal,
    pub slot: i64,
    pub final_score: Option<f64>,
    pub wallet_score: Option<f64>,
    pub cluster_multiplier: Option<f64>,
    /// Legacy four-factor columns, kept nullable for data compatibility.
    pub token_score: Option<f64>,
    pub context_score: Option<f64>,
    pub eligibility: EligibilityStatus,
    pub filter_status: FilterStatus,
    pub conviction_tier: Option<ConvictionTier>,
    pub position_multiplier: Option<Decimal>,
    pub execution_status: Option<ExecutionStatus>,
    pub execution_detail: Option<String>,
    pub reason: Option<String>,
    pub block_time: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub processing_time_ms: f64,
}

impl SignalRecord {
    /// Record for an event the filter rejected.
    pub fn filtered(event: &SwapEvent, status: FilterStatus, processing_time_ms: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx_signature: event.tx_signature.clone(),
            wallet_address: event.wallet_address.clone(),
            token_address: event.token_address.clone(),
            direction: event.direction,
            amount_token: event.amount_token,
            amount_sol: event.amount_sol,
            slot: event.slot,
            final_score: None,
            wallet_score: None,
            cluster_multiplier: None,
            token_score: None,
            context_score: None,
            eligibility: EligibilityStatus::Filtered,
            filter_status: status,
            conviction_tier: None,
            position_multiplier: None,
            execution_status: None,
            execution_detail: None,
            reason: Some(status.as_str().to_string()),
            block_time: event.block_time,
            received_at: Utc::now(),
            processing_time_ms,
        }
    }

    /// Record for a scored event, eligible or not.
    pub fn scored(
        scored: &ScoredSignal,
        decision: &GateDecision,
        processing_time_ms: f64,
    ) -> Self {
        let event = &scored.event;
        Self {
            id: scored.signal_id,
            tx_signature: event.tx_signature.clone(),
            wallet_address: event.wallet_address.clone(),
            token_address: event.token_address.clone(),
            direction: event.direction,
            amount_token: event.amount_token,
            amount_sol: event.amount_sol,
            slot: event.slot,
            final_score: Some(scored.final_score),
            wallet_score: Some(scored.breakdown.wallet_score),
            cluster_multiplier: Some(scored.breakdown.cluster_multiplier),
            token_score: None,
            context_score: None,
            eligibility: decision.eligibility,
            filter_status: FilterStatus::Passed,
            conviction_tier: Some(decision.conviction),
            position_multiplier: Some(decision.position_multiplier),
            execution_status: None,
            execution_detail: None,
            reason: decision.reason.clone(),
            block_time: event.block_time,
            received_at: Utc::now(),
            processing_time_ms,
        }
    }
}
