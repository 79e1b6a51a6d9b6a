//! Decay detection: demotes wallets whose rolling performance has faded.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use walltrack_core::config::{DecayConfig, SharedConfig};
use walltrack_core::ports::SwapHistory;
use walltrack_core::stores::{EventLog, WalletStore};
use walltrack_core::types::{DecayEvent, DecayEventType, DecayStatus, WalletProfile, WalletStatus};
use walltrack_core::Result;

use crate::trade_matcher::{consecutive_losses, match_trades, MatchedTrade};

/// Recomputes wallet decay status from rolling trade outcomes and adjusts
/// scores on transitions.
pub struct DecayDetector {
    wallets: Arc<dyn WalletStore>,
    history: Arc<dyn SwapHistory>,
    events: Arc<dyn EventLog>,
    config: SharedConfig,
}

impl DecayDetector {
    pub fn new(
        wallets: Arc<dyn WalletStore>,
        history: Arc<dyn SwapHistory>,
        events: Arc<dyn EventLog>,
        config: SharedConfig,
    ) -> Self {
        Self {
            wallets,
            history,
            events,
            config,
        }
    }

    /// Check one wallet; returns the decay event when the status changed.
    ///
    /// Tracking fields (rolling win rate, consecutive losses, last activity)
    /// are persisted even when the status is unchanged.
    pub async fn check_wallet(&self, address: &str) -> Result<Option<DecayEvent>> {
        let config = self.config.read().await.decay.clone();

        let Some(wallet) = self.wallets.get_by_address(address).await? else {
            warn!(wallet = %short(address), "wallet not found for decay check");
            return Ok(None);
        };

        let swaps = self.history.recent_swaps(address, 100).await?;
        let trades = match_trades(&swaps);

        if trades.len() < config.min_trades {
            debug!(
                wallet = %short(address),
                trades = trades.len(),
                min_required = config.min_trades,
                "insufficient trades for decay check"
            );
            return Ok(None);
        }

        let window_start = trades.len().saturating_sub(config.rolling_window_size);
        let rolling = &trades[window_start..];
        let rolling_win_rate =
            rolling.iter().filter(|t| t.profitable).count() as f64 / rolling.len() as f64;
        let losses = consecutive_losses(&trades);
        let days_since_activity = days_since_activity(&wallet, &trades);
        let last_activity = trades.last().map(|t| t.exit_time);

        let old_status = wallet.decay_status;
        let new_status = determine_status(
            &config,
            old_status,
            rolling_win_rate,
            losses,
            days_since_activity,
        );

        if new_status == old_status {
            self.wallets
                .update_decay(
                    address,
                    new_status,
                    wallet.score,
                    rolling_win_rate,
                    losses,
                    last_activity,
                )
                .await?;
            return Ok(None);
        }

        let old_score = wallet.score;
        let new_score = adjust_score(&config, old_score, old_status, new_status, losses);
        let event_type = event_type_for(old_status, new_status);

        self.wallets
            .update_decay(
                address,
                new_status,
                new_score,
                rolling_win_rate,
                losses,
                last_activity,
            )
            .await?;

        let event = DecayEvent {
            id: Uuid::new_v4(),
            wallet_address: address.to_string(),
            event_type,
            rolling_win_rate,
            lifetime_win_rate: wallet.win_rate,
            consecutive_losses: losses,
            score_before: old_score,
            score_after: new_score,
            created_at: Utc::now(),
        };
        self.events.append_decay_event(&event).await?;

        info!(
            wallet = %short(address),
            old_status = old_status.as_str(),
            new_status = new_status.as_str(),
            event = event_type.as_str(),
            score = format!("{old_score:.4} -> {new_score:.4}"),
            "wallet decay status changed"
        );

        Ok(Some(event))
    }

    /// Check every monitored wallet once.
    pub async fn sweep(&self) -> Result<usize> {
        let wallets = self
            .wallets
            .list_by_status(WalletStatus::Active, 1_000)
            .await?;
        let mut changed = 0;
        for wallet in &wallets {
            match self.check_wallet(&wallet.address).await {
                Ok(Some(_)) => changed += 1,
                Ok(None) => {}
                Err(e) => {
                    warn!(wallet = %short(&wallet.address), error = %e, "decay check failed");
                }
            }
        }
        Ok(changed)
    }
}

fn days_since_activity(wallet: &WalletProfile, trades: &[MatchedTrade]) -> i64 {
    let last = trades
        .last()
        .map(|t| t.exit_time)
        .or(wallet.last_activity_at);
    match last {
        Some(at) => (Utc::now() - at).num_days(),
        // No recorded activity at all: treat as ancient.
        None => i64::MAX,
    }
}

/// Status assignment with strict priority:
/// Dormant > Downgraded > Flagged > recovery-to-Ok > unchanged.
fn determine_status(
    config: &DecayConfig,
    current: DecayStatus,
    rolling_win_rate: f64,
    consecutive_losses: u32,
    days_since_activity: i64,
) -> DecayStatus {
    if days_since_activity >= config.dormancy_days {
        return DecayStatus::Dormant;
    }
    if consecutive_losses >= config.consecutive_loss_threshold {
        return DecayStatus::Downgraded;
    }
    if rolling_win_rate < config.decay_threshold {
        return DecayStatus::Flagged;
    }
    if current == DecayStatus::Flagged && rolling_win_rate >= config.recovery_threshold {
        return DecayStatus::Ok;
    }
    current
}

/// Score multipliers per transition, clamped into the wallet score bounds.
fn adjust_score(
    config: &DecayConfig,
    old_score: f64,
    old_status: DecayStatus,
    new_status: DecayStatus,
    consecutive_losses: u32,
) -> f64 {
    if old_score <= 0.0 {
        return WalletProfile::MIN_SCORE;
    }

    let mut score = old_score;
    match (old_status, new_status) {
        (DecayStatus::Ok, DecayStatus::Flagged) => {
            score *= config.score_downgrade_decay;
        }
        (_, DecayStatus::Downgraded) => {
            let beyond = consecutive_losses.saturating_sub(config.consecutive_loss_threshold);
            for _ in 0..beyond {
                score *= config.score_downgrade_loss;
            }
        }
        (DecayStatus::Flagged, DecayStatus::Ok) => {
            score *= config.score_recovery_boost;
        }
        _ => {}
    }

    score.clamp(WalletProfile::MIN_SCORE, WalletProfile::MAX_SCORE)
}

fn event_type_for(old_status: DecayStatus, new_status: DecayStatus) -> DecayEventType {
    match new_status {
        DecayStatus::Dormant => DecayEventType::Dormancy,
        DecayStatus::Downgraded => DecayEventType::ConsecutiveLosses,
        DecayStatus::Flagged => DecayEventType::DecayDetected,
        DecayStatus::Ok if old_status == DecayStatus::Flagged => DecayEventType::Recovery,
        _ => DecayEventType::DecayDetected,
    }
}

fn short(address: &str) -> &str {
    &address[..address.len().min(8)]
}
