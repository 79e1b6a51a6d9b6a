//! Global system run/pause state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::events::CircuitBreakerType;

/// Global trading status. Exactly one state row exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    Running,
    PausedManual,
    PausedDrawdown,
    PausedWinRate,
    PausedConsecutiveLoss,
}

impl SystemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Running => "running",
            SystemStatus::PausedManual => "paused_manual",
            SystemStatus::PausedDrawdown => "paused_drawdown",
            SystemStatus::PausedWinRate => "paused_win_rate",
            SystemStatus::PausedConsecutiveLoss => "paused_consecutive_loss",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "paused_manual" => SystemStatus::PausedManual,
            "paused_drawdown" => SystemStatus::PausedDrawdown,
            "paused_win_rate" => SystemStatus::PausedWinRate,
            "paused_consecutive_loss" => SystemStatus::PausedConsecutiveLoss,
            _ => SystemStatus::Running,
        }
    }

    pub fn is_paused(&self) -> bool {
        *self != SystemStatus::Running
    }

    pub fn is_circuit_breaker_pause(&self) -> bool {
        matches!(
            self,
            SystemStatus::PausedDrawdown
                | SystemStatus::PausedWinRate
                | SystemStatus::PausedConsecutiveLoss
        )
    }

    /// The pause state a tripped breaker maps to.
    pub fn for_breaker(breaker: CircuitBreakerType) -> Self {
        match breaker {
            CircuitBreakerType::Drawdown => SystemStatus::PausedDrawdown,
            CircuitBreakerType::WinRate => SystemStatus::PausedWinRate,
            CircuitBreakerType::ConsecutiveLoss => SystemStatus::PausedConsecutiveLoss,
        }
    }
}

/// Why an operator paused the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseReason {
    Manual,
    Maintenance,
    Investigation,
    CircuitBreaker,
}

impl PauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PauseReason::Manual => "manual",
            PauseReason::Maintenance => "maintenance",
            PauseReason::Investigation => "investigation",
            PauseReason::CircuitBreaker => "circuit_breaker",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "maintenance" => PauseReason::Maintenance,
            "investigation" => PauseReason::Investigation,
            "circuit_breaker" => PauseReason::CircuitBreaker,
            _ => PauseReason::Manual,
        }
    }
}

/// The singleton system state row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    pub status: SystemStatus,
    pub paused_at: Option<DateTime<Utc>>,
    pub paused_by: Option<String>,
    pub pause_reason: Option<PauseReason>,
    pub pause_note: Option<String>,
    pub resumed_at: Option<DateTime<Utc>>,
    pub resumed_by: Option<String>,
    /// Optimistic-concurrency version; bumped on every persisted write.
    pub version: i64,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            status: SystemStatus::Running,
            paused_at: None,
            paused_by: None,
            pause_reason: None,
            pause_note: None,
            resumed_at: None,
            resumed_by: None,
            version: 0,
        }
    }
}

impl SystemState {
    pub fn is_paused(&self) -> bool {
        self.status.is_paused()
    }

    pub fn is_circuit_breaker_pause(&self) -> bool {
        self.status.is_circuit_breaker_pause()
    }

    pub fn pause_duration_seconds(&self) -> Option<i64> {
        self.paused_at
            .filter(|_| self.is_paused())
            .map(|at| (Utc::now() - at).num_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_running() {
        let state = SystemState::default();
        assert_eq!(state.status, SystemStatus::Running);
        assert!(!state.is_paused());
        assert!(state.pause_duration_seconds().is_none());
    }

    #[test]
    fn test_breaker_status_mapping() {
        assert_eq!(
            SystemStatus::for_breaker(CircuitBreakerType::Drawdown),
            SystemStatus::PausedDrawdown
        );
        assert_eq!(
            SystemStatus::for_breaker(CircuitBreakerType::WinRate),
            SystemStatus::PausedWinRate
        );
        assert_eq!(
            SystemStatus::for_breaker(CircuitBreakerType::ConsecutiveLoss),
            SystemStatus::PausedConsecutiveLoss
        );
    }

    #[test]
    fn test_circuit_breaker_pause_detection() {
        assert!(SystemStatus::PausedDrawdown.is_circuit_breaker_pause());
        assert!(!SystemStatus::PausedManual.is_circuit_breaker_pause());
        assert!(!SystemStatus::Running.is_circuit_breaker_pause());
    }
}
