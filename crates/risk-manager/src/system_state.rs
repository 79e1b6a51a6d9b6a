//! The singleton system state machine: run/pause with typed reasons.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use walltrack_core::stores::{EventLog, SystemStateStore};
use walltrack_core::types::{CircuitBreakerType, PauseReason, SystemState, SystemStatus};
use walltrack_core::{Error, Result};

/// Operator request to pause trading.
#[derive(Debug, Clone)]
pub struct PauseRequest {
    pub operator: String,
    pub reason: PauseReason,
    pub note: Option<String>,
}

/// Operator request to resume trading.
#[derive(Debug, Clone)]
pub struct ResumeRequest {
    pub operator: String,
    /// Required when resuming from a circuit-breaker pause.
    pub acknowledge_warning: bool,
}

/// Holds the single `SystemState` row and enforces its transitions.
///
/// Exits are always admitted; only entries consult the pause state. The
/// `trading_allowed` flag is the lock-free fast path for the hot loop.
pub struct SystemStateManager {
    state: RwLock<SystemState>,
    trading_allowed: AtomicBool,
    store: Option<Arc<dyn SystemStateStore>>,
    events: Option<Arc<dyn EventLog>>,
}

impl SystemStateManager {
    /// In-memory manager without persistence.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SystemState::default()),
            trading_allowed: AtomicBool::new(true),
            store: None,
            events: None,
        }
    }

    pub fn with_persistence(store: Arc<dyn SystemStateStore>, events: Arc<dyn EventLog>) -> Self {
        Self {
            state: RwLock::new(SystemState::default()),
            trading_allowed: AtomicBool::new(true),
            store: Some(store),
            events: Some(events),
        }
    }

    /// Restore persisted state on startup. Returns whether a row was found.
    pub async fn load(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };

        match store.load().await? {
            Some(loaded) => {
                self.trading_allowed
                    .store(loaded.status == SystemStatus::Running, Ordering::SeqCst);
                *self.state.write().await = loaded;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Whether new entries may be admitted right now.
    pub fn can_trade(&self) -> bool {
        self.trading_allowed.load(Ordering::SeqCst)
    }

    /// Exits are always allowed, whatever the pause state.
    pub fn can_exit(&self) -> bool {
        true
    }

    pub async fn state(&self) -> SystemState {
        self.state.read().await.clone()
    }

    /// Pause trading. Pausing an already-paused system is an idempotent
    /// no-op that leaves the original pause untouched.
    pub async fn pause(&self, request: PauseRequest) -> Result<SystemState> {
        let mut state = self.state.write().await;
        if state.is_paused() {
            return Ok(state.clone());
        }

        let from = state.status;
        state.status = SystemStatus::PausedManual;
        state.paused_at = Some(chrono::Utc::now());
        state.paused_by = Some(request.operator.clone());
        state.pause_reason = Some(request.reason);
        state.pause_note = request.note;
        state.resumed_at = None;
        state.resumed_by = None;
        self.trading_allowed.store(false, Ordering::SeqCst);

        warn!(
            operator = %request.operator,
            reason = request.reason.as_str(),
            "trading paused"
        );

        self.persist(&mut state, from, &request.operator, Some(request.reason.as_str()))
            .await;
        Ok(state.clone())
    }

    /// Enact a circuit-breaker pause. Idempotent while any pause is active.
    pub async fn set_circuit_breaker_pause(
        &self,
        breaker: CircuitBreakerType,
    ) -> Result<SystemState> {
        let mut state = self.state.write().await;
        if state.is_paused() {
            return Ok(state.clone());
        }

        let from = state.status;
        state.status = SystemStatus::for_breaker(breaker);
        state.paused_at = Some(chrono::Utc::now());
        state.paused_by = Some("circuit_breaker".to_string());
        state.pause_reason = Some(PauseReason::CircuitBreaker);
        state.pause_note = Some(breaker.as_str().to_string());
        state.resumed_at = None;
        state.resumed_by = None;
        self.trading_allowed.store(false, Ordering::SeqCst);

        error!(breaker = breaker.as_str(), "circuit breaker paused trading");

        self.persist(&mut state, from, "circuit_breaker", Some(breaker.as_str()))
            .await;
        Ok(state.clone())
    }

    /// Resume trading. Resuming a running system is an idempotent no-op;
    /// resuming from a circuit-breaker pause requires an explicit
    /// acknowledgement of the warning.
    pub async fn resume(&self, request: ResumeRequest) -> Result<SystemState> {
        let mut state = self.state.write().await;
        if !state.is_paused() {
            return Ok(state.clone());
        }

        if state.is_circuit_breaker_pause() && !request.acknowledge_warning {
            return Err(Error::Rejected(
                "resuming from a circuit-breaker pause requires acknowledging the warning".into(),
            ));
        }

        let from = state.status;
        state.status = SystemStatus::Running;
        state.resumed_at = Some(chrono::Utc::now());
        state.resumed_by = Some(request.operator.clone());
        self.trading_allowed.store(true, Ordering::SeqCst);

        info!(operator = %request.operator, "trading resumed");

        self.persist(&mut state, from, &request.operator, None).await;
        Ok(state.clone())
    }

    async fn persist(
        &self,
        state: &mut SystemState,
        from: SystemStatus,
        operator: &str,
        detail: Option<&str>,
    ) {
        if let Some(store) = &self.store {
            let expected = state.version;
            match store.save(state, expected).await {
                Ok(true) => state.version = expected + 1,
                Ok(false) => {
                    // Another writer won the version race; their state stands
                    // in storage, ours stays authoritative in memory until
                    // the next load.
                    warn!("system state version conflict, state not persisted");
                }
                Err(e) => error!(error = %e, "failed to persist system state"),
            }
        }
        if let Some(events) = &self.events {
            if let Err(e) = events
                .append_state_event(from, state.status, operator, detail)
                .await
            {
                error!(error = %e, "failed to append state event");
            }
        }
    }
}

impl Default for SystemStateManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pause_request() -> PauseRequest {
        PauseRequest {
            operator: "operator-1".into(),
            reason: PauseReason::Maintenance,
            note: Some("scheduled maintenance".into()),
        }
    }

    #[tokio::test]
    async fn test_initial_state_running() {
        let manager = SystemStateManager::new();
        assert!(manager.can_trade());
        assert!(manager.can_exit());
        assert_eq!(manager.state().await.status, SystemStatus::Running);
    }

    #[tokio::test]
    async fn test_pause_changes_state() {
        let manager = SystemStateManager::new();
        let state = manager.pause(pause_request()).await.unwrap();

        assert_eq!(state.status, SystemStatus::PausedManual);
        assert_eq!(state.paused_by.as_deref(), Some("operator-1"));
        assert_eq!(state.pause_reason, Some(PauseReason::Maintenance));
        assert!(state.paused_at.is_some());
        assert!(!manager.can_trade());
        assert!(manager.can_exit());
    }

    #[tokio::test]
    async fn test_pause_is_idempotent() {
        let manager = SystemStateManager::new();
        manager.pause(pause_request()).await.unwrap();
        let first = manager.state().await;

        let second = manager
            .pause(PauseRequest {
                operator: "operator-2".into(),
                reason: PauseReason::Investigation,
                note: None,
            })
            .await
            .unwrap();

        // The original pause is untouched.
        assert_eq!(second.paused_by.as_deref(), Some("operator-1"));
        assert_eq!(second.paused_at, first.paused_at);
        assert_eq!(second.pause_reason, Some(PauseReason::Maintenance));
    }

    #[tokio::test]
    async fn test_resume_on_running_is_noop() {
        let manager = SystemStateManager::new();
        let state = manager
            .resume(ResumeRequest {
                operator: "operator-1".into(),
                acknowledge_warning: false,
            })
            .await
            .unwrap();
        assert_eq!(state.status, SystemStatus::Running);
        assert!(state.resumed_by.is_none());
    }

    #[tokio::test]
    async fn test_resume_from_manual_pause() {
        let manager = SystemStateManager::new();
        manager.pause(pause_request()).await.unwrap();

        let state = manager
            .resume(ResumeRequest {
                operator: "operator-1".into(),
                acknowledge_warning: false,
            })
            .await
            .unwrap();

        assert_eq!(state.status, SystemStatus::Running);
        assert_eq!(state.resumed_by.as_deref(), Some("operator-1"));
        assert!(manager.can_trade());
    }

    #[tokio::test]
    async fn test_breaker_resume_requires_ack() {
        let manager = SystemStateManager::new();
        manager
            .set_circuit_breaker_pause(CircuitBreakerType::Drawdown)
            .await
            .unwrap();

        let err = manager
            .resume(ResumeRequest {
                operator: "operator-1".into(),
                acknowledge_warning: false,
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("acknowledg"));
        assert!(!manager.can_trade());

        let state = manager
            .resume(ResumeRequest {
                operator: "operator-1".into(),
                acknowledge_warning: true,
            })
            .await
            .unwrap();
        assert_eq!(state.status, SystemStatus::Running);
    }

    #[tokio::test]
    async fn test_breaker_pause_maps_status() {
        let manager = SystemStateManager::new();
        let state = manager
            .set_circuit_breaker_pause(CircuitBreakerType::WinRate)
            .await
            .unwrap();
        assert_eq!(state.status, SystemStatus::PausedWinRate);
        assert_eq!(state.pause_reason, Some(PauseReason::CircuitBreaker));
    }

    #[tokio::test]
    async fn test_pause_clears_previous_resume_fields() {
        let manager = SystemStateManager::new();
        manager.pause(pause_request()).await.unwrap();
        manager
            .resume(ResumeRequest {
                operator: "operator-1".into(),
                acknowledge_warning: false,
            })
            .await
            .unwrap();

        let state = manager.pause(pause_request()).await.unwrap();
        assert!(state.resumed_at.is_none());
        assert!(state.resumed_by.is_none());
    }

    #[tokio::test]
    async fn test_exits_always_allowed_while_paused() {
        let manager = SystemStateManager::new();
        manager
            .set_circuit_breaker_pause(CircuitBreakerType::ConsecutiveLoss)
            .await
            .unwrap();
        assert!(!manager.can_trade());
        assert!(manager.can_exit());
    }
}
