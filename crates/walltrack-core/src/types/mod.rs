//! Domain entity types shared across the workspace.

pub mod events;
pub mod order;
pub mod position;
pub mod signal;
pub mod strategy;
pub mod swap;
pub mod system;
pub mod token;
pub mod wallet;

pub use events::{
    CircuitBreakerTrigger, CircuitBreakerType, DecayEvent, DecayEventType, OrderStatusChange,
    PositionSlotEvent, QueuedSignal, SlotEventType, TradeOutcome,
};
pub use order::{Order, OrderKind, OrderSide, OrderStatus, RETRY_DELAYS_SECS};
pub use position::{CalculatedLevel, ExitExecution, ExitReason, Position, PositionLevels, PositionStatus};
pub use signal::{
    ConvictionTier, EligibilityStatus, ExecutionStatus, FilterStatus, GateDecision, ScoreBreakdown,
    ScoredSignal, SignalRecord,
};
pub use strategy::{ExitRule, ExitRuleType, ExitStrategy, MoonbagConfig, StrategyStatus};
pub use swap::{SwapDirection, SwapEvent};
pub use system::{PauseReason, SystemState, SystemStatus};
pub use token::{TokenCharacteristics, TokenSource};
pub use wallet::{
    BehavioralConfidence, DecayStatus, HoldDurationStyle, PositionSizeStyle, WalletProfile,
    WalletStatus,
};
