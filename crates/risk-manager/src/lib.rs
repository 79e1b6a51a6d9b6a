//! Risk and capital control: system state, circuit breakers, position-slot
//! admission, sizing, and concentration limits.

pub mod circuit_breaker;
pub mod concentration;
pub mod position_slots;
pub mod sizing;
pub mod system_state;

pub use circuit_breaker::CircuitBreakerService;
pub use concentration::{ConcentrationChecker, ConcentrationMetrics};
pub use position_slots::{AdmissionOutcome, PositionSlotManager, QueueEntry};
pub use sizing::{PositionSizer, SizeRequest, SizeResult, SizingDecision};
pub use system_state::{PauseRequest, ResumeRequest, SystemStateManager};
