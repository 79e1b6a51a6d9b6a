//! HTTP surface and worker orchestration for WallTrack.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod signal_processor;
pub mod state;

pub use routes::build_router;
pub use signal_processor::SignalProcessor;
pub use state::AppState;
