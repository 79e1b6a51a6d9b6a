//! Wallet profiling and decay detection.

pub mod decay;
pub mod profiler;
pub mod profiling_worker;
pub mod trade_matcher;

pub use decay::DecayDetector;
pub use profiler::{BehavioralProfile, PerformanceMetrics};
pub use profiling_worker::{WalletProfilingWorker, WorkerState, WorkerStatus};
pub use trade_matcher::{match_trades, MatchedTrade};
