//! The order path: entry service, executor, retry worker, exit management.

pub mod entry_service;
pub mod executor;
pub mod exit_manager;
pub mod exit_monitor;
pub mod levels;
pub mod position_service;
pub mod retry_worker;
pub mod time_exits;

pub use entry_service::EntryOrderService;
pub use executor::{OrderExecutor, OrderResult};
pub use exit_manager::{ExitCheckResult, ExitManager};
pub use exit_monitor::{ExitMonitor, ExitMonitorConfig};
pub use levels::LevelCalculator;
pub use position_service::{PositionService, DEFAULT_EXIT_STRATEGY};
pub use retry_worker::{RetryMetrics, RetryWorker};
pub use time_exits::TimeExitManager;
