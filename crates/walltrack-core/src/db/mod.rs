//! sqlx repositories over PostgreSQL.

pub mod config;
pub mod events;
pub mod orders;
pub mod positions;
pub mod queue;
pub mod signals;
pub mod strategies;
pub mod system;
pub mod wallets;

pub use config::ConfigRepository;
pub use events::EventRepository;
pub use orders::{OrderHistoryFilter, OrderRepository};
pub use positions::PositionRepository;
pub use queue::QueueRepository;
pub use signals::SignalRepository;
pub use strategies::ExitStrategyRepository;
pub use system::SystemStateRepository;
pub use wallets::WalletRepository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::Result;

/// Create the shared connection pool.
pub async fn create_pool(config: &DatabaseConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.url)
        .await?;
    Ok(pool)
}
