//! Error types for the WallTrack system.

use thiserror::Error;

use crate::types::order::OrderStatus;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid order transition: {from:?} -> {to:?}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Exit strategy {0} not found")]
    StrategyMissing(uuid::Uuid),

    #[error("Operation rejected: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, Error>;
