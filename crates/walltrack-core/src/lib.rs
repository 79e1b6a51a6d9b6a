//! Shared domain types, ports, and persistence for the WallTrack trading system.
//!
//! Everything the other crates agree on lives here: the entity types and
//! their state machines, the consumed ports (price providers, trade client,
//! token fetcher, cluster service), the multi-source price oracle, and the
//! sqlx repositories over PostgreSQL.

pub mod config;
pub mod db;
pub mod error;
pub mod oracle;
pub mod ports;
pub mod stores;
pub mod types;

pub use error::{Error, Result};
