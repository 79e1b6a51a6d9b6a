//! Persistence for the singleton system state row.

use sqlx::{PgPool, Row};

use crate::types::{PauseReason, SystemState, SystemStatus};
use crate::Result;

/// Repository for the single-row system state.
///
/// Writes carry an optimistic version check so simultaneous manual and
/// automatic pauses cannot clobber each other.
pub struct SystemStateRepository {
    pool: PgPool,
}

impl SystemStateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load(&self) -> Result<Option<SystemState>> {
        let row = sqlx::query("SELECT * FROM system_state WHERE singleton = true")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| SystemState {
            status: SystemStatus::parse(r.get::<String, _>("status").as_str()),
            paused_at: r.get("paused_at"),
            paused_by: r.get("paused_by"),
            pause_reason: r
                .get::<Option<String>, _>("pause_reason")
                .map(|s| PauseReason::parse(&s)),
            pause_note: r.get("pause_note"),
            resumed_at: r.get("resumed_at"),
            resumed_by: r.get("resumed_by"),
            version: r.get("version"),
        }))
    }

    /// Persist the state iff the stored version matches `expected_version`.
    ///
    /// Returns `false` when another writer got there first; callers reload
    /// and retry or give up.
    pub async fn save(&self, state: &SystemState, expected_version: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO system_state (
                singleton, status, paused_at, paused_by, pause_reason,
                pause_note, resumed_at, resumed_by, version
            )
            VALUES (true, $1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (singleton) DO UPDATE SET
                status = EXCLUDED.status,
                paused_at = EXCLUDED.paused_at,
                paused_by = EXCLUDED.paused_by,
                pause_reason = EXCLUDED.pause_reason,
                pause_note = EXCLUDED.pause_note,
                resumed_at = EXCLUDED.resumed_at,
                resumed_by = EXCLUDED.resumed_by,
                version = EXCLUDED.version
            WHERE system_state.version = $9
            "#,
        )
        .bind(state.status.as_str())
        .bind(state.paused_at)
        .bind(&state.paused_by)
        .bind(state.pause_reason.map(|r| r.as_str()))
        .bind(&state.pause_note)
        .bind(state.resumed_at)
        .bind(&state.resumed_by)
        .bind(expected_version + 1)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait::async_trait]
impl crate::stores::SystemStateStore for SystemStateRepository {
    async fn load(&self) -> Result<Option<SystemState>> {
        SystemStateRepository::load(self).await
    }

    async fn save(&self, state: &SystemState, expected_version: i64) -> Result<bool> {
        SystemStateRepository::save(self, state, expected_version).await
    }
}
