//! Database operations for versioned exit strategies.

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::types::{ExitRule, ExitStrategy, MoonbagConfig, StrategyStatus};
use crate::{Error, Result};

/// Repository for exit strategies.
pub struct ExitStrategyRepository {
    pool: PgPool,
}

impl ExitStrategyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, strategy: &ExitStrategy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO exit_strategies (
                id, name, version, status, rules, moonbag, max_hold_hours,
                stagnation_hours, stagnation_threshold_pct
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(strategy.id)
        .bind(&strategy.name)
        .bind(strategy.version as i32)
        .bind(strategy.status.as_str())
        .bind(serde_json::to_value(&strategy.rules)?)
        .bind(serde_json::to_value(&strategy.moonbag)?)
        .bind(strategy.max_hold_hours)
        .bind(strategy.stagnation_hours)
        .bind(strategy.stagnation_threshold_pct)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<ExitStrategy>> {
        let row = sqlx::query("SELECT * FROM exit_strategies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::row_to_strategy(&r)).transpose()
    }

    /// The active version of a named strategy.
    pub async fn get_active_by_name(&self, name: &str) -> Result<Option<ExitStrategy>> {
        let row =
            sqlx::query("SELECT * FROM exit_strategies WHERE name = $1 AND status = 'active'")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| Self::row_to_strategy(&r)).transpose()
    }

    pub async fn list_by_status(&self, status: StrategyStatus) -> Result<Vec<ExitStrategy>> {
        let rows = sqlx::query(
            "SELECT * FROM exit_strategies WHERE status = $1 ORDER BY name, version DESC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_strategy).collect()
    }

    /// Activate a draft, archiving the currently active version of the same
    /// name in the same transaction. Active versions stay immutable: there is
    /// no update path, only insert + activate.
    pub async fn activate(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT name, status FROM exit_strategies WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let row = row.ok_or(Error::StrategyMissing(id))?;
        let name: String = row.get("name");
        let status = StrategyStatus::parse(row.get::<String, _>("status").as_str());
        if status != StrategyStatus::Draft {
            return Err(Error::Rejected(format!(
                "only draft strategies can be activated, {id} is {status:?}"
            )));
        }

        sqlx::query(
            "UPDATE exit_strategies SET status = 'archived' WHERE name = $1 AND status = 'active'",
        )
        .bind(&name)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE exit_strategies SET status = 'active' WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    fn row_to_strategy(r: &sqlx::postgres::PgRow) -> Result<ExitStrategy> {
        let rules: Vec<ExitRule> = serde_json::from_value(r.get("rules"))?;
        let moonbag: MoonbagConfig = serde_json::from_value(r.get("moonbag"))?;

        Ok(ExitStrategy {
            id: r.get("id"),
            name: r.get("name"),
            version: r.get::<i32, _>("version") as u32,
            status: StrategyStatus::parse(r.get::<String, _>("status").as_str()),
            rules,
            moonbag,
            max_hold_hours: r.get("max_hold_hours"),
            stagnation_hours: r.get("stagnation_hours"),
            stagnation_threshold_pct: r.get::<Option<Decimal>, _>("stagnation_threshold_pct"),
        })
    }
}

#[async_trait::async_trait]
impl crate::stores::StrategyStore for ExitStrategyRepository {
    async fn insert(&self, strategy: &ExitStrategy) -> Result<()> {
        ExitStrategyRepository::insert(self, strategy).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<ExitStrategy>> {
        ExitStrategyRepository::get_by_id(self, id).await
    }

    async fn get_active_by_name(&self, name: &str) -> Result<Option<ExitStrategy>> {
        ExitStrategyRepository::get_active_by_name(self, name).await
    }

    async fn list_by_status(&self, status: StrategyStatus) -> Result<Vec<ExitStrategy>> {
        ExitStrategyRepository::list_by_status(self, status).await
    }

    async fn activate(&self, id: Uuid) -> Result<()> {
        ExitStrategyRepository::activate(self, id).await
    }
}
