//! Database operations for positions and their exit executions.

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::types::{
    ConvictionTier, ExitExecution, ExitReason, Position, PositionLevels, PositionStatus,
};
use crate::Result;

const OPEN_STATUSES: &str = "('open', 'partial_exit', 'moonbag')";

/// Repository for position rows.
pub struct PositionRepository {
    pool: PgPool,
}

impl PositionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions (
                id, signal_id, token_address, wallet_address, cluster_id,
                status, entry_price, entry_amount_sol, entry_amount_tokens,
                current_amount_tokens, peak_price, last_price_check,
                conviction_tier, exit_strategy_id, levels, exit_tx_signatures,
                realized_pnl_sol, unrealized_pnl_sol, exit_time, exit_reason,
                exit_price, is_moonbag, is_simulated, opened_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)
            "#,
        )
        .bind(position.id)
        .bind(position.signal_id)
        .bind(&position.token_address)
        .bind(&position.wallet_address)
        .bind(&position.cluster_id)
        .bind(position.status.as_str())
        .bind(position.entry_price)
        .bind(position.entry_amount_sol)
        .bind(position.entry_amount_tokens)
        .bind(position.current_amount_tokens)
        .bind(position.peak_price)
        .bind(position.last_price_check)
        .bind(position.conviction_tier.as_str())
        .bind(position.exit_strategy_id)
        .bind(serde_json::to_value(&position.levels)?)
        .bind(serde_json::to_value(&position.exit_tx_signatures)?)
        .bind(position.realized_pnl_sol)
        .bind(position.unrealized_pnl_sol)
        .bind(position.exit_time)
        .bind(position.exit_reason.map(|r| r.as_str()))
        .bind(position.exit_price)
        .bind(position.is_moonbag)
        .bind(position.is_simulated)
        .bind(position.opened_at)
        .bind(position.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE positions SET
                status = $2,
                current_amount_tokens = $3,
                peak_price = $4,
                last_price_check = $5,
                levels = $6,
                exit_tx_signatures = $7,
                realized_pnl_sol = $8,
                unrealized_pnl_sol = $9,
                exit_time = $10,
                exit_reason = $11,
                exit_price = $12,
                is_moonbag = $13,
                updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(position.id)
        .bind(position.status.as_str())
        .bind(position.current_amount_tokens)
        .bind(position.peak_price)
        .bind(position.last_price_check)
        .bind(serde_json::to_value(&position.levels)?)
        .bind(serde_json::to_value(&position.exit_tx_signatures)?)
        .bind(position.realized_pnl_sol)
        .bind(position.unrealized_pnl_sol)
        .bind(position.exit_time)
        .bind(position.exit_reason.map(|r| r.as_str()))
        .bind(position.exit_price)
        .bind(position.is_moonbag)
        .bind(position.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Position>> {
        let row = sqlx::query("SELECT * FROM positions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| Self::row_to_position(&r)).transpose()
    }

    /// All positions that still hold tokens.
    pub async fn list_open(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM positions WHERE status IN {OPEN_STATUSES} ORDER BY opened_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_position).collect()
    }

    pub async fn count_open(&self) -> Result<i64> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS n FROM positions WHERE status IN {OPEN_STATUSES}"
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("n"))
    }

    /// Open positions holding a given token.
    pub async fn open_for_token(&self, token_address: &str) -> Result<Vec<Position>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM positions WHERE token_address = $1 AND status IN {OPEN_STATUSES}"
        ))
        .bind(token_address)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_position).collect()
    }

    /// SOL committed at entry across open positions for a token.
    pub async fn token_allocation(&self, token_address: &str) -> Result<Decimal> {
        let row = sqlx::query(&format!(
            "SELECT COALESCE(SUM(entry_amount_sol), 0) AS total
             FROM positions WHERE token_address = $1 AND status IN {OPEN_STATUSES}"
        ))
        .bind(token_address)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<Decimal, _>("total"))
    }

    /// SOL committed at entry across all open positions.
    pub async fn total_allocation(&self) -> Result<Decimal> {
        let row = sqlx::query(&format!(
            "SELECT COALESCE(SUM(entry_amount_sol), 0) AS total
             FROM positions WHERE status IN {OPEN_STATUSES}"
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<Decimal, _>("total"))
    }

    pub async fn count_open_in_cluster(&self, cluster_id: &str) -> Result<i64> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS n FROM positions WHERE cluster_id = $1 AND status IN {OPEN_STATUSES}"
        ))
        .bind(cluster_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("n"))
    }

    pub async fn cluster_allocation(&self, cluster_id: &str) -> Result<Decimal> {
        let row = sqlx::query(&format!(
            "SELECT COALESCE(SUM(entry_amount_sol), 0) AS total
             FROM positions WHERE cluster_id = $1 AND status IN {OPEN_STATUSES}"
        ))
        .bind(cluster_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<Decimal, _>("total"))
    }

    /// Append one exit execution record (per-position indexed).
    pub async fn save_exit_execution(&self, execution: &ExitExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO exit_executions (
                id, position_id, exit_reason, trigger_level, sell_percentage,
                amount_tokens_sold, amount_sol_received, exit_price,
                tx_signature, realized_pnl_sol, executed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(execution.id)
        .bind(execution.position_id)
        .bind(execution.exit_reason.as_str())
        .bind(&execution.trigger_level)
        .bind(execution.sell_percentage)
        .bind(execution.amount_tokens_sold)
        .bind(execution.amount_sol_received)
        .bind(execution.exit_price)
        .bind(&execution.tx_signature)
        .bind(execution.realized_pnl_sol)
        .bind(execution.executed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_exit_executions(&self, position_id: Uuid) -> Result<Vec<ExitExecution>> {
        let rows = sqlx::query(
            "SELECT * FROM exit_executions WHERE position_id = $1 ORDER BY executed_at ASC",
        )
        .bind(position_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| ExitExecution {
                id: r.get("id"),
                position_id: r.get("position_id"),
                exit_reason: ExitReason::parse(r.get::<String, _>("exit_reason").as_str()),
                trigger_level: r.get("trigger_level"),
                sell_percentage: r.get("sell_percentage"),
                amount_tokens_sold: r.get("amount_tokens_sold"),
                amount_sol_received: r.get("amount_sol_received"),
                exit_price: r.get("exit_price"),
                tx_signature: r.get("tx_signature"),
                realized_pnl_sol: r.get("realized_pnl_sol"),
                executed_at: r.get("executed_at"),
            })
            .collect())
    }

    fn row_to_position(r: &sqlx::postgres::PgRow) -> Result<Position> {
        let levels: PositionLevels = serde_json::from_value(r.get("levels"))?;
        let exit_tx_signatures: Vec<String> =
            serde_json::from_value(r.get("exit_tx_signatures"))?;

        Ok(Position {
            id: r.get("id"),
            signal_id: r.get("signal_id"),
            token_address: r.get("token_address"),
            wallet_address: r.get("wallet_address"),
            cluster_id: r.get("cluster_id"),
            status: PositionStatus::parse(r.get::<String, _>("status").as_str()),
            entry_price: r.get("entry_price"),
            entry_amount_sol: r.get("entry_amount_sol"),
            entry_amount_tokens: r.get("entry_amount_tokens"),
            current_amount_tokens: r.get("current_amount_tokens"),
            peak_price: r.get("peak_price"),
            last_price_check: r.get("last_price_check"),
            conviction_tier: ConvictionTier::parse(
                r.get::<String, _>("conviction_tier").as_str(),
            ),
            exit_strategy_id: r.get("exit_strategy_id"),
            levels,
            exit_tx_signatures,
            realized_pnl_sol: r.get("realized_pnl_sol"),
            unrealized_pnl_sol: r.get("unrealized_pnl_sol"),
            exit_time: r.get("exit_time"),
            exit_reason: r
                .get::<Option<String>, _>("exit_reason")
                .map(|s| ExitReason::parse(&s)),
            exit_price: r.get("exit_price"),
            is_moonbag: r.get("is_moonbag"),
            is_simulated: r.get("is_simulated"),
            opened_at: r.get("opened_at"),
            updated_at: r.get("updated_at"),
        })
    }
}

#[async_trait::async_trait]
impl crate::stores::PositionStore for PositionRepository {
    async fn create(&self, position: &Position) -> Result<()> {
        PositionRepository::create(self, position).await
    }

    async fn update(&self, position: &Position) -> Result<()> {
        PositionRepository::update(self, position).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Position>> {
        PositionRepository::get_by_id(self, id).await
    }

    async fn list_open(&self) -> Result<Vec<Position>> {
        PositionRepository::list_open(self).await
    }

    async fn count_open(&self) -> Result<i64> {
        PositionRepository::count_open(self).await
    }

    async fn open_for_token(&self, token_address: &str) -> Result<Vec<Position>> {
        PositionRepository::open_for_token(self, token_address).await
    }

    async fn token_allocation(&self, token_address: &str) -> Result<Decimal> {
        PositionRepository::token_allocation(self, token_address).await
    }

    async fn total_allocation(&self) -> Result<Decimal> {
        PositionRepository::total_allocation(self).await
    }

    async fn count_open_in_cluster(&self, cluster_id: &str) -> Result<i64> {
        PositionRepository::count_open_in_cluster(self, cluster_id).await
    }

    async fn cluster_allocation(&self, cluster_id: &str) -> Result<Decimal> {
        PositionRepository::cluster_allocation(self, cluster_id).await
    }

    async fn save_exit_execution(&self, execution: &ExitExecution) -> Result<()> {
        PositionRepository::save_exit_execution(self, execution).await
    }

    async fn list_exit_executions(&self, position_id: Uuid) -> Result<Vec<ExitExecution>> {
        PositionRepository::list_exit_executions(self, position_id).await
    }
}
