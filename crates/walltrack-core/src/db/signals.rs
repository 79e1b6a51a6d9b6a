//! Append-only signal log.

use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::types::{
    ConvictionTier, EligibilityStatus, ExecutionStatus, FilterStatus, SignalRecord, SwapDirection,
};
use crate::Result;

/// Repository for the append-only signal log.
pub struct SignalRepository {
    pool: PgPool,
}

impl SignalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a signal record.
    ///
    /// The unique index on `tx_signature` makes double-processing harmless:
    /// the second insert is a no-op and `false` is returned.
    pub async fn append(&self, record: &SignalRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO signals (
                id, tx_signature, wallet_address, token_address, direction,
                amount_token, amount_sol, slot, final_score, wallet_score,
                cluster_multiplier, token_score, context_score, eligibility,
                filter_status, conviction_tier, position_multiplier,
                execution_status, execution_detail, reason, block_time,
                received_at, processing_time_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            ON CONFLICT (tx_signature) DO NOTHING
            "#,
        )
        .bind(record.id)
        .bind(&record.tx_signature)
        .bind(&record.wallet_address)
        .bind(&record.token_address)
        .bind(record.direction.as_str())
        .bind(record.amount_token)
        .bind(record.amount_sol)
        .bind(record.slot)
        .bind(record.final_score)
        .bind(record.wallet_score)
        .bind(record.cluster_multiplier)
        .bind(record.token_score)
        .bind(record.context_score)
        .bind(record.eligibility.as_str())
        .bind(record.filter_status.as_str())
        .bind(record.conviction_tier.map(|t| t.as_str()))
        .bind(record.position_multiplier)
        .bind(record.execution_status.map(|s| s.as_str()))
        .bind(&record.execution_detail)
        .bind(&record.reason)
        .bind(record.block_time)
        .bind(record.received_at)
        .bind(record.processing_time_ms)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Has this transaction already been recorded?
    pub async fn exists_tx(&self, tx_signature: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 AS hit FROM signals WHERE tx_signature = $1 LIMIT 1")
            .bind(tx_signature)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }

    /// Record how far an eligible signal got through the execution path.
    pub async fn update_execution_status(
        &self,
        signal_id: Uuid,
        status: ExecutionStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE signals SET execution_status = $2, execution_detail = $3 WHERE id = $1",
        )
        .bind(signal_id)
        .bind(status.as_str())
        .bind(detail)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<SignalRecord>> {
        let row = sqlx::query("SELECT * FROM signals WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Self::row_to_record(&r)))
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<SignalRecord>> {
        let rows = sqlx::query("SELECT * FROM signals ORDER BY received_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::row_to_record).collect())
    }

    fn row_to_record(r: &sqlx::postgres::PgRow) -> SignalRecord {
        SignalRecord {
            id: r.get("id"),
            tx_signature: r.get("tx_signature"),
            wallet_address: r.get("wallet_address"),
            token_address: r.get("token_address"),
            direction: match r.get::<String, _>("direction").as_str() {
                "sell" => SwapDirection::Sell,
                _ => SwapDirection::Buy,
            },
            amount_token: r.get("amount_token"),
            amount_sol: r.get("amount_sol"),
            slot: r.get("slot"),
            final_score: r.get("final_score"),
            wallet_score: r.get("wallet_score"),
            cluster_multiplier: r.get("cluster_multiplier"),
            token_score: r.get("token_score"),
            context_score: r.get("context_score"),
            eligibility: EligibilityStatus::parse(r.get::<String, _>("eligibility").as_str()),
            filter_status: FilterStatus::parse(r.get::<String, _>("filter_status").as_str()),
            conviction_tier: r
                .get::<Option<String>, _>("conviction_tier")
                .map(|s| ConvictionTier::parse(&s)),
            position_multiplier: r.get("position_multiplier"),
            execution_status: r
                .get::<Option<String>, _>("execution_status")
                .map(|s| ExecutionStatus::parse(&s)),
            execution_detail: r.get("execution_detail"),
            reason: r.get("reason"),
            block_time: r.get("block_time"),
            received_at: r.get("received_at"),
            processing_time_ms: r.get("processing_time_ms"),
        }
    }
}

#[async_trait::async_trait]
impl crate::stores::SignalLog for SignalRepository {
    async fn append(&self, record: &SignalRecord) -> Result<bool> {
        SignalRepository::append(self, record).await
    }

    async fn exists_tx(&self, tx_signature: &str) -> Result<bool> {
        SignalRepository::exists_tx(self, tx_signature).await
    }

    async fn update_execution_status<'a>(
        &self,
        signal_id: Uuid,
        status: ExecutionStatus,
        detail: Option<&'a str>,
    ) -> Result<()> {
        SignalRepository::update_execution_status(self, signal_id, status, detail).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<SignalRecord>> {
        SignalRepository::get_by_id(self, id).await
    }

    async fn recent(&self, limit: i64) -> Result<Vec<SignalRecord>> {
        SignalRepository::recent(self, limit).await
    }
}
