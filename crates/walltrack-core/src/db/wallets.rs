//! Database operations for wallet profiles.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::types::{
    BehavioralConfidence, DecayStatus, HoldDurationStyle, PositionSizeStyle, WalletProfile,
    WalletStatus,
};
use crate::Result;

/// Repository for wallet profiles.
pub struct WalletRepository {
    pool: PgPool,
}

impl WalletRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or fully replace a wallet profile.
    pub async fn upsert(&self, wallet: &WalletProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wallets (
                address, status, score, win_rate, total_pnl_sol, total_trades,
                avg_pnl_per_trade_sol, rolling_win_rate, rolling_wins,
                rolling_losses, consecutive_losses, decay_status,
                last_activity_at, position_size_style, hold_duration_style,
                behavioral_confidence, discovered_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18)
            ON CONFLICT (address) DO UPDATE SET
                status = EXCLUDED.status,
                score = EXCLUDED.score,
                win_rate = EXCLUDED.win_rate,
                total_pnl_sol = EXCLUDED.total_pnl_sol,
                total_trades = EXCLUDED.total_trades,
                avg_pnl_per_trade_sol = EXCLUDED.avg_pnl_per_trade_sol,
                rolling_win_rate = EXCLUDED.rolling_win_rate,
                rolling_wins = EXCLUDED.rolling_wins,
                rolling_losses = EXCLUDED.rolling_losses,
                consecutive_losses = EXCLUDED.consecutive_losses,
                decay_status = EXCLUDED.decay_status,
                last_activity_at = EXCLUDED.last_activity_at,
                position_size_style = EXCLUDED.position_size_style,
                hold_duration_style = EXCLUDED.hold_duration_style,
                behavioral_confidence = EXCLUDED.behavioral_confidence,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&wallet.address)
        .bind(wallet.status.as_str())
        .bind(wallet.score)
        .bind(wallet.win_rate)
        .bind(wallet.total_pnl_sol)
        .bind(wallet.total_trades as i32)
        .bind(wallet.avg_pnl_per_trade_sol)
        .bind(wallet.rolling_win_rate)
        .bind(wallet.rolling_wins as i32)
        .bind(wallet.rolling_losses as i32)
        .bind(wallet.consecutive_losses as i32)
        .bind(wallet.decay_status.as_str())
        .bind(wallet.last_activity_at)
        .bind(wallet.position_size_style.map(|s| s.as_str()))
        .bind(wallet.hold_duration_style.map(|s| s.as_str()))
        .bind(wallet.behavioral_confidence.map(|s| s.as_str()))
        .bind(wallet.discovered_at)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_by_address(&self, address: &str) -> Result<Option<WalletProfile>> {
        let row = sqlx::query("SELECT * FROM wallets WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Self::row_to_wallet(&r)))
    }

    /// Wallets in a given status, ordered by discovery time.
    pub async fn list_by_status(
        &self,
        status: WalletStatus,
        limit: i64,
    ) -> Result<Vec<WalletProfile>> {
        let rows = sqlx::query(
            "SELECT * FROM wallets WHERE status = $1 ORDER BY discovered_at ASC LIMIT $2",
        )
        .bind(status.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_wallet).collect())
    }

    pub async fn update_status(&self, address: &str, status: WalletStatus) -> Result<()> {
        sqlx::query("UPDATE wallets SET status = $2, updated_at = now() WHERE address = $1")
            .bind(address)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Persist a decay check outcome. Tracking fields are written even when
    /// the status did not change.
    pub async fn update_decay(
        &self,
        address: &str,
        decay_status: DecayStatus,
        score: f64,
        rolling_win_rate: f64,
        consecutive_losses: u32,
        last_activity_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE wallets SET
                decay_status = $2,
                score = $3,
                rolling_win_rate = $4,
                consecutive_losses = $5,
                last_activity_at = COALESCE($6, last_activity_at),
                updated_at = now()
            WHERE address = $1
            "#,
        )
        .bind(address)
        .bind(decay_status.as_str())
        .bind(score)
        .bind(rolling_win_rate)
        .bind(consecutive_losses as i32)
        .bind(last_activity_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_wallet(r: &sqlx::postgres::PgRow) -> WalletProfile {
        WalletProfile {
            address: r.get("address"),
            status: WalletStatus::parse(r.get::<String, _>("status").as_str()),
            score: r.get("score"),
            win_rate: r.get("win_rate"),
            total_pnl_sol: r.get("total_pnl_sol"),
            total_trades: r.get::<i32, _>("total_trades") as u32,
            avg_pnl_per_trade_sol: r.get("avg_pnl_per_trade_sol"),
            rolling_win_rate: r.get("rolling_win_rate"),
            rolling_wins: r.get::<i32, _>("rolling_wins") as u32,
            rolling_losses: r.get::<i32, _>("rolling_losses") as u32,
            consecutive_losses: r.get::<i32, _>("consecutive_losses") as u32,
            decay_status: DecayStatus::parse(r.get::<String, _>("decay_status").as_str()),
            last_activity_at: r.get("last_activity_at"),
            position_size_style: r
                .get::<Option<String>, _>("position_size_style")
                .and_then(|s| PositionSizeStyle::parse(&s)),
            hold_duration_style: r
                .get::<Option<String>, _>("hold_duration_style")
                .and_then(|s| HoldDurationStyle::parse(&s)),
            behavioral_confidence: r
                .get::<Option<String>, _>("behavioral_confidence")
                .and_then(|s| BehavioralConfidence::parse(&s)),
            discovered_at: r.get("discovered_at"),
            updated_at: r.get("updated_at"),
        }
    }
}

#[async_trait::async_trait]
impl crate::stores::WalletStore for WalletRepository {
    async fn upsert(&self, wallet: &WalletProfile) -> Result<()> {
        WalletRepository::upsert(self, wallet).await
    }

    async fn get_by_address(&self, address: &str) -> Result<Option<WalletProfile>> {
        WalletRepository::get_by_address(self, address).await
    }

    async fn list_by_status(
        &self,
        status: WalletStatus,
        limit: i64,
    ) -> Result<Vec<WalletProfile>> {
        WalletRepository::list_by_status(self, status, limit).await
    }

    async fn update_status(&self, address: &str, status: WalletStatus) -> Result<()> {
        WalletRepository::update_status(self, address, status).await
    }

    async fn update_decay(
        &self,
        address: &str,
        decay_status: DecayStatus,
        score: f64,
        rolling_win_rate: f64,
        consecutive_losses: u32,
        last_activity_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        WalletRepository::update_decay(
            self,
            address,
            decay_status,
            score,
            rolling_win_rate,
            consecutive_losses,
            last_activity_at,
        )
        .await
    }
}
