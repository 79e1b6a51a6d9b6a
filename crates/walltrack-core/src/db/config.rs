//! Persistence for the hot-reloadable trading configuration.

use sqlx::{PgPool, Row};

use crate::config::TradingConfig;
use crate::Result;

/// Stores the trading configuration as a single JSON row.
pub struct ConfigRepository {
    pool: PgPool,
}

impl ConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn load(&self) -> Result<Option<TradingConfig>> {
        let row = sqlx::query("SELECT payload FROM trading_config WHERE singleton = true")
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let config: TradingConfig = serde_json::from_value(r.get("payload"))?;
                config.validate()?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    pub async fn save(&self, config: &TradingConfig) -> Result<()> {
        config.validate()?;
        sqlx::query(
            r#"
            INSERT INTO trading_config (singleton, payload, updated_at)
            VALUES (true, $1, now())
            ON CONFLICT (singleton) DO UPDATE SET
                payload = EXCLUDED.payload,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(serde_json::to_value(config)?)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl crate::stores::ConfigStore for ConfigRepository {
    async fn load(&self) -> Result<Option<TradingConfig>> {
        ConfigRepository::load(self).await
    }

    async fn save(&self, config: &TradingConfig) -> Result<()> {
        ConfigRepository::save(self, config).await
    }
}
