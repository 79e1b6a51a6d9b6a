//! Append-only event logs: breaker triggers, decay events, slot events,
//! system state changes.

use sqlx::{PgPool, Row};

use crate::types::{
    CircuitBreakerTrigger, CircuitBreakerType, DecayEvent, DecayEventType, PositionSlotEvent,
    SlotEventType, SystemStatus,
};
use crate::Result;

/// Repository for the append-only event tables.
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn append_breaker_trigger(&self, trigger: &CircuitBreakerTrigger) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO circuit_breaker_triggers (
                id, breaker_type, threshold_value, actual_value,
                capital_at_trigger, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(trigger.id)
        .bind(trigger.breaker_type.as_str())
        .bind(trigger.threshold_value)
        .bind(trigger.actual_value)
        .bind(trigger.capital_at_trigger)
        .bind(trigger.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn recent_breaker_triggers(
        &self,
        limit: i64,
    ) -> Result<Vec<CircuitBreakerTrigger>> {
        let rows = sqlx::query(
            "SELECT * FROM circuit_breaker_triggers ORDER BY created_at DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| CircuitBreakerTrigger {
                id: r.get("id"),
                breaker_type: CircuitBreakerType::parse(
                    r.get::<String, _>("breaker_type").as_str(),
                ),
                threshold_value: r.get("threshold_value"),
                actual_value: r.get("actual_value"),
                capital_at_trigger: r.get("capital_at_trigger"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    pub async fn append_decay_event(&self, event: &DecayEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO decay_events (
                id, wallet_address, event_type, rolling_win_rate,
                lifetime_win_rate, consecutive_losses, score_before,
                score_after, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(event.id)
        .bind(&event.wallet_address)
        .bind(event.event_type.as_str())
        .bind(event.rolling_win_rate)
        .bind(event.lifetime_win_rate)
        .bind(event.consecutive_losses as i32)
        .bind(event.score_before)
        .bind(event.score_after)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn recent_decay_events(&self, limit: i64) -> Result<Vec<DecayEvent>> {
        let rows = sqlx::query("SELECT * FROM decay_events ORDER BY created_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| DecayEvent {
                id: r.get("id"),
                wallet_address: r.get("wallet_address"),
                event_type: DecayEventType::parse(r.get::<String, _>("event_type").as_str()),
                rolling_win_rate: r.get("rolling_win_rate"),
                lifetime_win_rate: r.get("lifetime_win_rate"),
                consecutive_losses: r.get::<i32, _>("consecutive_losses") as u32,
                score_before: r.get("score_before"),
                score_after: r.get("score_after"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    pub async fn append_slot_event(&self, event: &PositionSlotEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO position_slot_events (id, event_type, signal_id, detail, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(event.id)
        .bind(event.event_type.as_str())
        .bind(event.signal_id)
        .bind(&event.detail)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn recent_slot_events(&self, limit: i64) -> Result<Vec<PositionSlotEvent>> {
        let rows =
            sqlx::query("SELECT * FROM position_slot_events ORDER BY created_at DESC LIMIT $1")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .iter()
            .map(|r| PositionSlotEvent {
                id: r.get("id"),
                event_type: SlotEventType::parse(r.get::<String, _>("event_type").as_str()),
                signal_id: r.get("signal_id"),
                detail: r.get("detail"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    /// Record one system state transition.
    pub async fn append_state_event(
        &self,
        from: SystemStatus,
        to: SystemStatus,
        operator: &str,
        detail: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO system_state_events (old_status, new_status, operator, detail, created_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(operator)
        .bind(detail)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl crate::stores::EventLog for EventRepository {
    async fn append_breaker_trigger(&self, trigger: &CircuitBreakerTrigger) -> Result<()> {
        EventRepository::append_breaker_trigger(self, trigger).await
    }

    async fn append_decay_event(&self, event: &DecayEvent) -> Result<()> {
        EventRepository::append_decay_event(self, event).await
    }

    async fn append_slot_event(&self, event: &PositionSlotEvent) -> Result<()> {
        EventRepository::append_slot_event(self, event).await
    }

    async fn append_state_event<'a>(
        &self,
        from: SystemStatus,
        to: SystemStatus,
        operator: &str,
        detail: Option<&'a str>,
    ) -> Result<()> {
        EventRepository::append_state_event(self, from, to, operator, detail).await
    }
}
