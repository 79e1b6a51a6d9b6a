//! Database operations for orders, their status log, and retry leases.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::types::{Order, OrderKind, OrderSide, OrderStatus, OrderStatusChange};
use crate::Result;

/// Filters for the order-history query surface.
#[derive(Debug, Clone, Default)]
pub struct OrderHistoryFilter {
    pub status: Option<OrderStatus>,
    pub kind: Option<OrderKind>,
    pub token_address: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// Repository for order rows.
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new order.
    pub async fn create(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, kind, side, signal_id, position_id, token_address,
                amount_sol, amount_tokens, expected_price, actual_price,
                max_slippage_bps, tx_signature, status, attempt_count,
                max_attempts, next_retry_at, last_error, lease_owner,
                lease_until, is_simulated, created_at, updated_at, filled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            "#,
        )
        .bind(order.id)
        .bind(order.kind.as_str())
        .bind(order.side.as_str())
        .bind(order.signal_id)
        .bind(order.position_id)
        .bind(&order.token_address)
        .bind(order.amount_sol)
        .bind(order.amount_tokens)
        .bind(order.expected_price)
        .bind(order.actual_price)
        .bind(order.max_slippage_bps as i32)
        .bind(&order.tx_signature)
        .bind(order.status.as_str())
        .bind(order.attempt_count as i32)
        .bind(order.max_attempts as i32)
        .bind(order.next_retry_at)
        .bind(&order.last_error)
        .bind(&order.lease_owner)
        .bind(order.lease_until)
        .bind(order.is_simulated)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.filled_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Write back all mutable order fields.
    pub async fn update(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders SET
                amount_tokens = $2,
                actual_price = $3,
                tx_signature = $4,
                status = $5,
                attempt_count = $6,
                next_retry_at = $7,
                last_error = $8,
                updated_at = $9,
                filled_at = $10
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(order.amount_tokens)
        .bind(order.actual_price)
        .bind(&order.tx_signature)
        .bind(order.status.as_str())
        .bind(order.attempt_count as i32)
        .bind(order.next_retry_at)
        .bind(&order.last_error)
        .bind(order.updated_at)
        .bind(order.filled_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Conditionally transition the stored status.
    ///
    /// Commits iff the current status is the expected predecessor; this is
    /// what makes concurrent writers safe at the storage layer.
    pub async fn transition_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET status = $3, updated_at = now()
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Self::row_to_order(&r)))
    }

    /// Orders due for retry: failed or pending with an elapsed `next_retry_at`.
    ///
    /// Exit orders always outrank entries; within a kind, oldest due first.
    pub async fn get_pending_retries(&self, limit: i64) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE status IN ('failed', 'pending')
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= now()
            ORDER BY (kind = 'exit') DESC, next_retry_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_order).collect())
    }

    /// Whether an exit order for this position is still in flight.
    ///
    /// The exit manager consults this before creating a new sell order so a
    /// failed exit owned by the retry worker is not doubled on the next tick.
    pub async fn has_active_exit_order(&self, position_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 AS hit FROM orders
            WHERE position_id = $1
              AND kind = 'exit'
              AND (
                  status IN ('pending', 'submitted', 'confirming')
                  OR (status = 'failed' AND attempt_count < max_attempts)
              )
            LIMIT 1
            "#,
        )
        .bind(position_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Acquire the retry lease for an order.
    ///
    /// Succeeds only when the order is unleased or the lease has expired, so
    /// two workers can never both own an order.
    pub async fn acquire_lease(&self, id: Uuid, owner: &str, ttl_secs: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET lease_owner = $2,
                lease_until = now() + make_interval(secs => $3)
            WHERE id = $1
              AND (lease_owner IS NULL OR lease_until < now())
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(ttl_secs as f64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Release a lease held by `owner`.
    pub async fn release_lease(&self, id: Uuid, owner: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders SET lease_owner = NULL, lease_until = NULL
            WHERE id = $1 AND lease_owner = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Paginated order history with optional filters.
    pub async fn get_history(&self, filter: &OrderHistoryFilter) -> Result<Vec<Order>> {
        let limit = if filter.limit > 0 { filter.limit } else { 50 };
        let rows = sqlx::query(
            r#"
            SELECT * FROM orders
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR kind = $2)
              AND ($3::text IS NULL OR token_address = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(&filter.token_address)
        .bind(limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_order).collect())
    }

    pub async fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM orders GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| {
                (
                    OrderStatus::parse(r.get::<String, _>("status").as_str()),
                    r.get::<i64, _>("n"),
                )
            })
            .collect())
    }

    /// Append one status transition to the order timeline.
    pub async fn append_status_log(
        &self,
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO order_status_log (order_id, old_status, new_status, detail, changed_at)
            VALUES ($1, $2, $3, $4, now())
            "#,
        )
        .bind(order_id)
        .bind(old_status.as_str())
        .bind(new_status.as_str())
        .bind(detail)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// The ordered status timeline of one order.
    pub async fn get_status_log(&self, order_id: Uuid) -> Result<Vec<OrderStatusChange>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, old_status, new_status, detail, changed_at
            FROM order_status_log
            WHERE order_id = $1
            ORDER BY changed_at ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| OrderStatusChange {
                order_id: r.get("order_id"),
                old_status: OrderStatus::parse(r.get::<String, _>("old_status").as_str()),
                new_status: OrderStatus::parse(r.get::<String, _>("new_status").as_str()),
                detail: r.get("detail"),
                changed_at: r.get("changed_at"),
            })
            .collect())
    }

    fn row_to_order(r: &sqlx::postgres::PgRow) -> Order {
        Order {
            id: r.get("id"),
            kind: OrderKind::parse(r.get::<String, _>("kind").as_str()),
            side: OrderSide::parse(r.get::<String, _>("side").as_str()),
            signal_id: r.get("signal_id"),
            position_id: r.get("position_id"),
            token_address: r.get("token_address"),
            amount_sol: r.get::<Decimal, _>("amount_sol"),
            amount_tokens: r.get("amount_tokens"),
            expected_price: r.get("expected_price"),
            actual_price: r.get("actual_price"),
            max_slippage_bps: r.get::<i32, _>("max_slippage_bps") as u32,
            tx_signature: r.get("tx_signature"),
            status: OrderStatus::parse(r.get::<String, _>("status").as_str()),
            attempt_count: r.get::<i32, _>("attempt_count") as u32,
            max_attempts: r.get::<i32, _>("max_attempts") as u32,
            next_retry_at: r.get::<Option<DateTime<Utc>>, _>("next_retry_at"),
            last_error: r.get("last_error"),
            lease_owner: r.get("lease_owner"),
            lease_until: r.get("lease_until"),
            is_simulated: r.get("is_simulated"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
            filled_at: r.get("filled_at"),
        }
    }
}

#[async_trait::async_trait]
impl crate::stores::OrderStore for OrderRepository {
    async fn create(&self, order: &Order) -> Result<()> {
        OrderRepository::create(self, order).await
    }

    async fn update(&self, order: &Order) -> Result<()> {
        OrderRepository::update(self, order).await
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<bool> {
        OrderRepository::transition_status(self, id, from, to).await
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Order>> {
        OrderRepository::get_by_id(self, id).await
    }

    async fn get_pending_retries(&self, limit: i64) -> Result<Vec<Order>> {
        OrderRepository::get_pending_retries(self, limit).await
    }

    async fn has_active_exit_order(&self, position_id: Uuid) -> Result<bool> {
        OrderRepository::has_active_exit_order(self, position_id).await
    }

    async fn acquire_lease(&self, id: Uuid, owner: &str, ttl_secs: i64) -> Result<bool> {
        OrderRepository::acquire_lease(self, id, owner, ttl_secs).await
    }

    async fn release_lease(&self, id: Uuid, owner: &str) -> Result<()> {
        OrderRepository::release_lease(self, id, owner).await
    }

    async fn get_history(&self, filter: &OrderHistoryFilter) -> Result<Vec<Order>> {
        OrderRepository::get_history(self, filter).await
    }

    async fn count_by_status(&self) -> Result<Vec<(OrderStatus, i64)>> {
        OrderRepository::count_by_status(self).await
    }

    async fn append_status_log<'a>(
        &self,
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
        detail: Option<&'a str>,
    ) -> Result<()> {
        OrderRepository::append_status_log(self, order_id, old_status, new_status, detail).await
    }

    async fn get_status_log(&self, order_id: Uuid) -> Result<Vec<OrderStatusChange>> {
        OrderRepository::get_status_log(self, order_id).await
    }
}
