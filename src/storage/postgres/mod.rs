//! PostgreSQL store.
//!
//! Every unit of work is one `sqlx::Transaction`. Redemption, confirmation
//! and deletion are conditional statements, so concurrent transactions on
//! the same row resolve in the database under READ COMMITTED: the loser's
//! `UPDATE`/`DELETE` re-checks its predicate after the winner commits and
//! affects zero rows.

mod migrations;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::config::DatabaseConfig;
use crate::domain::coupon::{CouponDefinition, CouponUsage, MemberCouponGrant, NewCouponDefinition};
use crate::domain::order::{CartItemSnapshot, ConfirmState, NewOrder, Order, OrderLine};
use crate::domain::{CartItemId, CouponId, GrantId, MemberId, OrderId};

use super::{
    CartItemRepository, CouponRepository, MemberCouponRepository, OrderRepository, Store,
    StoreError, StoreResult, UnitOfWork,
};

pub use migrations::run_migrations;

const GRANT_COLUMNS: &str = "mc.id, mc.member_id, mc.availability, mc.source_order_id,
     c.id AS coupon_id, c.name, c.discount_type,
     c.minimum_price, c.discount_price, c.discount_rate";

const COUPON_COLUMNS: &str =
    "id AS coupon_id, name, discount_type, minimum_price, discount_price, discount_rate";

const ORDER_COLUMNS: &str =
    "id, member_id, member_coupon_id, original_price, discount_price, confirm_state, ordered_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        run_migrations(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    type Work = PgUnitOfWork;

    async fn begin(&self) -> StoreResult<PgUnitOfWork> {
        let tx = self.pool.begin().await?;
        Ok(PgUnitOfWork { tx })
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn unique_violation(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::UniqueViolation(db.constraint().unwrap_or("unique").to_string())
        }
        other => StoreError::Database(other),
    }
}

fn coupon_from_row(row: &PgRow) -> StoreResult<CouponDefinition> {
    let code: String = row.try_get("discount_type")?;
    let kind = code
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown discount_type {code}")))?;

    Ok(CouponDefinition {
        id: row.try_get("coupon_id")?,
        name: row.try_get("name")?,
        kind,
        minimum_price: row.try_get("minimum_price")?,
        discount_price: row.try_get("discount_price")?,
        discount_rate: row.try_get("discount_rate")?,
    })
}

fn grant_from_row(row: &PgRow) -> StoreResult<MemberCouponGrant> {
    Ok(MemberCouponGrant {
        id: row.try_get("id")?,
        member_id: row.try_get("member_id")?,
        coupon: coupon_from_row(row)?,
        available: row.try_get("availability")?,
        source_order_id: row.try_get("source_order_id")?,
    })
}

fn order_from_row(row: &PgRow, lines: Vec<OrderLine>) -> StoreResult<Order> {
    let grant: Option<GrantId> = row.try_get("member_coupon_id")?;
    let confirmed: bool = row.try_get("confirm_state")?;

    Ok(Order {
        id: row.try_get("id")?,
        member_id: row.try_get("member_id")?,
        lines,
        coupon: CouponUsage::from(grant),
        original_price: row.try_get("original_price")?,
        discount_price: row.try_get("discount_price")?,
        confirm_state: ConfirmState::from_flag(confirmed),
        ordered_at: row.try_get("ordered_at")?,
    })
}

impl PgUnitOfWork {
    async fn lines_by_order(
        &mut self,
        order_ids: &[OrderId],
    ) -> StoreResult<HashMap<OrderId, Vec<OrderLine>>> {
        let rows = sqlx::query(
            "SELECT order_id, product_id, product_name, unit_price, quantity
             FROM order_item
             WHERE order_id = ANY($1)
             ORDER BY id",
        )
        .bind(order_ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut lines: HashMap<OrderId, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let order_id: OrderId = row.try_get("order_id")?;
            lines.entry(order_id).or_default().push(OrderLine {
                product_id: row.try_get("product_id")?,
                product_name: row.try_get("product_name")?,
                unit_price: row.try_get("unit_price")?,
                quantity: row.try_get("quantity")?,
            });
        }
        Ok(lines)
    }
}

// ============================================================================
// Repositories
// ============================================================================

#[async_trait]
impl CartItemRepository for PgUnitOfWork {
    async fn find_snapshots_by_ids_and_member(
        &mut self,
        member_id: MemberId,
        ids: &[CartItemId],
    ) -> StoreResult<Vec<CartItemSnapshot>> {
        let rows = sqlx::query(
            "SELECT c.id, c.member_id, c.product_id, p.name, p.price, c.quantity
             FROM cart_item c
             JOIN product p ON p.id = c.product_id
             WHERE c.member_id = $1 AND c.id = ANY($2)
             ORDER BY c.id",
        )
        .bind(member_id)
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<CartItemSnapshot> {
                Ok(CartItemSnapshot {
                    cart_item_id: row.try_get("id")?,
                    member_id: row.try_get("member_id")?,
                    product_id: row.try_get("product_id")?,
                    product_name: row.try_get("name")?,
                    unit_price: row.try_get("price")?,
                    quantity: row.try_get("quantity")?,
                })
            })
            .collect()
    }

    async fn remove_by_member_and_ids(
        &mut self,
        member_id: MemberId,
        ids: &[CartItemId],
    ) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cart_item WHERE member_id = $1 AND id = ANY($2)")
            .bind(member_id)
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CouponRepository for PgUnitOfWork {
    async fn find_coupon_by_id(&mut self, id: CouponId) -> StoreResult<Option<CouponDefinition>> {
        let query = format!("SELECT {COUPON_COLUMNS} FROM coupon WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(coupon_from_row).transpose()
    }

    async fn find_all_coupons(&mut self) -> StoreResult<Vec<CouponDefinition>> {
        let query = format!("SELECT {COUPON_COLUMNS} FROM coupon ORDER BY id");
        let rows = sqlx::query(&query).fetch_all(&mut *self.tx).await?;
        rows.iter().map(coupon_from_row).collect()
    }

    async fn find_or_insert_coupon(
        &mut self,
        definition: &NewCouponDefinition,
    ) -> StoreResult<CouponDefinition> {
        sqlx::query(
            "INSERT INTO coupon (name, discount_type, minimum_price, discount_price, discount_rate)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&definition.name)
        .bind(definition.kind.as_str())
        .bind(definition.minimum_price)
        .bind(definition.discount_price)
        .bind(definition.discount_rate)
        .execute(&mut *self.tx)
        .await?;

        let query = format!("SELECT {COUPON_COLUMNS} FROM coupon WHERE name = $1");
        let row = sqlx::query(&query)
            .bind(&definition.name)
            .fetch_one(&mut *self.tx)
            .await?;
        coupon_from_row(&row)
    }
}

#[async_trait]
impl MemberCouponRepository for PgUnitOfWork {
    async fn find_grant(&mut self, grant_id: GrantId) -> StoreResult<Option<MemberCouponGrant>> {
        let query = format!(
            "SELECT {GRANT_COLUMNS}
             FROM member_coupon mc
             JOIN coupon c ON c.id = mc.coupon_id
             WHERE mc.id = $1"
        );
        let row = sqlx::query(&query)
            .bind(grant_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(grant_from_row).transpose()
    }

    async fn find_available_grants_by_member(
        &mut self,
        member_id: MemberId,
    ) -> StoreResult<Vec<MemberCouponGrant>> {
        let query = format!(
            "SELECT {GRANT_COLUMNS}
             FROM member_coupon mc
             JOIN coupon c ON c.id = mc.coupon_id
             WHERE mc.member_id = $1 AND mc.availability
             ORDER BY mc.id"
        );
        let rows = sqlx::query(&query)
            .bind(member_id)
            .fetch_all(&mut *self.tx)
            .await?;
        rows.iter().map(grant_from_row).collect()
    }

    async fn exists_active_grant(
        &mut self,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                SELECT 1 FROM member_coupon
                WHERE member_id = $1 AND coupon_id = $2
                  AND availability AND source_order_id IS NULL
             )",
        )
        .bind(member_id)
        .bind(coupon_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_grant(
        &mut self,
        member_id: MemberId,
        coupon_id: CouponId,
        source_order_id: Option<OrderId>,
    ) -> StoreResult<GrantId> {
        let (id,): (GrantId,) = sqlx::query_as(
            "INSERT INTO member_coupon (member_id, coupon_id, availability, source_order_id)
             VALUES ($1, $2, TRUE, $3)
             RETURNING id",
        )
        .bind(member_id)
        .bind(coupon_id)
        .bind(source_order_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(unique_violation)?;
        Ok(id)
    }

    async fn mark_redeemed(&mut self, grant_id: GrantId) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE member_coupon SET availability = FALSE
             WHERE id = $1 AND availability = TRUE",
        )
        .bind(grant_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_available(&mut self, grant_id: GrantId) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE member_coupon mc SET availability = TRUE
             WHERE mc.id = $1 AND mc.availability = FALSE
               AND (mc.source_order_id IS NOT NULL OR NOT EXISTS (
                    SELECT 1 FROM member_coupon other
                    WHERE other.member_id = mc.member_id
                      AND other.coupon_id = mc.coupon_id
                      AND other.availability
                      AND other.source_order_id IS NULL
                      AND other.id <> mc.id
               ))",
        )
        .bind(grant_id)
        .execute(&mut *self.tx)
        .await
        .map_err(unique_violation)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl OrderRepository for PgUnitOfWork {
    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<OrderId> {
        let (order_id,): (OrderId,) = sqlx::query_as(
            "INSERT INTO orders (member_id, member_coupon_id, original_price, discount_price, confirm_state, ordered_at)
             VALUES ($1, $2, $3, $4, FALSE, $5)
             RETURNING id",
        )
        .bind(order.member_id)
        .bind(order.coupon.grant_id())
        .bind(order.original_price)
        .bind(order.discount_price)
        .bind(order.ordered_at)
        .fetch_one(&mut *self.tx)
        .await?;

        for line in &order.lines {
            sqlx::query(
                "INSERT INTO order_item (order_id, product_id, product_name, unit_price, quantity)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(order_id)
            .bind(line.product_id)
            .bind(&line.product_name)
            .bind(line.unit_price)
            .bind(line.quantity)
            .execute(&mut *self.tx)
            .await?;
        }

        Ok(order_id)
    }

    async fn find_order_by_id_and_member(
        &mut self,
        order_id: OrderId,
        member_id: MemberId,
    ) -> StoreResult<Option<Order>> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 AND member_id = $2");
        let Some(row) = sqlx::query(&query)
            .bind(order_id)
            .bind(member_id)
            .fetch_optional(&mut *self.tx)
            .await?
        else {
            return Ok(None);
        };

        let mut lines = self.lines_by_order(&[order_id]).await?;
        order_from_row(&row, lines.remove(&order_id).unwrap_or_default()).map(Some)
    }

    async fn find_orders_by_member(&mut self, member_id: MemberId) -> StoreResult<Vec<Order>> {
        let query =
            format!("SELECT {ORDER_COLUMNS} FROM orders WHERE member_id = $1 ORDER BY id DESC");
        let rows = sqlx::query(&query)
            .bind(member_id)
            .fetch_all(&mut *self.tx)
            .await?;

        let ids = rows
            .iter()
            .map(|row| row.try_get::<OrderId, _>("id"))
            .collect::<Result<Vec<_>, _>>()?;
        let mut lines = self.lines_by_order(&ids).await?;

        rows.iter()
            .zip(ids)
            .map(|(row, id)| order_from_row(row, lines.remove(&id).unwrap_or_default()))
            .collect()
    }

    async fn delete_placed_order(&mut self, order_id: OrderId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1 AND confirm_state = FALSE")
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_confirmed(&mut self, order_id: OrderId) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET confirm_state = TRUE WHERE id = $1 AND confirm_state = FALSE",
        )
        .bind(order_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
