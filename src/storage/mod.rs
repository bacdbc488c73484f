// ============================================================================
// Storage - repository seams and units of work
// ============================================================================
//
// The domain only sees the repository traits below. A `Store` hands out a
// `UnitOfWork`, which implements every repository against one transaction:
// everything done through it becomes visible on `commit` and is discarded
// on `rollback` or drop.
//
// Backends:
// - postgres: sqlx `PgPool` + `Transaction<Postgres>`
// - memory:   whole-store lock held for the life of the unit of work
//
// ============================================================================

pub mod memory;
pub mod postgres;

#[cfg(test)]
pub(crate) mod interleaved;

use async_trait::async_trait;

use crate::domain::coupon::{CouponDefinition, MemberCouponGrant, NewCouponDefinition};
use crate::domain::order::{CartItemSnapshot, NewOrder, Order};
use crate::domain::{CartItemId, CouponId, GrantId, MemberId, OrderId};

pub use memory::{MemoryStore, MemoryUnitOfWork};
pub use postgres::{PgStore, PgUnitOfWork};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Live shopping cart, read at placement time.
#[async_trait]
pub trait CartItemRepository: Send {
    /// Snapshots of the cart entries in `ids` that belong to `member_id`.
    /// Entries owned by someone else are simply not returned.
    async fn find_snapshots_by_ids_and_member(
        &mut self,
        member_id: MemberId,
        ids: &[CartItemId],
    ) -> StoreResult<Vec<CartItemSnapshot>>;

    async fn remove_by_member_and_ids(
        &mut self,
        member_id: MemberId,
        ids: &[CartItemId],
    ) -> StoreResult<u64>;
}

/// Coupon reference data.
#[async_trait]
pub trait CouponRepository: Send {
    async fn find_coupon_by_id(&mut self, id: CouponId) -> StoreResult<Option<CouponDefinition>>;

    async fn find_all_coupons(&mut self) -> StoreResult<Vec<CouponDefinition>>;

    /// Returns the definition with the same name, creating it if missing.
    async fn find_or_insert_coupon(
        &mut self,
        definition: &NewCouponDefinition,
    ) -> StoreResult<CouponDefinition>;
}

/// Backing store of the coupon ledger. Only `CouponLedger` should call the
/// mutating methods.
#[async_trait]
pub trait MemberCouponRepository: Send {
    async fn find_grant(&mut self, grant_id: GrantId) -> StoreResult<Option<MemberCouponGrant>>;

    async fn find_available_grants_by_member(
        &mut self,
        member_id: MemberId,
    ) -> StoreResult<Vec<MemberCouponGrant>>;

    /// Whether the member holds an available, non-bonus grant of the coupon.
    async fn exists_active_grant(
        &mut self,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> StoreResult<bool>;

    /// Inserts an available grant. Fails with `UniqueViolation` when the
    /// member already holds an active grant of the coupon, or when a bonus
    /// grant for `source_order_id` exists.
    async fn insert_grant(
        &mut self,
        member_id: MemberId,
        coupon_id: CouponId,
        source_order_id: Option<OrderId>,
    ) -> StoreResult<GrantId>;

    /// Conditional availability flip true -> false.
    /// Returns false when the grant was not available.
    async fn mark_redeemed(&mut self, grant_id: GrantId) -> StoreResult<bool>;

    /// Availability flip false -> true, skipped when the member already holds
    /// another active grant of the same coupon. Returns whether a row changed.
    async fn mark_available(&mut self, grant_id: GrantId) -> StoreResult<bool>;
}

#[async_trait]
pub trait OrderRepository: Send {
    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<OrderId>;

    async fn find_order_by_id_and_member(
        &mut self,
        order_id: OrderId,
        member_id: MemberId,
    ) -> StoreResult<Option<Order>>;

    /// All orders of the member, newest (largest id) first.
    async fn find_orders_by_member(&mut self, member_id: MemberId) -> StoreResult<Vec<Order>>;

    /// Deletes the order only while it is still PLACED.
    async fn delete_placed_order(&mut self, order_id: OrderId) -> StoreResult<bool>;

    /// Conditional PLACED -> CONFIRMED. Returns false if already confirmed
    /// or missing.
    async fn mark_confirmed(&mut self, order_id: OrderId) -> StoreResult<bool>;
}

/// One transactional scope over every repository.
#[async_trait]
pub trait UnitOfWork:
    CartItemRepository + CouponRepository + MemberCouponRepository + OrderRepository + Sized
{
    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}

#[async_trait]
pub trait Store: Send + Sync {
    type Work: UnitOfWork;

    async fn begin(&self) -> StoreResult<Self::Work>;
}
