//! Test-only unit of work that lets a simulated competing request write
//! between two steps of a domain operation. Stands in for the Postgres
//! READ COMMITTED interleavings the serialized memory store never produces.

use async_trait::async_trait;

use crate::domain::coupon::{CouponDefinition, MemberCouponGrant, NewCouponDefinition};
use crate::domain::order::{CartItemSnapshot, NewOrder, Order};
use crate::domain::{CartItemId, CouponId, GrantId, MemberId, OrderId};

use super::{
    CartItemRepository, CouponRepository, MemberCouponRepository, MemoryUnitOfWork,
    OrderRepository, StoreResult, UnitOfWork,
};

/// The competing write, fired once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interleaving {
    /// The snapshotted cart items are removed right after they are read.
    CartTakenAfterSnapshot,
    /// The order is deleted right after it is loaded.
    OrderDeletedAfterLoad,
}

pub(crate) struct InterleavedWork {
    inner: MemoryUnitOfWork,
    pending: Option<Interleaving>,
}

impl InterleavedWork {
    pub(crate) fn new(inner: MemoryUnitOfWork, interleaving: Interleaving) -> Self {
        Self {
            inner,
            pending: Some(interleaving),
        }
    }

    fn fire(&mut self, interleaving: Interleaving) -> bool {
        if self.pending == Some(interleaving) {
            self.pending = None;
            true
        } else {
            false
        }
    }
}

#[async_trait]
impl UnitOfWork for InterleavedWork {
    async fn commit(self) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self) -> StoreResult<()> {
        self.inner.rollback().await
    }
}

#[async_trait]
impl CartItemRepository for InterleavedWork {
    async fn find_snapshots_by_ids_and_member(
        &mut self,
        member_id: MemberId,
        ids: &[CartItemId],
    ) -> StoreResult<Vec<CartItemSnapshot>> {
        let snapshots = self
            .inner
            .find_snapshots_by_ids_and_member(member_id, ids)
            .await?;
        if self.fire(Interleaving::CartTakenAfterSnapshot) {
            self.inner.remove_by_member_and_ids(member_id, ids).await?;
        }
        Ok(snapshots)
    }

    async fn remove_by_member_and_ids(
        &mut self,
        member_id: MemberId,
        ids: &[CartItemId],
    ) -> StoreResult<u64> {
        self.inner.remove_by_member_and_ids(member_id, ids).await
    }
}

#[async_trait]
impl CouponRepository for InterleavedWork {
    async fn find_coupon_by_id(&mut self, id: CouponId) -> StoreResult<Option<CouponDefinition>> {
        self.inner.find_coupon_by_id(id).await
    }

    async fn find_all_coupons(&mut self) -> StoreResult<Vec<CouponDefinition>> {
        self.inner.find_all_coupons().await
    }

    async fn find_or_insert_coupon(
        &mut self,
        definition: &NewCouponDefinition,
    ) -> StoreResult<CouponDefinition> {
        self.inner.find_or_insert_coupon(definition).await
    }
}

#[async_trait]
impl MemberCouponRepository for InterleavedWork {
    async fn find_grant(&mut self, grant_id: GrantId) -> StoreResult<Option<MemberCouponGrant>> {
        self.inner.find_grant(grant_id).await
    }

    async fn find_available_grants_by_member(
        &mut self,
        member_id: MemberId,
    ) -> StoreResult<Vec<MemberCouponGrant>> {
        self.inner.find_available_grants_by_member(member_id).await
    }

    async fn exists_active_grant(
        &mut self,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> StoreResult<bool> {
        self.inner.exists_active_grant(member_id, coupon_id).await
    }

    async fn insert_grant(
        &mut self,
        member_id: MemberId,
        coupon_id: CouponId,
        source_order_id: Option<OrderId>,
    ) -> StoreResult<GrantId> {
        self.inner
            .insert_grant(member_id, coupon_id, source_order_id)
            .await
    }

    async fn mark_redeemed(&mut self, grant_id: GrantId) -> StoreResult<bool> {
        self.inner.mark_redeemed(grant_id).await
    }

    async fn mark_available(&mut self, grant_id: GrantId) -> StoreResult<bool> {
        self.inner.mark_available(grant_id).await
    }
}

#[async_trait]
impl OrderRepository for InterleavedWork {
    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<OrderId> {
        self.inner.insert_order(order).await
    }

    async fn find_order_by_id_and_member(
        &mut self,
        order_id: OrderId,
        member_id: MemberId,
    ) -> StoreResult<Option<Order>> {
        let order = self
            .inner
            .find_order_by_id_and_member(order_id, member_id)
            .await?;
        if order.is_some() && self.fire(Interleaving::OrderDeletedAfterLoad) {
            self.inner.delete_placed_order(order_id).await?;
        }
        Ok(order)
    }

    async fn find_orders_by_member(&mut self, member_id: MemberId) -> StoreResult<Vec<Order>> {
        self.inner.find_orders_by_member(member_id).await
    }

    async fn delete_placed_order(&mut self, order_id: OrderId) -> StoreResult<bool> {
        self.inner.delete_placed_order(order_id).await
    }

    async fn mark_confirmed(&mut self, order_id: OrderId) -> StoreResult<bool> {
        self.inner.mark_confirmed(order_id).await
    }
}
