//! In-memory store.
//!
//! A unit of work takes the store lock for its whole life and mutates a
//! staged copy of the state. `commit` publishes the copy; rollback or drop
//! throws it away. Units of work are therefore fully serialized, which is
//! stricter than the Postgres backend but gives the same observable
//! outcomes for the conditional writes the ledger relies on.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::domain::coupon::{CouponDefinition, MemberCouponGrant, NewCouponDefinition};
use crate::domain::order::{CartItemSnapshot, ConfirmState, NewOrder, Order};
use crate::domain::{CartItemId, CouponId, GrantId, MemberId, OrderId, ProductId};

use super::{
    CartItemRepository, CouponRepository, MemberCouponRepository, OrderRepository, Store,
    StoreError, StoreResult, UnitOfWork,
};

#[derive(Debug, Clone)]
struct ProductRow {
    name: String,
    price: i64,
}

#[derive(Debug, Clone)]
struct CartItemRow {
    member_id: MemberId,
    product_id: ProductId,
    quantity: i32,
}

#[derive(Debug, Clone)]
struct GrantRow {
    member_id: MemberId,
    coupon_id: CouponId,
    available: bool,
    source_order_id: Option<OrderId>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    products: BTreeMap<ProductId, ProductRow>,
    cart_items: BTreeMap<CartItemId, CartItemRow>,
    coupons: BTreeMap<CouponId, CouponDefinition>,
    grants: BTreeMap<GrantId, GrantRow>,
    orders: BTreeMap<OrderId, Order>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn grant(&self, grant_id: GrantId) -> StoreResult<Option<MemberCouponGrant>> {
        let Some(row) = self.grants.get(&grant_id) else {
            return Ok(None);
        };
        let coupon = self.coupons.get(&row.coupon_id).cloned().ok_or_else(|| {
            StoreError::Corrupt(format!(
                "grant {grant_id} references missing coupon {}",
                row.coupon_id
            ))
        })?;

        Ok(Some(MemberCouponGrant {
            id: grant_id,
            member_id: row.member_id,
            coupon,
            available: row.available,
            source_order_id: row.source_order_id,
        }))
    }

    /// Mirrors the partial unique index on available, non-bonus grants.
    fn has_other_active_grant(
        &self,
        member_id: MemberId,
        coupon_id: CouponId,
        except: Option<GrantId>,
    ) -> bool {
        self.grants.iter().any(|(id, row)| {
            Some(*id) != except
                && row.member_id == member_id
                && row.coupon_id == coupon_id
                && row.available
                && row.source_order_id.is_none()
        })
    }
}

/// Process-local store, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_product(&self, name: &str, price: i64) -> ProductId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.products.insert(
            id,
            ProductRow {
                name: name.to_string(),
                price,
            },
        );
        id
    }

    pub async fn add_cart_item(
        &self,
        member_id: MemberId,
        product_id: ProductId,
        quantity: i32,
    ) -> CartItemId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.cart_items.insert(
            id,
            CartItemRow {
                member_id,
                product_id,
                quantity,
            },
        );
        id
    }

    pub async fn add_coupon(&self, definition: NewCouponDefinition) -> CouponDefinition {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let coupon = definition.with_id(id);
        state.coupons.insert(id, coupon.clone());
        coupon
    }

    /// Seeds an available grant without going through the duplicate guard.
    pub async fn add_grant(&self, member_id: MemberId, coupon_id: CouponId) -> GrantId {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        state.grants.insert(
            id,
            GrantRow {
                member_id,
                coupon_id,
                available: true,
                source_order_id: None,
            },
        );
        id
    }

    /// Committed view of a grant.
    pub async fn grant(&self, grant_id: GrantId) -> StoreResult<Option<MemberCouponGrant>> {
        self.state.lock().await.grant(grant_id)
    }

    /// Committed cart entry ids of a member, ascending.
    pub async fn cart_item_ids(&self, member_id: MemberId) -> Vec<CartItemId> {
        self.state
            .lock()
            .await
            .cart_items
            .iter()
            .filter(|(_, row)| row.member_id == member_id)
            .map(|(id, _)| *id)
            .collect()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Work = MemoryUnitOfWork;

    async fn begin(&self) -> StoreResult<MemoryUnitOfWork> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(MemoryUnitOfWork { guard, staged })
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(mut self) -> StoreResult<()> {
        *self.guard = self.staged;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CartItemRepository for MemoryUnitOfWork {
    async fn find_snapshots_by_ids_and_member(
        &mut self,
        member_id: MemberId,
        ids: &[CartItemId],
    ) -> StoreResult<Vec<CartItemSnapshot>> {
        let state = &self.staged;
        let mut snapshots = Vec::with_capacity(ids.len());

        for (id, row) in &state.cart_items {
            if row.member_id != member_id || !ids.contains(id) {
                continue;
            }
            let product = state.products.get(&row.product_id).ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "cart item {id} references missing product {}",
                    row.product_id
                ))
            })?;
            snapshots.push(CartItemSnapshot {
                cart_item_id: *id,
                member_id,
                product_id: row.product_id,
                product_name: product.name.clone(),
                unit_price: product.price,
                quantity: row.quantity,
            });
        }

        Ok(snapshots)
    }

    async fn remove_by_member_and_ids(
        &mut self,
        member_id: MemberId,
        ids: &[CartItemId],
    ) -> StoreResult<u64> {
        let before = self.staged.cart_items.len();
        self.staged
            .cart_items
            .retain(|id, row| !(row.member_id == member_id && ids.contains(id)));
        Ok((before - self.staged.cart_items.len()) as u64)
    }
}

#[async_trait]
impl CouponRepository for MemoryUnitOfWork {
    async fn find_coupon_by_id(&mut self, id: CouponId) -> StoreResult<Option<CouponDefinition>> {
        Ok(self.staged.coupons.get(&id).cloned())
    }

    async fn find_all_coupons(&mut self) -> StoreResult<Vec<CouponDefinition>> {
        Ok(self.staged.coupons.values().cloned().collect())
    }

    async fn find_or_insert_coupon(
        &mut self,
        definition: &NewCouponDefinition,
    ) -> StoreResult<CouponDefinition> {
        if let Some(existing) = self
            .staged
            .coupons
            .values()
            .find(|coupon| coupon.name == definition.name)
        {
            return Ok(existing.clone());
        }

        let id = self.staged.next_id();
        let coupon = definition.clone().with_id(id);
        self.staged.coupons.insert(id, coupon.clone());
        Ok(coupon)
    }
}

#[async_trait]
impl MemberCouponRepository for MemoryUnitOfWork {
    async fn find_grant(&mut self, grant_id: GrantId) -> StoreResult<Option<MemberCouponGrant>> {
        self.staged.grant(grant_id)
    }

    async fn find_available_grants_by_member(
        &mut self,
        member_id: MemberId,
    ) -> StoreResult<Vec<MemberCouponGrant>> {
        let ids: Vec<GrantId> = self
            .staged
            .grants
            .iter()
            .filter(|(_, row)| row.member_id == member_id && row.available)
            .map(|(id, _)| *id)
            .collect();

        let mut grants = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(grant) = self.staged.grant(id)? {
                grants.push(grant);
            }
        }
        Ok(grants)
    }

    async fn exists_active_grant(
        &mut self,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> StoreResult<bool> {
        Ok(self.staged.has_other_active_grant(member_id, coupon_id, None))
    }

    async fn insert_grant(
        &mut self,
        member_id: MemberId,
        coupon_id: CouponId,
        source_order_id: Option<OrderId>,
    ) -> StoreResult<GrantId> {
        match source_order_id {
            None if self.staged.has_other_active_grant(member_id, coupon_id, None) => {
                return Err(StoreError::UniqueViolation(
                    "member_coupon_active_unique".to_string(),
                ));
            }
            Some(order_id)
                if self
                    .staged
                    .grants
                    .values()
                    .any(|row| row.source_order_id == Some(order_id)) =>
            {
                return Err(StoreError::UniqueViolation(
                    "member_coupon_source_order_unique".to_string(),
                ));
            }
            _ => {}
        }

        let id = self.staged.next_id();
        self.staged.grants.insert(
            id,
            GrantRow {
                member_id,
                coupon_id,
                available: true,
                source_order_id,
            },
        );
        Ok(id)
    }

    async fn mark_redeemed(&mut self, grant_id: GrantId) -> StoreResult<bool> {
        match self.staged.grants.get_mut(&grant_id) {
            Some(row) if row.available => {
                row.available = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_available(&mut self, grant_id: GrantId) -> StoreResult<bool> {
        let Some(row) = self.staged.grants.get(&grant_id) else {
            return Ok(false);
        };
        if row.available {
            return Ok(false);
        }
        if row.source_order_id.is_none()
            && self
                .staged
                .has_other_active_grant(row.member_id, row.coupon_id, Some(grant_id))
        {
            return Ok(false);
        }

        if let Some(row) = self.staged.grants.get_mut(&grant_id) {
            row.available = true;
        }
        Ok(true)
    }
}

#[async_trait]
impl OrderRepository for MemoryUnitOfWork {
    async fn insert_order(&mut self, order: &NewOrder) -> StoreResult<OrderId> {
        let id = self.staged.next_id();
        self.staged.orders.insert(id, order.clone().with_id(id));
        Ok(id)
    }

    async fn find_order_by_id_and_member(
        &mut self,
        order_id: OrderId,
        member_id: MemberId,
    ) -> StoreResult<Option<Order>> {
        Ok(self
            .staged
            .orders
            .get(&order_id)
            .filter(|order| order.member_id == member_id)
            .cloned())
    }

    async fn find_orders_by_member(&mut self, member_id: MemberId) -> StoreResult<Vec<Order>> {
        Ok(self
            .staged
            .orders
            .values()
            .rev()
            .filter(|order| order.member_id == member_id)
            .cloned()
            .collect())
    }

    async fn delete_placed_order(&mut self, order_id: OrderId) -> StoreResult<bool> {
        match self.staged.orders.get(&order_id) {
            Some(order) if order.confirm_state == ConfirmState::Placed => {
                self.staged.orders.remove(&order_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_confirmed(&mut self, order_id: OrderId) -> StoreResult<bool> {
        match self.staged.orders.get_mut(&order_id) {
            Some(order) if order.confirm_state == ConfirmState::Placed => {
                order.confirm_state = ConfirmState::Confirmed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
