use chrono::Utc;
use std::collections::BTreeSet;

use crate::domain::coupon::{CouponError, CouponLedger, CouponUsage, DiscountPolicy};
use crate::domain::{CartItemId, GrantId, MemberId};
use crate::storage::UnitOfWork;

use super::errors::OrderError;
use super::value_objects::{CartItemSnapshot, NewOrder, Order, OrderLine};

// ============================================================================
// Order Aggregate - placement
// ============================================================================
//
// Placement runs inside one unit of work:
//   snapshots -> subtotal -> coupon (find, price, redeem) -> order insert
//   -> cart removal
// Nothing is visible to other requests until the caller commits.
//
// ============================================================================

pub struct OrderAggregate<'a> {
    ledger: &'a CouponLedger,
}

/// Sum of `unit_price * quantity` over the snapshots. Fails instead of
/// wrapping when the total does not fit in an i64.
pub fn subtotal(snapshots: &[CartItemSnapshot]) -> Result<i64, OrderError> {
    snapshots
        .iter()
        .try_fold(0i64, |total, snapshot| {
            snapshot.line_total().and_then(|line| total.checked_add(line))
        })
        .ok_or_else(|| {
            OrderError::SubtotalOverflow(snapshots.iter().map(|s| s.cart_item_id).collect())
        })
}

/// Deduplicated selection, rejecting an empty one.
pub fn validate_selection(selected: &[CartItemId]) -> Result<Vec<CartItemId>, OrderError> {
    if selected.is_empty() {
        return Err(OrderError::EmptySelection);
    }
    let unique: BTreeSet<CartItemId> = selected.iter().copied().collect();
    Ok(unique.into_iter().collect())
}

impl<'a> OrderAggregate<'a> {
    pub fn new(ledger: &'a CouponLedger) -> Self {
        Self { ledger }
    }

    pub async fn place<W: UnitOfWork>(
        &self,
        work: &mut W,
        member_id: MemberId,
        selected: &[CartItemId],
        coupon: Option<GrantId>,
    ) -> Result<Order, OrderError> {
        let selected = validate_selection(selected)?;

        let snapshots = work
            .find_snapshots_by_ids_and_member(member_id, &selected)
            .await?;
        if snapshots.len() != selected.len() {
            let found: BTreeSet<CartItemId> = snapshots.iter().map(|s| s.cart_item_id).collect();
            let missing: Vec<CartItemId> = selected
                .iter()
                .copied()
                .filter(|id| !found.contains(id))
                .collect();
            return Err(OrderError::CartItemNotOwned(missing));
        }

        let original_price = subtotal(&snapshots)?;

        let (usage, discount_price) = match coupon {
            None => (CouponUsage::NoCoupon, DiscountPolicy::Empty.apply(original_price)?),
            Some(grant_id) => {
                let discount = self
                    .redeem_for(work, member_id, grant_id, original_price)
                    .await?;
                (CouponUsage::Applied(grant_id), discount)
            }
        };

        let new_order = NewOrder {
            member_id,
            lines: snapshots.into_iter().map(OrderLine::from).collect(),
            coupon: usage,
            original_price,
            discount_price,
            ordered_at: Utc::now(),
        };

        let order_id = work.insert_order(&new_order).await?;

        // A concurrent placement may have taken the same entries since the
        // snapshot read. Each cart entry backs at most one order.
        let removed = work.remove_by_member_and_ids(member_id, &selected).await?;
        if removed != selected.len() as u64 {
            tracing::warn!(
                member_id,
                removed,
                selected = selected.len(),
                "Cart items were taken by another request"
            );
            return Err(OrderError::CartItemNotOwned(selected));
        }

        tracing::debug!(
            order_id,
            member_id,
            original_price,
            discount_price,
            "Order assembled"
        );

        Ok(new_order.with_id(order_id))
    }

    /// Prices the order with the grant and spends it. An inapplicable coupon
    /// fails before any ledger write.
    async fn redeem_for<W: UnitOfWork>(
        &self,
        work: &mut W,
        member_id: MemberId,
        grant_id: GrantId,
        subtotal: i64,
    ) -> Result<i64, OrderError> {
        let grant = match self
            .ledger
            .find_redeemable_grant(work, member_id, grant_id)
            .await?
        {
            Some(grant) => grant,
            None => {
                // Spent grants of this member are a conflict, anything else is unknown.
                return match self.ledger.find_member_grant(work, member_id, grant_id).await? {
                    Some(_) => Err(OrderError::CouponUnavailable(grant_id)),
                    None => Err(OrderError::CouponNotFound(grant_id)),
                };
            }
        };

        let discount = grant.coupon.discount_for(subtotal)?;

        match self.ledger.redeem(work, grant_id).await {
            Ok(()) => Ok(discount),
            Err(CouponError::AlreadyRedeemed(id)) => Err(OrderError::CouponUnavailable(id)),
            Err(other) => Err(other.into()),
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::coupon::{DiscountKind, NewCouponDefinition};
    use crate::storage::interleaved::{InterleavedWork, Interleaving};
    use crate::storage::{MemoryStore, OrderRepository, Store, UnitOfWork};

    fn snapshot(unit_price: i64, quantity: i32) -> CartItemSnapshot {
        CartItemSnapshot {
            cart_item_id: 1,
            member_id: 1,
            product_id: 1,
            product_name: "item".to_string(),
            unit_price,
            quantity,
        }
    }

    async fn cart(store: &MemoryStore, member_id: MemberId, prices: &[i64]) -> Vec<CartItemId> {
        let mut ids = Vec::new();
        for (i, price) in prices.iter().enumerate() {
            let product = store.add_product(&format!("product-{i}"), *price).await;
            ids.push(store.add_cart_item(member_id, product, 1).await);
        }
        ids
    }

    async fn deduction_grant(store: &MemoryStore, member_id: MemberId) -> GrantId {
        let coupon = store
            .add_coupon(NewCouponDefinition {
                name: "1000 off over 5000".to_string(),
                kind: DiscountKind::Deduction,
                minimum_price: 5000,
                discount_price: 1000,
                discount_rate: 0.0,
            })
            .await;
        store.add_grant(member_id, coupon.id).await
    }

    #[test]
    fn test_subtotal_sums_lines() {
        assert_eq!(subtotal(&[snapshot(1000, 1), snapshot(100, 1)]).unwrap(), 1100);
        assert_eq!(subtotal(&[snapshot(250, 4)]).unwrap(), 1000);
        assert_eq!(subtotal(&[]).unwrap(), 0);
    }

    #[test]
    fn test_subtotal_overflow_is_an_error() {
        let err = subtotal(&[snapshot(i64::MAX / 2, 3)]).unwrap_err();
        assert!(matches!(err, OrderError::SubtotalOverflow(ref ids) if ids == &vec![1]));

        let err = subtotal(&[snapshot(i64::MAX, 1), snapshot(1, 1)]).unwrap_err();
        assert!(matches!(err, OrderError::SubtotalOverflow(_)));
    }

    #[test]
    fn test_validate_selection() {
        assert!(matches!(validate_selection(&[]), Err(OrderError::EmptySelection)));
        assert_eq!(validate_selection(&[3, 1, 3]).unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_place_without_coupon() {
        let store = MemoryStore::new();
        let ids = cart(&store, 1, &[1000, 100]).await;
        let ledger = CouponLedger::default();
        let mut work = store.begin().await.unwrap();

        let order = OrderAggregate::new(&ledger)
            .place(&mut work, 1, &ids, None)
            .await
            .unwrap();
        work.commit().await.unwrap();

        assert_eq!(order.original_price, 1100);
        assert_eq!(order.discount_price, 0);
        assert_eq!(order.final_price(), 1100);
        assert_eq!(order.coupon, CouponUsage::NoCoupon);
        assert_eq!(order.lines.len(), 2);
        assert!(store.cart_item_ids(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_place_with_deduction_coupon() {
        let store = MemoryStore::new();
        let ids = cart(&store, 1, &[3000, 2000]).await;
        let grant = deduction_grant(&store, 1).await;
        let ledger = CouponLedger::default();
        let mut work = store.begin().await.unwrap();

        let order = OrderAggregate::new(&ledger)
            .place(&mut work, 1, &ids, Some(grant))
            .await
            .unwrap();
        work.commit().await.unwrap();

        assert_eq!(order.original_price, 5000);
        assert_eq!(order.discount_price, 1000);
        assert_eq!(order.final_price(), 4000);
        assert_eq!(order.coupon, CouponUsage::Applied(grant));
        assert!(!store.grant(grant).await.unwrap().unwrap().available);
    }

    #[tokio::test]
    async fn test_place_rejects_items_of_other_member() {
        let store = MemoryStore::new();
        let mine = cart(&store, 1, &[1000]).await;
        let theirs = cart(&store, 2, &[500]).await;
        let ledger = CouponLedger::default();
        let mut work = store.begin().await.unwrap();

        let selected = [mine[0], theirs[0]];
        let err = OrderAggregate::new(&ledger)
            .place(&mut work, 1, &selected, None)
            .await
            .unwrap_err();

        assert!(
            matches!(err, OrderError::CartItemNotOwned(ref missing) if missing == &vec![theirs[0]])
        );
    }

    #[tokio::test]
    async fn test_place_below_minimum_leaves_grant_untouched() {
        let store = MemoryStore::new();
        let ids = cart(&store, 1, &[4999]).await;
        let grant = deduction_grant(&store, 1).await;
        let ledger = CouponLedger::default();
        let mut work = store.begin().await.unwrap();

        let err = OrderAggregate::new(&ledger)
            .place(&mut work, 1, &ids, Some(grant))
            .await
            .unwrap_err();
        work.rollback().await.unwrap();

        assert!(matches!(err, OrderError::Coupon(CouponError::NotApplicable { .. })));
        assert!(store.grant(grant).await.unwrap().unwrap().available);
        assert_eq!(store.cart_item_ids(1).await, ids);
    }

    #[tokio::test]
    async fn test_place_with_foreign_coupon_is_not_found() {
        let store = MemoryStore::new();
        let ids = cart(&store, 1, &[6000]).await;
        let grant = deduction_grant(&store, 2).await;
        let ledger = CouponLedger::default();
        let mut work = store.begin().await.unwrap();

        let err = OrderAggregate::new(&ledger)
            .place(&mut work, 1, &ids, Some(grant))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::CouponNotFound(id) if id == grant));
    }

    #[tokio::test]
    async fn test_place_with_spent_coupon_is_unavailable() {
        let store = MemoryStore::new();
        let first = cart(&store, 1, &[6000]).await;
        let second = cart(&store, 1, &[7000]).await;
        let grant = deduction_grant(&store, 1).await;
        let ledger = CouponLedger::default();
        let aggregate = OrderAggregate::new(&ledger);
        let mut work = store.begin().await.unwrap();

        aggregate.place(&mut work, 1, &first, Some(grant)).await.unwrap();
        let err = aggregate
            .place(&mut work, 1, &second, Some(grant))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::CouponUnavailable(id) if id == grant));
    }

    #[tokio::test]
    async fn test_place_overflowing_total_fails_cleanly() {
        let store = MemoryStore::new();
        let product = store.add_product("gold bar", i64::MAX / 2).await;
        let item = store.add_cart_item(1, product, 3).await;
        let ledger = CouponLedger::default();
        let mut work = store.begin().await.unwrap();

        let err = OrderAggregate::new(&ledger)
            .place(&mut work, 1, &[item], None)
            .await
            .unwrap_err();
        work.rollback().await.unwrap();

        assert!(matches!(err, OrderError::SubtotalOverflow(_)));
        assert_eq!(store.cart_item_ids(1).await, vec![item]);
        assert_eq!(store.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_place_fails_when_cart_taken_after_snapshot() {
        let store = MemoryStore::new();
        let ids = cart(&store, 1, &[3000, 2000]).await;
        let grant = deduction_grant(&store, 1).await;
        let ledger = CouponLedger::default();
        let inner = store.begin().await.unwrap();
        let mut work = InterleavedWork::new(inner, Interleaving::CartTakenAfterSnapshot);

        let err = OrderAggregate::new(&ledger)
            .place(&mut work, 1, &ids, Some(grant))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::CartItemNotOwned(ref taken) if taken == &ids));
        assert_eq!(work.find_orders_by_member(1).await.unwrap().len(), 1);
        work.rollback().await.unwrap();

        // Nothing of the losing placement survives the rollback.
        assert_eq!(store.order_count().await, 0);
        assert_eq!(store.cart_item_ids(1).await, ids);
        assert!(store.grant(grant).await.unwrap().unwrap().available);
    }
}
