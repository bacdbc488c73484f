use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::coupon::{CouponLedger, CouponSummary, CouponUsage, RestoreOutcome};
use crate::domain::order::{
    Cancellation, Order, OrderAggregate, OrderDetail, OrderError, OrderLifecycle, OrderSummary,
};
use crate::domain::{CartItemId, GrantId, MemberId, OrderId};
use crate::error::ServiceResult;
use crate::metrics::Metrics;
use crate::storage::{MemberCouponRepository, OrderRepository, Store};

use super::{finish, observe};

/// Place / cancel / confirm orders, each in its own unit of work.
pub struct OrderService<S: Store> {
    store: S,
    ledger: CouponLedger,
    metrics: Option<Arc<Metrics>>,
}

impl<S: Store> OrderService<S> {
    pub fn new(store: S, ledger: CouponLedger) -> Self {
        Self {
            store,
            ledger,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Turns the selected cart items into an order, optionally spending one
    /// coupon grant. Returns the new order id.
    pub async fn place_order(
        &self,
        member_id: MemberId,
        selected: &[CartItemId],
        coupon: Option<GrantId>,
    ) -> ServiceResult<OrderId> {
        let span = tracing::info_span!(
            "place_order",
            request_id = %Uuid::new_v4(),
            member_id,
            grant_id = ?coupon
        );
        let started = Instant::now();

        let result = self
            .place_in_unit(member_id, selected, coupon)
            .instrument(span)
            .await;

        if let (Ok(order), Some(metrics)) = (&result, &self.metrics) {
            metrics.orders_placed.inc();
            if order.coupon != CouponUsage::NoCoupon {
                metrics.coupons_redeemed.inc();
            }
        }
        let result = result.map(|order| order.id);
        observe(self.metrics.as_deref(), "place_order", started, &result);
        result
    }

    async fn place_in_unit(
        &self,
        member_id: MemberId,
        selected: &[CartItemId],
        coupon: Option<GrantId>,
    ) -> ServiceResult<Order> {
        let mut work = self.store.begin().await?;
        let outcome = OrderAggregate::new(&self.ledger)
            .place(&mut work, member_id, selected, coupon)
            .await;
        let order = finish(work, outcome).await?;

        tracing::info!(
            order_id = order.id,
            items = order.lines.len(),
            final_price = order.final_price(),
            "✅ Order placed"
        );
        Ok(order)
    }

    /// Deletes a PLACED order and gives its coupon back.
    pub async fn cancel_order(&self, member_id: MemberId, order_id: OrderId) -> ServiceResult<()> {
        let span = tracing::info_span!(
            "cancel_order",
            request_id = %Uuid::new_v4(),
            member_id,
            order_id
        );
        let started = Instant::now();

        let result = self
            .cancel_in_unit(member_id, order_id)
            .instrument(span)
            .await;

        if let (Ok(cancellation), Some(metrics)) = (&result, &self.metrics) {
            metrics.orders_cancelled.inc();
            if cancellation.restored == Some(RestoreOutcome::Restored) {
                metrics.coupons_restored.inc();
            }
        }
        let result = result.map(|_| ());
        observe(self.metrics.as_deref(), "cancel_order", started, &result);
        result
    }

    async fn cancel_in_unit(
        &self,
        member_id: MemberId,
        order_id: OrderId,
    ) -> ServiceResult<Cancellation> {
        let mut work = self.store.begin().await?;
        let outcome = OrderLifecycle::new(&self.ledger)
            .cancel(&mut work, order_id, member_id)
            .await;
        let cancellation = finish(work, outcome).await?;

        tracing::info!(restored = ?cancellation.restored, "Order cancelled");
        Ok(cancellation)
    }

    /// Confirms a PLACED order. Returns the bonus coupon granted for it.
    pub async fn confirm_order(
        &self,
        member_id: MemberId,
        order_id: OrderId,
    ) -> ServiceResult<CouponSummary> {
        let span = tracing::info_span!(
            "confirm_order",
            request_id = %Uuid::new_v4(),
            member_id,
            order_id
        );
        let started = Instant::now();

        let result = self
            .confirm_in_unit(member_id, order_id)
            .instrument(span)
            .await;

        if let (Ok(_), Some(metrics)) = (&result, &self.metrics) {
            metrics.orders_confirmed.inc();
            metrics.bonus_coupons_issued.inc();
        }
        observe(self.metrics.as_deref(), "confirm_order", started, &result);
        result
    }

    async fn confirm_in_unit(
        &self,
        member_id: MemberId,
        order_id: OrderId,
    ) -> ServiceResult<CouponSummary> {
        let mut work = self.store.begin().await?;
        let outcome = OrderLifecycle::new(&self.ledger)
            .confirm(&mut work, order_id, member_id)
            .await;
        let (_, bonus) = finish(work, outcome).await?;

        tracing::info!(bonus_grant_id = bonus.id, "✅ Order confirmed");
        Ok(CouponSummary::from(&bonus))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The member's orders, newest first.
    pub async fn list_orders(&self, member_id: MemberId) -> ServiceResult<Vec<OrderSummary>> {
        let span = tracing::debug_span!("list_orders", request_id = %Uuid::new_v4(), member_id);
        let started = Instant::now();

        let result = self.list_in_unit(member_id).instrument(span).await;

        observe(self.metrics.as_deref(), "list_orders", started, &result);
        result
    }

    async fn list_in_unit(&self, member_id: MemberId) -> ServiceResult<Vec<OrderSummary>> {
        let mut work = self.store.begin().await?;
        let outcome = work.find_orders_by_member(member_id).await;
        let orders = finish(work, outcome).await?;
        Ok(orders.iter().map(OrderSummary::from).collect())
    }

    pub async fn get_order(
        &self,
        member_id: MemberId,
        order_id: OrderId,
    ) -> ServiceResult<OrderDetail> {
        let span = tracing::debug_span!(
            "get_order",
            request_id = %Uuid::new_v4(),
            member_id,
            order_id
        );
        let started = Instant::now();

        let result = self.get_in_unit(member_id, order_id).instrument(span).await;

        observe(self.metrics.as_deref(), "get_order", started, &result);
        result
    }

    async fn get_in_unit(
        &self,
        member_id: MemberId,
        order_id: OrderId,
    ) -> ServiceResult<OrderDetail> {
        let mut work = self.store.begin().await?;
        let outcome = load_detail(&mut work, member_id, order_id).await;
        finish(work, outcome).await
    }
}

async fn load_detail<W>(
    work: &mut W,
    member_id: MemberId,
    order_id: OrderId,
) -> Result<OrderDetail, OrderError>
where
    W: OrderRepository + MemberCouponRepository,
{
    let order = work
        .find_order_by_id_and_member(order_id, member_id)
        .await?
        .ok_or(OrderError::OrderNotFound(order_id))?;

    let coupon = match order.coupon.grant_id() {
        Some(grant_id) => work
            .find_grant(grant_id)
            .await?
            .as_ref()
            .map(CouponSummary::from),
        None => None,
    };

    Ok(OrderDetail::new(order, coupon))
}
