use crate::domain::coupon::{CouponLedger, CouponUsage, MemberCouponGrant, RestoreOutcome};
use crate::domain::{MemberId, OrderId};
use crate::storage::UnitOfWork;

use super::errors::OrderError;
use super::value_objects::{ConfirmState, Order};

// ============================================================================
// Order Lifecycle
// ============================================================================
//
//  [PLACED] --confirm--> [CONFIRMED]      terminal
//  [PLACED] --cancel---> (deleted)
//  [CONFIRMED] --cancel/confirm--> AlreadyConfirmed
//
// Both transitions are re-checked by a conditional write, so a confirm and
// a cancel racing on one order cannot both succeed.
//
// ============================================================================

pub struct OrderLifecycle<'a> {
    ledger: &'a CouponLedger,
}

/// What a successful cancellation undid.
#[derive(Debug, Clone, PartialEq)]
pub struct Cancellation {
    pub order: Order,
    pub restored: Option<RestoreOutcome>,
}

impl<'a> OrderLifecycle<'a> {
    pub fn new(ledger: &'a CouponLedger) -> Self {
        Self { ledger }
    }

    async fn load<W: UnitOfWork>(
        work: &mut W,
        order_id: OrderId,
        member_id: MemberId,
    ) -> Result<Order, OrderError> {
        work.find_order_by_id_and_member(order_id, member_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    /// Confirms the order and issues exactly one bonus grant for it.
    pub async fn confirm<W: UnitOfWork>(
        &self,
        work: &mut W,
        order_id: OrderId,
        member_id: MemberId,
    ) -> Result<(Order, MemberCouponGrant), OrderError> {
        let mut order = Self::load(work, order_id, member_id).await?;
        order.ensure_confirmable()?;

        if !work.mark_confirmed(order_id).await? {
            return Err(OrderError::AlreadyConfirmed(order_id));
        }
        order.confirm_state = ConfirmState::Confirmed;

        let bonus = self
            .ledger
            .issue_bonus_grant(work, member_id, order_id)
            .await?;

        Ok((order, bonus))
    }

    /// Deletes a PLACED order, giving its coupon back. Cart items stay
    /// consumed.
    pub async fn cancel<W: UnitOfWork>(
        &self,
        work: &mut W,
        order_id: OrderId,
        member_id: MemberId,
    ) -> Result<Cancellation, OrderError> {
        let order = Self::load(work, order_id, member_id).await?;
        order.ensure_cancellable()?;

        // Delete first: a request that lost a race on this order must not
        // touch the grant.
        if !work.delete_placed_order(order_id).await? {
            return Err(match work.find_order_by_id_and_member(order_id, member_id).await? {
                Some(_) => OrderError::AlreadyConfirmed(order_id),
                None => OrderError::OrderNotFound(order_id),
            });
        }

        let restored = match order.coupon {
            CouponUsage::NoCoupon => None,
            CouponUsage::Applied(grant_id) => Some(self.ledger.restore(work, grant_id).await?),
        };

        Ok(Cancellation { order, restored })
    }
}
