use crate::domain::{CouponId, GrantId, MemberId, OrderId};
use crate::storage::{CouponRepository, MemberCouponRepository, StoreError};

use super::errors::CouponError;
use super::value_objects::{
    DiscountKind, IssuableCoupon, MemberCouponGrant, NewCouponDefinition, RestoreOutcome,
};

// ============================================================================
// Coupon Ledger
// ============================================================================
//
// Owns the availability flag of member grants. Redemption is a conditional
// write in the store (true -> false only if still true), so two requests
// racing for one grant resolve there without any lock in this process.
//
// ============================================================================

/// Default bonus coupon granted on order confirmation.
pub fn default_bonus_coupon() -> NewCouponDefinition {
    NewCouponDefinition {
        name: "Order confirmation bonus: 1000 off".to_string(),
        kind: DiscountKind::Deduction,
        minimum_price: 5000,
        discount_price: 1000,
        discount_rate: 0.0,
    }
}

#[derive(Debug, Clone)]
pub struct CouponLedger {
    bonus: NewCouponDefinition,
}

impl Default for CouponLedger {
    fn default() -> Self {
        Self::new(default_bonus_coupon())
    }
}

impl CouponLedger {
    pub fn new(bonus: NewCouponDefinition) -> Self {
        Self { bonus }
    }

    pub fn bonus_coupon(&self) -> &NewCouponDefinition {
        &self.bonus
    }

    /// The grant, if it belongs to `member_id` and is still available.
    pub async fn find_redeemable_grant<R: MemberCouponRepository>(
        &self,
        repo: &mut R,
        member_id: MemberId,
        grant_id: GrantId,
    ) -> Result<Option<MemberCouponGrant>, CouponError> {
        Ok(self
            .find_member_grant(repo, member_id, grant_id)
            .await?
            .filter(|grant| grant.available))
    }

    /// The grant if it belongs to `member_id`, spent or not.
    pub async fn find_member_grant<R: MemberCouponRepository>(
        &self,
        repo: &mut R,
        member_id: MemberId,
        grant_id: GrantId,
    ) -> Result<Option<MemberCouponGrant>, CouponError> {
        Ok(repo
            .find_grant(grant_id)
            .await?
            .filter(|grant| grant.member_id == member_id))
    }

    pub async fn redeem<R: MemberCouponRepository>(
        &self,
        repo: &mut R,
        grant_id: GrantId,
    ) -> Result<(), CouponError> {
        if !repo.mark_redeemed(grant_id).await? {
            tracing::debug!(grant_id, "Conditional redemption matched no available grant");
            return Err(CouponError::AlreadyRedeemed(grant_id));
        }

        tracing::debug!(grant_id, "Coupon grant redeemed");
        Ok(())
    }

    pub async fn restore<R: MemberCouponRepository>(
        &self,
        repo: &mut R,
        grant_id: GrantId,
    ) -> Result<RestoreOutcome, CouponError> {
        let grant = repo
            .find_grant(grant_id)
            .await?
            .ok_or(CouponError::GrantNotFound(grant_id))?;

        if grant.available {
            return Ok(RestoreOutcome::AlreadyAvailable);
        }

        if repo.mark_available(grant_id).await? {
            tracing::debug!(grant_id, "Coupon grant restored");
            Ok(RestoreOutcome::Restored)
        } else {
            tracing::warn!(
                grant_id,
                member_id = grant.member_id,
                coupon_id = grant.coupon.id,
                "Member already holds an active grant of this coupon, leaving grant spent"
            );
            Ok(RestoreOutcome::Superseded)
        }
    }

    pub async fn issue_grant<R>(
        &self,
        repo: &mut R,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> Result<GrantId, CouponError>
    where
        R: CouponRepository + MemberCouponRepository,
    {
        if repo.find_coupon_by_id(coupon_id).await?.is_none() {
            return Err(CouponError::DefinitionNotFound(coupon_id));
        }

        if repo.exists_active_grant(member_id, coupon_id).await? {
            return Err(CouponError::AlreadyIssued { member_id, coupon_id });
        }

        // The existence check can race with another issuance; the store's
        // uniqueness constraint is what settles it.
        let grant_id = repo
            .insert_grant(member_id, coupon_id, None)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => CouponError::AlreadyIssued {
                    member_id,
                    coupon_id,
                },
                other => CouponError::Storage(other),
            })?;

        tracing::info!(member_id, coupon_id, grant_id, "Coupon issued");
        Ok(grant_id)
    }

    /// Grants the bonus coupon for confirming `order_id`. At most one bonus
    /// grant exists per order.
    pub async fn issue_bonus_grant<R>(
        &self,
        repo: &mut R,
        member_id: MemberId,
        order_id: OrderId,
    ) -> Result<MemberCouponGrant, CouponError>
    where
        R: CouponRepository + MemberCouponRepository,
    {
        let coupon = repo.find_or_insert_coupon(&self.bonus).await?;
        if !coupon.has_terms_of(&self.bonus) {
            tracing::warn!(
                coupon_id = coupon.id,
                name = %coupon.name,
                stored_minimum_price = coupon.minimum_price,
                stored_discount_price = coupon.discount_price,
                configured_minimum_price = self.bonus.minimum_price,
                configured_discount_price = self.bonus.discount_price,
                "Stored bonus coupon differs from configuration, issuing the stored terms"
            );
        }

        let grant_id = repo
            .insert_grant(member_id, coupon.id, Some(order_id))
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation(_) => CouponError::AlreadyIssued {
                    member_id,
                    coupon_id: coupon.id,
                },
                other => CouponError::Storage(other),
            })?;

        tracing::info!(member_id, order_id, grant_id, "Bonus coupon issued");

        Ok(MemberCouponGrant {
            id: grant_id,
            member_id,
            coupon,
            available: true,
            source_order_id: Some(order_id),
        })
    }

    pub async fn available_grants<R: MemberCouponRepository>(
        &self,
        repo: &mut R,
        member_id: MemberId,
    ) -> Result<Vec<MemberCouponGrant>, CouponError> {
        Ok(repo.find_available_grants_by_member(member_id).await?)
    }

    /// Every coupon definition, flagged with whether the member could be
    /// issued it now. Bonus grants do not block issuance.
    pub async fn issuable_coupons<R>(
        &self,
        repo: &mut R,
        member_id: MemberId,
    ) -> Result<Vec<IssuableCoupon>, CouponError>
    where
        R: CouponRepository + MemberCouponRepository,
    {
        let held: Vec<CouponId> = repo
            .find_available_grants_by_member(member_id)
            .await?
            .into_iter()
            .filter(|grant| !grant.is_bonus())
            .map(|grant| grant.coupon.id)
            .collect();

        Ok(repo
            .find_all_coupons()
            .await?
            .into_iter()
            .map(|coupon| IssuableCoupon {
                issuable: !held.contains(&coupon.id),
                coupon,
            })
            .collect())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
