use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::domain::coupon::{CouponError, CouponLedger, CouponSummary, IssuableCoupon};
use crate::domain::{CouponId, MemberId};
use crate::error::ServiceResult;
use crate::metrics::Metrics;
use crate::storage::Store;

use super::{finish, observe};

/// Member-facing coupon operations: issuing grants and listing them.
pub struct CouponService<S: Store> {
    store: S,
    ledger: CouponLedger,
    metrics: Option<Arc<Metrics>>,
}

impl<S: Store> CouponService<S> {
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

    /// Grants `coupon_id` to the member. Fails with `AlreadyIssued` while the
    /// member still holds an unspent grant of it.
    pub async fn issue_coupon(
        &self,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> ServiceResult<CouponSummary> {
        let span = tracing::info_span!(
            "issue_coupon",
            request_id = %Uuid::new_v4(),
            member_id,
            coupon_id
        );
        let started = Instant::now();

        let result = self.issue_in_unit(member_id, coupon_id).instrument(span).await;

        if let (Ok(_), Some(metrics)) = (&result, &self.metrics) {
            metrics.coupons_issued.inc();
        }
        observe(self.metrics.as_deref(), "issue_coupon", started, &result);
        result
    }

    async fn issue_in_unit(
        &self,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> ServiceResult<CouponSummary> {
        let mut work = self.store.begin().await?;
        let outcome = self.issue_and_load(&mut work, member_id, coupon_id).await;
        finish(work, outcome).await
    }

    async fn issue_and_load(
        &self,
        work: &mut S::Work,
        member_id: MemberId,
        coupon_id: CouponId,
    ) -> Result<CouponSummary, CouponError> {
        let grant_id = self.ledger.issue_grant(work, member_id, coupon_id).await?;
        let grant = self
            .ledger
            .find_member_grant(work, member_id, grant_id)
            .await?
            .ok_or(CouponError::GrantNotFound(grant_id))?;
        Ok(CouponSummary::from(&grant))
    }

    /// Unspent grants held by the member, bonus grants included.
    pub async fn list_member_coupons(
        &self,
        member_id: MemberId,
    ) -> ServiceResult<Vec<CouponSummary>> {
        let span = tracing::debug_span!(
            "list_member_coupons",
            request_id = %Uuid::new_v4(),
            member_id
        );
        let started = Instant::now();

        let result = self.list_member_in_unit(member_id).instrument(span).await;

        observe(self.metrics.as_deref(), "list_member_coupons", started, &result);
        result
    }

    async fn list_member_in_unit(&self, member_id: MemberId) -> ServiceResult<Vec<CouponSummary>> {
        let mut work = self.store.begin().await?;
        let outcome = self.ledger.available_grants(&mut work, member_id).await;
        let grants = finish(work, outcome).await?;
        Ok(grants.iter().map(CouponSummary::from).collect())
    }

    /// Every coupon definition, flagged with whether the member may be
    /// issued it now.
    pub async fn list_issuable_coupons(
        &self,
        member_id: MemberId,
    ) -> ServiceResult<Vec<IssuableCoupon>> {
        let span = tracing::debug_span!(
            "list_issuable_coupons",
            request_id = %Uuid::new_v4(),
            member_id
        );
        let started = Instant::now();

        let result = self.list_issuable_in_unit(member_id).instrument(span).await;

        observe(self.metrics.as_deref(), "list_issuable_coupons", started, &result);
        result
    }

    async fn list_issuable_in_unit(
        &self,
        member_id: MemberId,
    ) -> ServiceResult<Vec<IssuableCoupon>> {
        let mut work = self.store.begin().await?;
        let outcome = self.ledger.issuable_coupons(&mut work, member_id).await;
        finish(work, outcome).await
    }
}
