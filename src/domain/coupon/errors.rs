use crate::domain::{CouponId, GrantId, MemberId};
use crate::error::ErrorKind;
use crate::storage::StoreError;

// ============================================================================
// Coupon Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CouponError {
    #[error("Coupon requires a subtotal of at least {minimum_price}, got {subtotal}")]
    NotApplicable { subtotal: i64, minimum_price: i64 },

    #[error("Coupon grant {0} has already been redeemed")]
    AlreadyRedeemed(GrantId),

    #[error("Member {member_id} already holds an active grant of coupon {coupon_id}")]
    AlreadyIssued { member_id: MemberId, coupon_id: CouponId },

    #[error("Coupon definition not found: {0}")]
    DefinitionNotFound(CouponId),

    #[error("Coupon grant not found: {0}")]
    GrantNotFound(GrantId),

    #[error("Unknown discount type: {0}")]
    UnknownDiscountKind(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl CouponError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CouponError::NotApplicable { .. } => ErrorKind::RuleViolation,
            CouponError::AlreadyRedeemed(_) | CouponError::AlreadyIssued { .. } => {
                ErrorKind::Conflict
            }
            CouponError::DefinitionNotFound(_) | CouponError::GrantNotFound(_) => {
                ErrorKind::NotFound
            }
            CouponError::UnknownDiscountKind(_) | CouponError::Storage(_) => ErrorKind::Internal,
        }
    }
}
