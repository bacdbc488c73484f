use crate::domain::coupon::CouponError;
use crate::domain::{CartItemId, GrantId, OrderId};
use crate::error::ErrorKind;
use crate::storage::StoreError;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("No cart items were selected")]
    EmptySelection,

    #[error("Cart items not found for member: {0:?}")]
    CartItemNotOwned(Vec<CartItemId>),

    #[error("Order total overflows for cart items: {0:?}")]
    SubtotalOverflow(Vec<CartItemId>),

    #[error("Coupon grant not found: {0}")]
    CouponNotFound(GrantId),

    #[error("Coupon grant {0} is no longer available")]
    CouponUnavailable(GrantId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Order {0} is already confirmed")]
    AlreadyConfirmed(OrderId),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptySelection
            | OrderError::CartItemNotOwned(_)
            | OrderError::SubtotalOverflow(_) => ErrorKind::Validation,
            OrderError::CouponNotFound(_) | OrderError::OrderNotFound(_) => ErrorKind::NotFound,
            OrderError::CouponUnavailable(_) | OrderError::AlreadyConfirmed(_) => {
                ErrorKind::Conflict
            }
            OrderError::Coupon(e) => e.kind(),
            OrderError::Storage(_) => ErrorKind::Internal,
        }
    }
}
