use serde::Serialize;

use crate::domain::coupon::CouponError;
use crate::domain::order::OrderError;
use crate::storage::StoreError;

// ============================================================================
// Service Errors - what callers of the facades see
// ============================================================================

/// Caller-visible error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    RuleViolation,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::RuleViolation => "rule_violation",
            ErrorKind::Internal => "internal",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Coupon(#[from] CouponError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Order(e) => e.kind(),
            ServiceError::Coupon(e) => e.kind(),
            ServiceError::Storage(_) => ErrorKind::Internal,
        }
    }
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_domain_errors() {
        let cases: Vec<(ServiceError, ErrorKind)> = vec![
            (OrderError::EmptySelection.into(), ErrorKind::Validation),
            (OrderError::CartItemNotOwned(vec![4]).into(), ErrorKind::Validation),
            (OrderError::CouponNotFound(1).into(), ErrorKind::NotFound),
            (OrderError::OrderNotFound(1).into(), ErrorKind::NotFound),
            (OrderError::CouponUnavailable(1).into(), ErrorKind::Conflict),
            (OrderError::AlreadyConfirmed(1).into(), ErrorKind::Conflict),
            (
                OrderError::Coupon(CouponError::NotApplicable {
                    subtotal: 4999,
                    minimum_price: 5000,
                })
                .into(),
                ErrorKind::RuleViolation,
            ),
            (
                CouponError::AlreadyIssued {
                    member_id: 1,
                    coupon_id: 2,
                }
                .into(),
                ErrorKind::Conflict,
            ),
            (CouponError::DefinitionNotFound(2).into(), ErrorKind::NotFound),
            (StoreError::Corrupt("bad".to_string()).into(), ErrorKind::Internal),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "{error}");
        }
    }
}
