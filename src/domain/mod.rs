// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with:
// - Value objects
// - Errors
// - Domain logic (policy / ledger / aggregate / lifecycle)
//
// This layer only talks to persistence through the repository traits in
// `crate::storage`, never through a concrete backend.
//
// ============================================================================

pub mod coupon;
pub mod order;

/// Member (customer account) identifier.
pub type MemberId = i64;
/// Product catalog identifier.
pub type ProductId = i64;
/// Live cart entry identifier.
pub type CartItemId = i64;
/// Coupon definition identifier.
pub type CouponId = i64;
/// Member coupon grant identifier.
pub type GrantId = i64;
/// Order identifier. Monotonically increasing, newest is largest.
pub type OrderId = i64;
