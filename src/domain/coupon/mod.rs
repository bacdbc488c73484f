// ============================================================================
// Coupon Domain
// ============================================================================
//
// - Value objects (CouponDefinition, MemberCouponGrant, CouponUsage)
// - DiscountPolicy (pure discount calculation)
// - CouponLedger (redemption state of member grants)
// - Errors (CouponError)
//
// ============================================================================

pub mod value_objects;
pub mod policy;
pub mod errors;
pub mod ledger;

pub use value_objects::*;
pub use policy::*;
pub use errors::*;
pub use ledger::*;
