// ============================================================================
// Order Domain - placement and lifecycle
// ============================================================================
//
// - Value objects (CartItemSnapshot, OrderLine, Order, ConfirmState)
// - Errors (OrderError enum)
// - Aggregate (OrderAggregate: placement)
// - Lifecycle (OrderLifecycle: confirm / cancel)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod aggregate;
pub mod lifecycle;

// Re-export for convenience
pub use value_objects::*;
pub use errors::*;
pub use aggregate::*;
pub use lifecycle::*;
