// ============================================================================
// cart_orders - cart-to-order checkout with member coupons
// ============================================================================
//
// - domain:  coupon ledger + discount policy, order placement + lifecycle
// - storage: repository traits, Postgres and in-memory units of work
// - service: request-level facades (OrderService, CouponService)
// - metrics: Prometheus registry + /metrics exporter
//
// ============================================================================

pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod service;
pub mod storage;

pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use service::{CouponService, OrderService};
