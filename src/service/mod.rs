// ============================================================================
// Services - request-level facades
// ============================================================================
//
// Each operation:
//   1. opens a span carrying a fresh request_id
//   2. begins one unit of work on the store
//   3. runs the domain call through it
//   4. commits on success, rolls back on any error
//   5. records duration / failure kind
//
// ============================================================================

mod coupon_service;
mod order_service;

pub use coupon_service::CouponService;
pub use order_service::OrderService;

use std::time::Instant;

use crate::error::{ServiceError, ServiceResult};
use crate::metrics::Metrics;
use crate::storage::UnitOfWork;

/// Ends the unit of work according to `outcome`.
async fn finish<W, T, E>(work: W, outcome: Result<T, E>) -> ServiceResult<T>
where
    W: UnitOfWork,
    ServiceError: From<E>,
{
    match outcome {
        Ok(value) => {
            work.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = work.rollback().await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            Err(e.into())
        }
    }
}

fn observe<T>(
    metrics: Option<&Metrics>,
    operation: &'static str,
    started: Instant,
    result: &ServiceResult<T>,
) {
    let elapsed = started.elapsed().as_secs_f64();
    let failure = match result {
        Ok(_) => {
            tracing::debug!(operation, elapsed, "Operation succeeded");
            None
        }
        Err(e) => {
            let kind = e.kind();
            tracing::warn!(operation, kind = kind.as_str(), error = %e, "Operation failed");
            Some(kind)
        }
    };

    if let Some(metrics) = metrics {
        metrics.record_operation(operation, elapsed, failure);
    }
}
