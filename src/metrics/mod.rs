// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

use crate::error::ErrorKind;

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order placement / confirmation / cancellation outcomes
// - Coupon redemptions, conflicts and bonus grants
// - Facade operation latency
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Order Metrics
    pub orders_placed: IntCounter,
    pub orders_confirmed: IntCounter,
    pub orders_cancelled: IntCounter,

    // Coupon Metrics
    pub coupons_redeemed: IntCounter,
    pub coupons_restored: IntCounter,
    pub coupon_conflicts: IntCounter,
    pub bonus_coupons_issued: IntCounter,
    pub coupons_issued: IntCounter,

    // Facade Metrics
    pub operation_failures: IntCounterVec,
    pub operation_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_placed = IntCounter::new("orders_placed_total", "Orders placed")?;
        registry.register(Box::new(orders_placed.clone()))?;

        let orders_confirmed = IntCounter::new("orders_confirmed_total", "Orders confirmed")?;
        registry.register(Box::new(orders_confirmed.clone()))?;

        let orders_cancelled = IntCounter::new("orders_cancelled_total", "Orders cancelled")?;
        registry.register(Box::new(orders_cancelled.clone()))?;

        let coupons_redeemed =
            IntCounter::new("coupons_redeemed_total", "Coupon grants spent on an order")?;
        registry.register(Box::new(coupons_redeemed.clone()))?;

        let coupons_restored = IntCounter::new(
            "coupons_restored_total",
            "Coupon grants made available again by a cancellation",
        )?;
        registry.register(Box::new(coupons_restored.clone()))?;

        let coupon_conflicts = IntCounter::new(
            "coupon_conflicts_total",
            "Placements rejected because the coupon grant was already spent",
        )?;
        registry.register(Box::new(coupon_conflicts.clone()))?;

        let bonus_coupons_issued = IntCounter::new(
            "bonus_coupons_issued_total",
            "Bonus coupon grants issued on confirmation",
        )?;
        registry.register(Box::new(bonus_coupons_issued.clone()))?;

        let coupons_issued =
            IntCounter::new("coupons_issued_total", "Coupon grants issued on request")?;
        registry.register(Box::new(coupons_issued.clone()))?;

        let operation_failures = IntCounterVec::new(
            Opts::new("operation_failures_total", "Failed facade operations"),
            &["operation", "kind"],
        )?;
        registry.register(Box::new(operation_failures.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("operation_duration_seconds", "Facade operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            registry,
            orders_placed,
            orders_confirmed,
            orders_cancelled,
            coupons_redeemed,
            coupons_restored,
            coupon_conflicts,
            bonus_coupons_issued,
            coupons_issued,
            operation_failures,
            operation_duration,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record a facade operation outcome
    pub fn record_operation(
        &self,
        operation: &str,
        duration_secs: f64,
        failure: Option<ErrorKind>,
    ) {
        self.operation_duration
            .with_label_values(&[operation])
            .observe(duration_secs);
        if let Some(kind) = failure {
            self.operation_failures
                .with_label_values(&[operation, kind.as_str()])
                .inc();
            if operation == "place_order" && kind == ErrorKind::Conflict {
                self.coupon_conflicts.inc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(metrics: &Metrics, name: &str) -> Option<f64> {
        metrics
            .registry()
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .and_then(|m| m.metric.first().and_then(|metric| metric.counter.value))
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_failed_placement() {
        let metrics = Metrics::new().unwrap();
        metrics.record_operation("place_order", 0.01, Some(ErrorKind::Conflict));
        metrics.record_operation("place_order", 0.02, Some(ErrorKind::Validation));

        let gathered = metrics.registry.gather();
        let failures = gathered
            .iter()
            .find(|m| m.name() == "operation_failures_total")
            .unwrap();
        assert_eq!(failures.metric.len(), 2);
        assert_eq!(counter(&metrics, "coupon_conflicts_total"), Some(1.0));
    }

    #[test]
    fn test_successful_operation_has_no_failure() {
        let metrics = Metrics::new().unwrap();
        metrics.orders_placed.inc();
        metrics.record_operation("place_order", 0.01, None);

        assert_eq!(counter(&metrics, "orders_placed_total"), Some(1.0));
        assert!(metrics
            .registry
            .gather()
            .iter()
            .all(|m| m.name() != "operation_failures_total" || m.metric.is_empty()));
    }
}
