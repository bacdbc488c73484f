use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::coupon::{CouponSummary, CouponUsage};
use crate::domain::{CartItemId, MemberId, OrderId, ProductId};
use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// A live cart entry as captured at placement time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CartItemSnapshot {
    pub cart_item_id: CartItemId,
    pub member_id: MemberId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
}

impl CartItemSnapshot {
    /// `unit_price * quantity`, or `None` on overflow.
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

/// An ordered product, owned by its order once placed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: i64,
    pub quantity: i32,
}

impl OrderLine {
    /// `unit_price * quantity`, or `None` on overflow.
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

impl From<CartItemSnapshot> for OrderLine {
    fn from(snapshot: CartItemSnapshot) -> Self {
        Self {
            product_id: snapshot.product_id,
            product_name: snapshot.product_name,
            unit_price: snapshot.unit_price,
            quantity: snapshot.quantity,
        }
    }
}

/// PLACED -> CONFIRMED, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmState {
    Placed,
    Confirmed,
}

impl ConfirmState {
    pub fn from_flag(confirmed: bool) -> Self {
        if confirmed {
            ConfirmState::Confirmed
        } else {
            ConfirmState::Placed
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, ConfirmState::Confirmed)
    }
}

/// Order ready to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub member_id: MemberId,
    pub lines: Vec<OrderLine>,
    pub coupon: CouponUsage,
    pub original_price: i64,
    pub discount_price: i64,
    pub ordered_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn with_id(self, id: OrderId) -> Order {
        Order {
            id,
            member_id: self.member_id,
            lines: self.lines,
            coupon: self.coupon,
            original_price: self.original_price,
            discount_price: self.discount_price,
            confirm_state: ConfirmState::Placed,
            ordered_at: self.ordered_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub member_id: MemberId,
    pub lines: Vec<OrderLine>,
    pub coupon: CouponUsage,
    pub original_price: i64,
    pub discount_price: i64,
    pub confirm_state: ConfirmState,
    pub ordered_at: DateTime<Utc>,
}

impl Order {
    pub fn final_price(&self) -> i64 {
        (self.original_price - self.discount_price).max(0)
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirm_state.is_confirmed()
    }

    pub fn ensure_confirmable(&self) -> Result<(), OrderError> {
        match self.confirm_state {
            ConfirmState::Placed => Ok(()),
            ConfirmState::Confirmed => Err(OrderError::AlreadyConfirmed(self.id)),
        }
    }

    pub fn ensure_cancellable(&self) -> Result<(), OrderError> {
        match self.confirm_state {
            ConfirmState::Placed => Ok(()),
            ConfirmState::Confirmed => Err(OrderError::AlreadyConfirmed(self.id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub first_product_name: Option<String>,
    pub item_count: usize,
    pub original_price: i64,
    pub discount_price: i64,
    pub final_price: i64,
    pub confirm_state: ConfirmState,
    pub ordered_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            first_product_name: order.lines.first().map(|line| line.product_name.clone()),
            item_count: order.lines.len(),
            original_price: order.original_price,
            discount_price: order.discount_price,
            final_price: order.final_price(),
            confirm_state: order.confirm_state,
            ordered_at: order.ordered_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub id: OrderId,
    pub lines: Vec<OrderLine>,
    pub coupon: Option<CouponSummary>,
    pub original_price: i64,
    pub discount_price: i64,
    pub final_price: i64,
    pub confirm_state: ConfirmState,
    pub ordered_at: DateTime<Utc>,
}

impl OrderDetail {
    pub fn new(order: Order, coupon: Option<CouponSummary>) -> Self {
        let final_price = order.final_price();
        Self {
            id: order.id,
            lines: order.lines,
            coupon,
            original_price: order.original_price,
            discount_price: order.discount_price,
            final_price,
            confirm_state: order.confirm_state,
            ordered_at: order.ordered_at,
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn order(original_price: i64, discount_price: i64, confirm_state: ConfirmState) -> Order {
        Order {
            id: 1,
            member_id: 1,
            lines: vec![OrderLine {
                product_id: 10,
                product_name: "ocean".to_string(),
                unit_price: original_price,
                quantity: 1,
            }],
            coupon: CouponUsage::NoCoupon,
            original_price,
            discount_price,
            confirm_state,
            ordered_at: Utc::now(),
        }
    }

    #[test]
    fn test_line_total_multiplies_quantity() {
        let snapshot = CartItemSnapshot {
            cart_item_id: 1,
            member_id: 1,
            product_id: 2,
            product_name: "sea".to_string(),
            unit_price: 350,
            quantity: 3,
        };
        assert_eq!(snapshot.line_total(), Some(1050));
        assert_eq!(OrderLine::from(snapshot).line_total(), Some(1050));
    }

    #[test]
    fn test_line_total_overflow_is_none() {
        let snapshot = CartItemSnapshot {
            cart_item_id: 1,
            member_id: 1,
            product_id: 2,
            product_name: "gold".to_string(),
            unit_price: i64::MAX / 2,
            quantity: 3,
        };
        assert_eq!(snapshot.line_total(), None);
    }

    #[test]
    fn test_final_price_floors_at_zero() {
        assert_eq!(order(5000, 1000, ConfirmState::Placed).final_price(), 4000);
        assert_eq!(order(500, 1000, ConfirmState::Placed).final_price(), 0);
    }

    #[test]
    fn test_confirmed_order_rejects_transitions() {
        let confirmed = order(1000, 0, ConfirmState::Confirmed);
        assert!(matches!(confirmed.ensure_confirmable(), Err(OrderError::AlreadyConfirmed(1))));
        assert!(matches!(confirmed.ensure_cancellable(), Err(OrderError::AlreadyConfirmed(1))));

        let placed = order(1000, 0, ConfirmState::Placed);
        assert!(placed.ensure_confirmable().is_ok());
        assert!(placed.ensure_cancellable().is_ok());
    }

    #[test]
    fn test_confirm_state_from_flag() {
        assert_eq!(ConfirmState::from_flag(false), ConfirmState::Placed);
        assert_eq!(ConfirmState::from_flag(true), ConfirmState::Confirmed);
        assert_eq!(serde_json::to_string(&ConfirmState::Placed).unwrap(), "\"PLACED\"");
    }

    #[test]
    fn test_summary_reports_first_product() {
        let summary = OrderSummary::from(&order(1100, 0, ConfirmState::Placed));
        assert_eq!(summary.first_product_name.as_deref(), Some("ocean"));
        assert_eq!(summary.item_count, 1);
        assert_eq!(summary.final_price, 1100);
    }
}
