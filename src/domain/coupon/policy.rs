use super::errors::CouponError;
use super::value_objects::DiscountKind;

// ============================================================================
// Discount Policy - pure price calculation
// ============================================================================
//
// The set of variants is closed: a new kind needs matching ledger and
// persistence support, so it is added here and matched exhaustively.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiscountPolicy {
    /// No coupon applied.
    Empty,
    Deduction { minimum_price: i64, amount: i64 },
    Rate { minimum_price: i64, rate: f64 },
}

impl DiscountPolicy {
    pub fn from_parts(
        kind: DiscountKind,
        minimum_price: i64,
        discount_price: i64,
        discount_rate: f64,
    ) -> Self {
        match kind {
            DiscountKind::Empty => DiscountPolicy::Empty,
            DiscountKind::Deduction => DiscountPolicy::Deduction {
                minimum_price,
                amount: discount_price,
            },
            DiscountKind::Rate => DiscountPolicy::Rate {
                minimum_price,
                rate: discount_rate,
            },
        }
    }

    pub fn kind(&self) -> DiscountKind {
        match self {
            DiscountPolicy::Empty => DiscountKind::Empty,
            DiscountPolicy::Deduction { .. } => DiscountKind::Deduction,
            DiscountPolicy::Rate { .. } => DiscountKind::Rate,
        }
    }

    /// Discount amount for `subtotal`, always within `[0, subtotal]`.
    pub fn apply(&self, subtotal: i64) -> Result<i64, CouponError> {
        let subtotal = subtotal.max(0);

        let discount = match *self {
            DiscountPolicy::Empty => 0,
            DiscountPolicy::Deduction { minimum_price, amount } => {
                ensure_minimum(subtotal, minimum_price)?;
                amount.min(subtotal)
            }
            DiscountPolicy::Rate { minimum_price, rate } => {
                ensure_minimum(subtotal, minimum_price)?;
                let raw = (subtotal as f64 * rate).floor();
                if raw.is_nan() {
                    0
                } else {
                    raw.min(subtotal as f64) as i64
                }
            }
        };

        Ok(discount.clamp(0, subtotal))
    }
}

fn ensure_minimum(subtotal: i64, minimum_price: i64) -> Result<(), CouponError> {
    if subtotal < minimum_price {
        return Err(CouponError::NotApplicable {
            subtotal,
            minimum_price,
        });
    }
    Ok(())
}
