use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{CouponId, GrantId, MemberId};
use super::errors::CouponError;
use super::policy::DiscountPolicy;

// ============================================================================
// Coupon Value Objects
// ============================================================================

/// Discount variant of a coupon definition. Stored as its upper-case code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountKind {
    Empty,
    Deduction,
    Rate,
}

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountKind::Empty => "EMPTY",
            DiscountKind::Deduction => "DEDUCTION",
            DiscountKind::Rate => "RATE",
        }
    }
}

impl fmt::Display for DiscountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscountKind {
    type Err = CouponError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMPTY" => Ok(DiscountKind::Empty),
            "DEDUCTION" => Ok(DiscountKind::Deduction),
            "RATE" => Ok(DiscountKind::Rate),
            other => Err(CouponError::UnknownDiscountKind(other.to_string())),
        }
    }
}

/// Shared, read-only coupon reference data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponDefinition {
    pub id: CouponId,
    pub name: String,
    pub kind: DiscountKind,
    pub minimum_price: i64,
    pub discount_price: i64,
    pub discount_rate: f64,
}

impl CouponDefinition {
    pub fn policy(&self) -> DiscountPolicy {
        DiscountPolicy::from_parts(
            self.kind,
            self.minimum_price,
            self.discount_price,
            self.discount_rate,
        )
    }

    /// Discount this coupon grants on `subtotal`.
    pub fn discount_for(&self, subtotal: i64) -> Result<i64, CouponError> {
        self.policy().apply(subtotal)
    }

    /// Whether the stored terms equal `template`, ignoring the id.
    pub fn has_terms_of(&self, template: &NewCouponDefinition) -> bool {
        self.name == template.name
            && self.kind == template.kind
            && self.minimum_price == template.minimum_price
            && self.discount_price == template.discount_price
            && self.discount_rate == template.discount_rate
    }
}

/// Template for a coupon definition that does not have an id yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCouponDefinition {
    pub name: String,
    pub kind: DiscountKind,
    pub minimum_price: i64,
    pub discount_price: i64,
    pub discount_rate: f64,
}

impl NewCouponDefinition {
    pub fn with_id(self, id: CouponId) -> CouponDefinition {
        CouponDefinition {
            id,
            name: self.name,
            kind: self.kind,
            minimum_price: self.minimum_price,
            discount_price: self.discount_price,
            discount_rate: self.discount_rate,
        }
    }
}

/// A coupon held by a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberCouponGrant {
    pub id: GrantId,
    pub member_id: MemberId,
    pub coupon: CouponDefinition,
    pub available: bool,
    /// Set for bonus grants: the confirmed order that produced this grant.
    pub source_order_id: Option<crate::domain::OrderId>,
}

impl MemberCouponGrant {
    pub fn is_bonus(&self) -> bool {
        self.source_order_id.is_some()
    }
}

/// Which coupon, if any, an order was placed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "grant_id")]
pub enum CouponUsage {
    #[default]
    NoCoupon,
    Applied(GrantId),
}

impl CouponUsage {
    pub fn grant_id(&self) -> Option<GrantId> {
        match self {
            CouponUsage::NoCoupon => None,
            CouponUsage::Applied(id) => Some(*id),
        }
    }
}

impl From<Option<GrantId>> for CouponUsage {
    fn from(grant: Option<GrantId>) -> Self {
        grant.map_or(CouponUsage::NoCoupon, CouponUsage::Applied)
    }
}

/// Result of reversing a redemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored,
    AlreadyAvailable,
    /// The member holds another active grant of the same definition, so this
    /// one stays spent.
    Superseded,
}

/// Caller-facing view of a grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouponSummary {
    pub id: GrantId,
    pub coupon_id: CouponId,
    pub name: String,
    pub discount_type: DiscountKind,
    pub minimum_price: i64,
    pub discount_price: i64,
    pub discount_rate: f64,
}

impl From<&MemberCouponGrant> for CouponSummary {
    fn from(grant: &MemberCouponGrant) -> Self {
        Self {
            id: grant.id,
            coupon_id: grant.coupon.id,
            name: grant.coupon.name.clone(),
            discount_type: grant.coupon.kind,
            minimum_price: grant.coupon.minimum_price,
            discount_price: grant.coupon.discount_price,
            discount_rate: grant.coupon.discount_rate,
        }
    }
}

/// A coupon definition and whether the member may be issued it right now.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuableCoupon {
    pub coupon: CouponDefinition,
    pub issuable: bool,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_kind_codes() {
        for kind in [DiscountKind::Empty, DiscountKind::Deduction, DiscountKind::Rate] {
            assert_eq!(kind.as_str().parse::<DiscountKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_discount_kind_is_rejected() {
        let err = "PERCENT".parse::<DiscountKind>().unwrap_err();
        assert!(matches!(err, CouponError::UnknownDiscountKind(code) if code == "PERCENT"));
    }

    #[test]
    fn test_discount_kind_serializes_as_code() {
        let json = serde_json::to_string(&DiscountKind::Deduction).unwrap();
        assert_eq!(json, "\"DEDUCTION\"");
    }

    #[test]
    fn test_coupon_usage_from_option() {
        assert_eq!(CouponUsage::from(None), CouponUsage::NoCoupon);
        assert_eq!(CouponUsage::from(Some(7)), CouponUsage::Applied(7));
        assert_eq!(CouponUsage::Applied(7).grant_id(), Some(7));
        assert_eq!(CouponUsage::NoCoupon.grant_id(), None);
    }

    #[test]
    fn test_summary_copies_definition() {
        let grant = MemberCouponGrant {
            id: 3,
            member_id: 1,
            coupon: CouponDefinition {
                id: 9,
                name: "1000 off".to_string(),
                kind: DiscountKind::Deduction,
                minimum_price: 5000,
                discount_price: 1000,
                discount_rate: 0.0,
            },
            available: true,
            source_order_id: None,
        };

        let summary = CouponSummary::from(&grant);
        assert_eq!(summary.id, 3);
        assert_eq!(summary.coupon_id, 9);
        assert_eq!(summary.discount_type, DiscountKind::Deduction);
        assert!(!grant.is_bonus());
    }

    #[test]
    fn test_has_terms_of_compares_every_term() {
        let template = NewCouponDefinition {
            name: "bonus".to_string(),
            kind: DiscountKind::Deduction,
            minimum_price: 5000,
            discount_price: 1000,
            discount_rate: 0.0,
        };
        let stored = template.clone().with_id(4);
        assert!(stored.has_terms_of(&template));

        let raised = NewCouponDefinition {
            discount_price: 2000,
            ..template
        };
        assert!(!stored.has_terms_of(&raised));
    }
}
