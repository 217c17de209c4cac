//! Delivery fee and discount computation.
//!
//! Both functions are pure. Discounts are re-evaluated by the caller whenever
//! the subtotal or the fee changes; a discount whose minimum-order condition
//! stops holding is silently dropped, never partially applied.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    Percent,
    Flat,
}

/// Static catalog entry. Read-only reference data.
#[derive(Clone, Debug)]
pub struct DiscountCode {
    pub code: &'static str,
    pub kind: DiscountType,
    pub value: i64,
    pub min_order_total: Option<i64>,
    pub is_active: bool,
}

/// FREESHIP is the one dynamic entry: its amount equals the delivery fee at
/// application time, not the catalog's static value.
pub const FREE_SHIPPING_CODE: &str = "FREESHIP";

pub const AVAILABLE_DISCOUNTS: &[DiscountCode] = &[
    DiscountCode {
        code: "WELCOME20",
        kind: DiscountType::Percent,
        value: 20,
        min_order_total: Some(100),
        is_active: true,
    },
    DiscountCode {
        code: "NADHUB30",
        kind: DiscountType::Flat,
        value: 30,
        min_order_total: Some(150),
        is_active: true,
    },
    DiscountCode {
        code: FREE_SHIPPING_CODE,
        kind: DiscountType::Flat,
        value: 0,
        min_order_total: Some(80),
        is_active: true,
    },
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    /// Canonical (catalog) casing, whatever the user typed.
    pub code: String,
    pub amount: Decimal,
}

/// Step-function delivery fee in THB by straight-line distance.
pub fn delivery_fee(distance_km: f64) -> Decimal {
    if distance_km <= 3.0 {
        Decimal::from(20)
    } else if distance_km <= 8.0 {
        Decimal::from(30)
    } else if distance_km <= 15.0 {
        Decimal::from(40)
    } else {
        Decimal::from(50)
    }
}

/// Case-insensitive catalog lookup. `None` means no discount applies: unknown
/// or inactive code, or subtotal under the code's minimum. Does not cap the
/// amount against the order total; the grand-total floor handles that.
pub fn calculate_discount(
    code: &str,
    items_total: Decimal,
    delivery_fee: Decimal,
) -> Option<AppliedDiscount> {
    let discount = AVAILABLE_DISCOUNTS
        .iter()
        .find(|d| d.is_active && d.code.eq_ignore_ascii_case(code))?;

    if let Some(min) = discount.min_order_total {
        if items_total < Decimal::from(min) {
            return None;
        }
    }

    let amount = if discount.code == FREE_SHIPPING_CODE {
        delivery_fee
    } else {
        match discount.kind {
            DiscountType::Percent => items_total * Decimal::from(discount.value) / Decimal::from(100),
            DiscountType::Flat => Decimal::from(discount.value),
        }
    };

    Some(AppliedDiscount {
        code: discount.code.to_string(),
        amount,
    })
}

/// `max(0, items_total + delivery_fee - discount)`. Never negative.
pub fn grand_total(
    items_total: Decimal,
    delivery_fee: Decimal,
    discount: Option<&AppliedDiscount>,
) -> Decimal {
    let discounted = items_total + delivery_fee
        - discount.map(|d| d.amount).unwrap_or(Decimal::ZERO);
    discounted.max(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_steps() {
        assert_eq!(delivery_fee(3.0), Decimal::from(20));
        assert_eq!(delivery_fee(8.0), Decimal::from(30));
        assert_eq!(delivery_fee(15.0), Decimal::from(40));
        assert_eq!(delivery_fee(16.0), Decimal::from(50));
    }

    #[test]
    fn test_fee_monotone() {
        let distances = [0.0, 1.0, 3.0, 3.1, 7.9, 8.0, 8.1, 15.0, 15.1, 40.0];
        for pair in distances.windows(2) {
            assert!(delivery_fee(pair[0]) <= delivery_fee(pair[1]));
        }
    }

    #[test]
    fn test_discount_minimum_enforced() {
        assert!(calculate_discount("WELCOME20", Decimal::from(99), Decimal::from(30)).is_none());
        let d = calculate_discount("WELCOME20", Decimal::from(100), Decimal::from(30)).unwrap();
        assert_eq!(d.amount, Decimal::from(20));
    }

    #[test]
    fn test_discount_lookup_case_insensitive() {
        let d = calculate_discount("welcome20", Decimal::from(200), Decimal::from(30)).unwrap();
        assert_eq!(d.code, "WELCOME20");
        assert_eq!(d.amount, Decimal::from(40));
    }

    #[test]
    fn test_free_shipping_is_dynamic() {
        let d = calculate_discount("freeship", Decimal::from(80), Decimal::from(40)).unwrap();
        assert_eq!(d.amount, Decimal::from(40));
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert!(calculate_discount("NOPE", Decimal::from(1000), Decimal::from(30)).is_none());
    }

    #[test]
    fn test_grand_total_floor() {
        let huge = AppliedDiscount {
            code: "NADHUB30".into(),
            amount: Decimal::from(10_000),
        };
        assert_eq!(
            grand_total(Decimal::from(50), Decimal::from(20), Some(&huge)),
            Decimal::ZERO
        );
        assert_eq!(
            grand_total(Decimal::from(200), Decimal::from(30), None),
            Decimal::from(230)
        );
    }
}
