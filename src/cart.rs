use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::ServiceError;

/// Tax rate applied on the discounted subtotal (Peruvian IGV).
pub const DEFAULT_TAX_RATE: Decimal = dec!(0.18);

/// A line in the customer's cart, as submitted by the storefront.
#[derive(Clone, Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartItem {
    #[validate(length(min = 1, message = "Item id is required"))]
    pub id: String,
    #[validate(length(min = 1, message = "Item name is required"))]
    pub name: String,
    pub unit_price: Decimal,
    /// Optional sale price; only honored when lower than the list price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_price: Option<Decimal>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_material: Option<String>,
}

impl CartItem {
    /// Price actually charged per unit: the sale price wins only when it
    /// exists and undercuts the list price.
    pub fn effective_unit_price(&self) -> Decimal {
        match self.sale_price {
            Some(sale) if sale < self.unit_price => sale,
            _ => self.unit_price,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.effective_unit_price() * Decimal::from(self.quantity)
    }
}

/// Shipping parameters the calculator prices against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShippingRates {
    pub free_shipping_threshold: Decimal,
    pub standard_shipping_cost: Decimal,
}

/// Fully derived cart totals. All figures rounded to two decimals.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_promo_code: Option<String>,
}

/// Looks up a promotional code in the built-in table.
/// Returns the discount rate as a decimal fraction of the subtotal.
pub fn promo_rate(code: &str) -> Option<Decimal> {
    match code.trim().to_ascii_uppercase().as_str() {
        "WELCOME10" => Some(dec!(0.10)),
        "JOYA15" => Some(dec!(0.15)),
        _ => None,
    }
}

/// Pure cart totals calculator. Deterministic: same items, same rates,
/// same output.
#[derive(Clone, Copy, Debug)]
pub struct CartCalculator {
    pub tax_rate: Decimal,
    pub rates: ShippingRates,
}

impl CartCalculator {
    pub fn new(tax_rate: Decimal, rates: ShippingRates) -> Self {
        Self { tax_rate, rates }
    }

    /// Validates the cart lines before pricing them.
    pub fn validate_items(items: &[CartItem]) -> Result<(), ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".into()));
        }
        for item in items {
            item.validate()?;
            if item.unit_price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "Item {} has a negative unit price",
                    item.id
                )));
            }
            if let Some(sale) = item.sale_price {
                if sale < Decimal::ZERO {
                    return Err(ServiceError::ValidationError(format!(
                        "Item {} has a negative sale price",
                        item.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn subtotal(items: &[CartItem]) -> Decimal {
        items.iter().map(CartItem::line_total).sum()
    }

    /// Shipping is waived once the raw subtotal reaches the free-shipping
    /// threshold; promo discounts do not change the threshold check.
    pub fn shipping(&self, subtotal: Decimal) -> Decimal {
        if subtotal >= self.rates.free_shipping_threshold {
            Decimal::ZERO
        } else {
            self.rates.standard_shipping_cost
        }
    }

    /// Computes all totals. The tax base is the discounted subtotal;
    /// shipping is never taxed.
    pub fn totals(
        &self,
        items: &[CartItem],
        promo_code: Option<&str>,
    ) -> Result<CartTotals, ServiceError> {
        Self::validate_items(items)?;

        let subtotal = Self::subtotal(items);

        let (discount, applied_promo_code) = match promo_code {
            Some(code) if !code.trim().is_empty() => match promo_rate(code) {
                Some(rate) => (
                    (subtotal * rate).round_dp(2),
                    Some(code.trim().to_ascii_uppercase()),
                ),
                None => {
                    return Err(ServiceError::ValidationError(format!(
                        "Unknown promo code: {}",
                        code.trim()
                    )))
                }
            },
            _ => (Decimal::ZERO, None),
        };

        let shipping = self.shipping(subtotal);
        let tax = ((subtotal - discount) * self.tax_rate).round_dp(2);
        let total = (subtotal - discount + shipping + tax).round_dp(2);

        Ok(CartTotals {
            subtotal: subtotal.round_dp(2),
            discount,
            shipping,
            tax,
            total,
            applied_promo_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn rates() -> ShippingRates {
        ShippingRates {
            free_shipping_threshold: dec!(50),
            standard_shipping_cost: dec!(9.99),
        }
    }

    fn calculator() -> CartCalculator {
        CartCalculator::new(DEFAULT_TAX_RATE, rates())
    }

    fn item(unit_price: Decimal, sale_price: Option<Decimal>, quantity: u32) -> CartItem {
        CartItem {
            id: "ring-01".into(),
            name: "Silver ring".into(),
            unit_price,
            sale_price,
            quantity,
            selected_size: Some("7".into()),
            selected_material: None,
        }
    }

    #[test]
    fn sale_price_only_wins_when_lower() {
        assert_eq!(
            item(dec!(100), Some(dec!(80)), 1).effective_unit_price(),
            dec!(80)
        );
        assert_eq!(
            item(dec!(100), Some(dec!(120)), 1).effective_unit_price(),
            dec!(100)
        );
        assert_eq!(item(dec!(100), None, 1).effective_unit_price(), dec!(100));
    }

    #[test]
    fn totals_above_free_shipping_threshold() {
        // Two units at 80 (sale) plus one at 80: subtotal 240, free shipping,
        // IGV 43.20, total 283.20.
        let items = vec![
            item(dec!(100), Some(dec!(80)), 2),
            item(dec!(80), None, 1),
        ];
        let totals = calculator().totals(&items, None).unwrap();
        assert_eq!(totals.subtotal, dec!(240));
        assert_eq!(totals.discount, dec!(0));
        assert_eq!(totals.shipping, dec!(0));
        assert_eq!(totals.tax, dec!(43.2));
        assert_eq!(totals.total, dec!(283.2));
    }

    #[test]
    fn welcome_promo_discounts_before_tax() {
        let items = vec![item(dec!(100), None, 1)];
        let totals = calculator().totals(&items, Some("WELCOME10")).unwrap();
        assert_eq!(totals.subtotal, dec!(100));
        assert_eq!(totals.discount, dec!(10));
        assert_eq!(totals.tax, dec!(16.2));
        assert_eq!(totals.shipping, dec!(0));
        assert_eq!(totals.total, dec!(106.2));
        assert_eq!(totals.applied_promo_code.as_deref(), Some("WELCOME10"));
    }

    #[test]
    fn below_threshold_pays_standard_shipping() {
        let items = vec![item(dec!(20), None, 1)];
        let totals = calculator().totals(&items, None).unwrap();
        assert_eq!(totals.shipping, dec!(9.99));
        assert_eq!(totals.tax, dec!(3.6));
        assert_eq!(totals.total, dec!(33.59));
    }

    #[test]
    fn exactly_at_threshold_ships_free() {
        let items = vec![item(dec!(50), None, 1)];
        let totals = calculator().totals(&items, None).unwrap();
        assert_eq!(totals.shipping, dec!(0));
    }

    #[test]
    fn promo_code_is_case_insensitive() {
        let items = vec![item(dec!(100), None, 1)];
        let totals = calculator().totals(&items, Some("welcome10")).unwrap();
        assert_eq!(totals.discount, dec!(10));
    }

    #[test]
    fn unknown_promo_code_is_rejected() {
        let items = vec![item(dec!(100), None, 1)];
        let err = calculator().totals(&items, Some("NOPE")).unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[test]
    fn empty_cart_is_rejected() {
        let err = calculator().totals(&[], None).unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let items = vec![item(dec!(100), None, 0)];
        let err = calculator().totals(&items, None).unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(_));
    }

    proptest! {
        #[test]
        fn total_decomposes_into_components(
            cents in 1u64..5_000_00,
            quantity in 1u32..10,
        ) {
            let unit_price = Decimal::new(cents as i64, 2);
            let items = vec![item(unit_price, None, quantity)];
            let totals = calculator().totals(&items, None).unwrap();

            prop_assert_eq!(
                totals.total,
                (totals.subtotal - totals.discount + totals.shipping + totals.tax).round_dp(2)
            );
            prop_assert!(totals.tax >= Decimal::ZERO);
        }

        #[test]
        fn discount_never_exceeds_subtotal(
            cents in 1u64..5_000_00,
            quantity in 1u32..10,
        ) {
            let unit_price = Decimal::new(cents as i64, 2);
            let items = vec![item(unit_price, None, quantity)];
            let totals = calculator().totals(&items, Some("WELCOME10")).unwrap();

            prop_assert!(totals.discount <= totals.subtotal);
            prop_assert!(totals.total >= Decimal::ZERO);
        }

        #[test]
        fn shipping_is_threshold_step(cents in 1u64..20_000) {
            let unit_price = Decimal::new(cents as i64, 2);
            let items = vec![item(unit_price, None, 1)];
            let totals = calculator().totals(&items, None).unwrap();

            if totals.subtotal >= dec!(50) {
                prop_assert_eq!(totals.shipping, dec!(0));
            } else {
                prop_assert_eq!(totals.shipping, dec!(9.99));
            }
        }
    }
}
