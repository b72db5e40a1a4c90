//! Ordered items and the monetary terms derived from them.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use factoryerp_core::{DomainError, DomainResult, ValueObject};
use factoryerp_inventory::MaterialId;

/// One material on a purchase order. The quantity is fixed once the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderedItem {
    pub material_id: MaterialId,
    /// Denormalized from the catalog at placement time, for display.
    pub material_name: String,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
}

impl OrderedItem {
    /// `quantity * unit_price`, or a validation error when it is not representable.
    pub fn line_total(&self) -> DomainResult<Decimal> {
        self.quantity.checked_mul(self.unit_price).ok_or_else(|| {
            DomainError::validation(format!(
                "line total for material {} is too large",
                self.material_id
            ))
        })
    }
}

/// Subtotal, tax and discount of an order.
///
/// The discount applies to the subtotal; tax applies to the discounted amount.
/// Amounts are rounded to two decimal places.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryTerms {
    pub subtotal: Decimal,
    pub tax_percent: Decimal,
    pub discount_percent: Decimal,
    pub total: Decimal,
}

impl ValueObject for MonetaryTerms {}

impl MonetaryTerms {
    pub fn compute(
        items: &[OrderedItem],
        tax_percent: Decimal,
        discount_percent: Decimal,
    ) -> DomainResult<Self> {
        ensure_percent("tax_percent", tax_percent)?;
        ensure_percent("discount_percent", discount_percent)?;

        let mut subtotal = Decimal::ZERO;
        for item in items {
            subtotal = subtotal
                .checked_add(item.line_total()?)
                .ok_or_else(too_large)?;
        }
        let discounted = subtotal - percent_of(subtotal, discount_percent)?;
        let total = discounted
            .checked_add(percent_of(discounted, tax_percent)?)
            .ok_or_else(too_large)?;

        Ok(Self {
            subtotal: subtotal.round_dp(2),
            tax_percent,
            discount_percent,
            total: total.round_dp(2),
        })
    }
}

fn percent_of(amount: Decimal, percent: Decimal) -> DomainResult<Decimal> {
    amount
        .checked_mul(percent)
        .map(|v| v / Decimal::ONE_HUNDRED)
        .ok_or_else(too_large)
}

fn too_large() -> DomainError {
    DomainError::validation("order total is too large")
}

fn ensure_percent(field: &str, value: Decimal) -> DomainResult<()> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(DomainError::validation(format!(
            "{field} must be between 0 and 100"
        )));
    }
    Ok(())
}

/// Validate the item list of a new order.
pub(crate) fn validate_items(items: &[OrderedItem]) -> DomainResult<()> {
    if items.is_empty() {
        return Err(DomainError::validation(
            "purchase order must contain at least one item",
        ));
    }

    let mut seen = BTreeSet::new();
    for item in items {
        if !seen.insert(item.material_id) {
            return Err(DomainError::validation(format!(
                "material {} appears more than once",
                item.material_id
            )));
        }
        if item.quantity <= Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "ordered quantity for material {} must be positive",
                item.material_id
            )));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "unit price for material {} cannot be negative",
                item.material_id
            )));
        }
        if item.unit.trim().is_empty() {
            return Err(DomainError::validation(format!(
                "unit of measure for material {} cannot be empty",
                item.material_id
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use factoryerp_core::AggregateId;

    fn item(qty: i64, price: Decimal) -> OrderedItem {
        OrderedItem {
            material_id: MaterialId::new(AggregateId::new()),
            material_name: "Copper Wire".to_string(),
            quantity: Decimal::from(qty),
            unit: "m".to_string(),
            unit_price: price,
        }
    }

    #[test]
    fn total_applies_discount_before_tax() {
        let items = vec![item(100, Decimal::new(250, 2)), item(10, Decimal::from(5))];
        // subtotal 300, -10% = 270, +18% = 318.60
        let terms =
            MonetaryTerms::compute(&items, Decimal::from(18), Decimal::from(10)).unwrap();
        assert_eq!(terms.subtotal, Decimal::from(300));
        assert_eq!(terms.total, Decimal::new(31860, 2));
    }

    #[test]
    fn percent_out_of_range_is_rejected() {
        let items = vec![item(1, Decimal::ONE)];
        let err = MonetaryTerms::compute(&items, Decimal::from(101), Decimal::ZERO).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("tax_percent")));
        let err = MonetaryTerms::compute(&items, Decimal::ZERO, Decimal::from(-1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("discount_percent")));
    }

    #[test]
    fn oversized_amounts_are_a_validation_error() {
        let huge = Decimal::from(1_000_000_000_000_000i64);
        let items = vec![item(1_000_000_000_000_000, huge)];
        let err = MonetaryTerms::compute(&items, Decimal::ZERO, Decimal::ZERO).unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("too large")));
        assert!(items[0].line_total().is_err());

        // Each line fits but the subtotal does not.
        let big = Decimal::MAX / Decimal::from(2);
        let items = vec![item(1, big), item(1, big), item(1, Decimal::from(10))];
        assert!(MonetaryTerms::compute(&items, Decimal::ZERO, Decimal::ZERO).is_err());

        // The subtotal fits but tax pushes the total past the limit.
        let items = vec![item(1, big)];
        assert!(MonetaryTerms::compute(&items, Decimal::from(100), Decimal::ZERO).is_err());
    }

    #[test]
    fn items_must_be_unique_and_positive() {
        assert!(validate_items(&[]).is_err());

        let a = item(5, Decimal::ONE);
        let mut dup = a.clone();
        dup.quantity = Decimal::ONE;
        assert!(validate_items(&[a.clone(), dup]).is_err());

        let zero = item(0, Decimal::ONE);
        assert!(validate_items(&[zero]).is_err());

        assert!(validate_items(&[a]).is_ok());
    }
}
