//! Turns requested order lines into priced lines and order totals.

use crate::dtos::sales::LineItemRequest;
use crate::models::{PricedLine, Product};
use crate::utils::money::{line_total, pro_rated_line_tax};
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingError {
    UnknownProduct(Uuid),
    DiscountExceedsSubtotal { discount_cents: i64, subtotal_cents: i64 },
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PricingError::UnknownProduct(id) => write!(f, "Product {} not found", id),
            PricingError::DiscountExceedsSubtotal { .. } => {
                write!(f, "Discount cannot exceed subtotal")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct PricedOrder {
    pub lines: Vec<PricedLine>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

/// Price `items` against the org's catalog.
///
/// Each product line absorbs its proportional share of the discount before
/// being taxed at the product's rate. Free-text lines carry no tax.
pub fn price_order(
    items: &[LineItemRequest],
    products: &[Product],
    discount_cents: i64,
) -> Result<PricedOrder, PricingError> {
    let by_id: HashMap<Uuid, &Product> = products.iter().map(|p| (p.product_id, p)).collect();

    let mut rated = Vec::with_capacity(items.len());
    for item in items {
        let rate = match item.product_id {
            Some(id) => by_id
                .get(&id)
                .map(|p| p.tax_rate)
                .ok_or(PricingError::UnknownProduct(id))?,
            None => Decimal::ZERO,
        };
        rated.push((item, rate, line_total(item.unit_price_cents, item.quantity)));
    }

    let subtotal_cents: i64 = rated.iter().map(|(_, _, total)| total).sum();
    if discount_cents > subtotal_cents {
        return Err(PricingError::DiscountExceedsSubtotal {
            discount_cents,
            subtotal_cents,
        });
    }

    let lines: Vec<PricedLine> = rated
        .into_iter()
        .map(|(item, rate, total_cents)| PricedLine {
            product_id: item.product_id,
            name: item.name.trim().to_string(),
            unit_price_cents: item.unit_price_cents,
            quantity: item.quantity,
            tax_cents: pro_rated_line_tax(total_cents, subtotal_cents, discount_cents, rate),
            total_cents,
        })
        .collect();

    let tax_cents = lines.iter().map(|l| l.tax_cents).sum::<i64>();

    Ok(PricedOrder {
        subtotal_cents,
        discount_cents,
        tax_cents,
        total_cents: subtotal_cents - discount_cents + tax_cents,
        lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(price_cents: i64, tax_rate: &str) -> Product {
        Product {
            product_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            name: "Item".to_string(),
            sku: None,
            price_cents,
            unit: "each".to_string(),
            tax_rate: tax_rate.parse().unwrap(),
            low_stock_threshold: 0,
            created_utc: Utc::now(),
            updated_utc: Utc::now(),
        }
    }

    fn line(product_id: Option<Uuid>, unit_price_cents: i64, qty: &str) -> LineItemRequest {
        LineItemRequest {
            product_id,
            name: "Line".to_string(),
            unit_price_cents,
            quantity: qty.parse().unwrap(),
        }
    }

    #[test]
    fn vat_applies_after_pro_rated_discount() {
        let soda = product(10_000, "16");
        let items = vec![
            line(Some(soda.product_id), 10_000, "3"),
            line(None, 10_000, "1"),
        ];

        let priced = price_order(&items, &[soda], 4_000).unwrap();
        assert_eq!(priced.subtotal_cents, 40_000);
        // Taxed line carries 3/4 of the discount: (30000 - 3000) * 16%.
        assert_eq!(priced.lines[0].tax_cents, 4_320);
        assert_eq!(priced.lines[1].tax_cents, 0);
        assert_eq!(priced.tax_cents, 4_320);
        assert_eq!(priced.total_cents, 40_000 - 4_000 + 4_320);
    }

    #[test]
    fn fractional_quantities_round_to_cents() {
        let sugar = product(18_050, "0");
        let items = vec![line(Some(sugar.product_id), 18_050, "0.5")];
        let priced = price_order(&items, &[sugar], 0).unwrap();
        assert_eq!(priced.subtotal_cents, 9_025);
        assert_eq!(priced.total_cents, 9_025);
    }

    #[test]
    fn rejects_discount_above_subtotal() {
        let items = vec![line(None, 500, "1")];
        assert_eq!(
            price_order(&items, &[], 501).unwrap_err(),
            PricingError::DiscountExceedsSubtotal {
                discount_cents: 501,
                subtotal_cents: 500
            }
        );
    }

    #[test]
    fn rejects_products_outside_the_catalog() {
        let stranger = Uuid::new_v4();
        let items = vec![line(Some(stranger), 500, "1")];
        assert_eq!(
            price_order(&items, &[], 0).unwrap_err(),
            PricingError::UnknownProduct(stranger)
        );
    }
}
