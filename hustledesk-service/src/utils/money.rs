//! Minor-unit money arithmetic.
//!
//! Amounts are `i64` cents. Fractional intermediate values (quantities, tax
//! rates, pro-rated discounts) are computed in `Decimal` and rounded half away
//! from zero exactly once, when they become cents again.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Smallest amount M-Pesa accepts (KES 1).
pub const MPESA_MIN_AMOUNT_CENTS: i64 = 100;
/// Largest single M-Pesa transaction (KES 70,000).
pub const MPESA_MAX_AMOUNT_CENTS: i64 = 7_000_000;

/// Discounted, taxed totals for a subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub after_discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

fn round_cents(value: Decimal) -> i64 {
    // Inputs are bounded by request validation, so saturation is unreachable in practice.
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(if value.is_sign_negative() { i64::MIN } else { i64::MAX })
}

/// Apply a discount then tax at `tax_rate` percent.
pub fn calculate_total(subtotal_cents: i64, discount_cents: i64, tax_rate: Decimal) -> Totals {
    let after_discount_cents = subtotal_cents - discount_cents;
    let tax_cents = round_cents(Decimal::from(after_discount_cents) * tax_rate / Decimal::ONE_HUNDRED);
    Totals {
        after_discount_cents,
        tax_cents,
        total_cents: after_discount_cents + tax_cents,
    }
}

/// Price of `quantity` units at `unit_price_cents`, rounded to the cent.
pub fn line_total(unit_price_cents: i64, quantity: Decimal) -> i64 {
    round_cents(Decimal::from(unit_price_cents) * quantity)
}

/// Tax owed on one line after it absorbs its proportional share of an
/// order-level discount.
pub fn pro_rated_line_tax(
    line_total_cents: i64,
    subtotal_cents: i64,
    discount_cents: i64,
    tax_rate: Decimal,
) -> i64 {
    if subtotal_cents <= 0 || tax_rate.is_zero() {
        return 0;
    }
    let line = Decimal::from(line_total_cents);
    let share = Decimal::from(discount_cents) * line / Decimal::from(subtotal_cents);
    round_cents((line - share) * tax_rate / Decimal::ONE_HUNDRED)
}

/// Whole shillings for the M-Pesa API, never less than 1.
pub fn format_for_mpesa(cents: i64) -> i64 {
    round_cents(Decimal::from(cents) / Decimal::ONE_HUNDRED).max(1)
}

/// Convert a shilling amount reported by M-Pesa into cents.
pub fn cents_from_shillings(amount: Decimal) -> i64 {
    round_cents(amount * Decimal::ONE_HUNDRED)
}

pub fn is_valid_mpesa_amount(cents: i64) -> bool {
    (MPESA_MIN_AMOUNT_CENTS..=MPESA_MAX_AMOUNT_CENTS).contains(&cents)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn total_with_discount_and_vat() {
        let t = calculate_total(10_000, 1_000, d("16"));
        assert_eq!(t.after_discount_cents, 9_000);
        assert_eq!(t.tax_cents, 1_440);
        assert_eq!(t.total_cents, 10_440);
    }

    #[test]
    fn tax_rounds_half_away_from_zero() {
        // 1 * 50% = 0.5 -> 1
        assert_eq!(calculate_total(1, 0, d("50")).tax_cents, 1);
        // 3 * 50% = 1.5 -> 2
        assert_eq!(calculate_total(3, 0, d("50")).tax_cents, 2);
    }

    #[test]
    fn fractional_quantities() {
        assert_eq!(line_total(15_000, d("1.5")), 22_500);
        assert_eq!(line_total(333, d("0.5")), 167);
        assert_eq!(line_total(100, d("0.01")), 1);
    }

    #[test]
    fn discount_is_spread_across_lines() {
        // Two lines of 6000 and 4000 with a 1000 discount: 600 / 400 share.
        assert_eq!(pro_rated_line_tax(6_000, 10_000, 1_000, d("16")), 864);
        assert_eq!(pro_rated_line_tax(4_000, 10_000, 1_000, d("0")), 0);
        assert_eq!(pro_rated_line_tax(4_000, 10_000, 1_000, d("16")), 576);
        assert_eq!(pro_rated_line_tax(0, 0, 0, d("16")), 0);
    }

    #[test]
    fn mpesa_amounts_are_whole_shillings() {
        assert_eq!(format_for_mpesa(150_000), 1_500);
        assert_eq!(format_for_mpesa(150_050), 1_501);
        assert_eq!(format_for_mpesa(149), 1);
        assert_eq!(format_for_mpesa(10), 1);
        assert_eq!(format_for_mpesa(0), 1);
    }

    #[test]
    fn webhook_shillings_to_cents() {
        assert_eq!(cents_from_shillings(d("1500")), 150_000);
        assert_eq!(cents_from_shillings(d("10.005")), 1_001);
    }

    #[test]
    fn mpesa_limits() {
        assert!(!is_valid_mpesa_amount(99));
        assert!(is_valid_mpesa_amount(MPESA_MIN_AMOUNT_CENTS));
        assert!(is_valid_mpesa_amount(MPESA_MAX_AMOUNT_CENTS));
        assert!(!is_valid_mpesa_amount(MPESA_MAX_AMOUNT_CENTS + 1));
    }
}
