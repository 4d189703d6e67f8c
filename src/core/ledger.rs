//! Exact decimal arithmetic over line items and document totals.
//!
//! Rounding is half-up to [`AMOUNT_SCALE`] places and happens once per derived
//! line value. Document totals are plain sums of those rounded values, so
//! `grand_total == Σ net + Σ tax` holds exactly.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use super::error::LedgerError;
use super::tax_rules::TaxRule;
use super::types::*;

/// Decimal places for currency amounts.
pub const AMOUNT_SCALE: u32 = 2;

/// Derived amounts for one line, in computation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAmounts {
    /// `quantity × unit_price`, rounded.
    pub base: Decimal,
    /// `base × discount / 100`, rounded.
    pub discount: Decimal,
    /// `base − discount`.
    pub net: Decimal,
    /// `net × tax_rate / 100`, rounded.
    pub tax: Decimal,
    /// `net + tax`.
    pub gross: Decimal,
}

/// Round a currency amount half-up (commercial rounding) to two places.
pub fn round_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `value × rate / 100` without rounding. `None` when the product leaves the
/// decimal range.
pub fn percent_of(value: Decimal, rate: Decimal) -> Option<Decimal> {
    value.checked_mul(rate)?.checked_div(dec!(100))
}

fn within(value: Option<Decimal>, field: &str) -> Result<Decimal, LedgerError> {
    value.ok_or_else(|| LedgerError::Overflow {
        field: field.to_string(),
    })
}

/// Compute the derived amounts of a line for a given effective tax rate.
///
/// Fails with [`LedgerError::Overflow`] naming the first derived value that
/// does not fit a [`Decimal`].
pub fn line_amounts(
    quantity: Decimal,
    unit_price: Decimal,
    discount_pct: Decimal,
    tax_rate: Decimal,
) -> Result<LineAmounts, LedgerError> {
    let base = round_amount(within(quantity.checked_mul(unit_price), "base")?);
    let discount = round_amount(within(percent_of(base, discount_pct), "discount_amount")?);
    let net = within(base.checked_sub(discount), "net_amount")?;
    let tax = round_amount(within(percent_of(net, tax_rate), "tax_amount")?);
    let gross = within(net.checked_add(tax), "gross_total")?;
    Ok(LineAmounts {
        base,
        discount,
        net,
        tax,
        gross,
    })
}

/// Recompute one line's derived fields in place.
///
/// The tax rule decides the effective rate, which is written back to
/// `tax_rate` so the line stays self-consistent. On overflow the line is left
/// untouched.
pub fn compute_line(line: &mut LineItem, rule: &TaxRule) -> Result<(), LedgerError> {
    let rate = rule.rate_for(line);
    let amounts = line_amounts(line.quantity, line.unit_price, line.discount, rate)?;
    line.tax_rate = rate;
    line.discount_amount = amounts.discount;
    line.net_amount = amounts.net;
    line.tax_amount = amounts.tax;
    line.gross_total = amounts.gross;
    Ok(())
}

fn checked_sum(
    lines: &[LineItem],
    amount: impl Fn(&LineItem) -> Decimal,
    field: &str,
) -> Result<Decimal, LedgerError> {
    lines.iter().try_fold(Decimal::ZERO, |acc, line| {
        within(acc.checked_add(amount(line)), field)
    })
}

/// Aggregate already-computed lines into document totals.
pub fn sum_totals(lines: &[LineItem]) -> Result<InvoiceTotals, LedgerError> {
    let subtotal = checked_sum(lines, |l| l.net_amount, "totals.subtotal")?;
    let total_tax = checked_sum(lines, |l| l.tax_amount, "totals.total_tax")?;
    let total_discount = checked_sum(lines, |l| l.discount_amount, "totals.total_discount")?;
    Ok(InvoiceTotals {
        subtotal,
        total_tax,
        total_discount,
        grand_total: within(subtotal.checked_add(total_tax), "totals.grand_total")?,
    })
}

/// Recompute every line and the document totals using each line's own rate.
///
/// Idempotent: running it twice yields identical derived fields.
pub fn compute_totals(invoice: &mut InvoiceDocument) -> Result<InvoiceTotals, LedgerError> {
    compute_totals_with(invoice, &TaxRule::LineRate)
}

/// Recompute every line and the document totals under an explicit tax rule.
pub fn compute_totals_with(
    invoice: &mut InvoiceDocument,
    rule: &TaxRule,
) -> Result<InvoiceTotals, LedgerError> {
    for (index, line) in invoice.lines.iter_mut().enumerate() {
        compute_line(line, rule).map_err(|e| e.within(&format!("lines[{index}]")))?;
    }
    invoice.totals = sum_totals(&invoice.lines)?;
    tracing::debug!(
        invoice = %invoice.number,
        lines = invoice.lines.len(),
        grand_total = %invoice.totals.grand_total,
        "computed invoice totals"
    );
    Ok(invoice.totals)
}

/// Exact comparison of stated against recomputed totals. No epsilon.
pub fn totals_match(stated: &InvoiceTotals, recomputed: &InvoiceTotals) -> bool {
    stated == recomputed
}

/// Format an amount with a fixed two-place scale: `119` → `"119.00"`.
///
/// Never emits thousands separators or exponent notation.
pub fn format_amount(value: Decimal) -> String {
    let mut rounded = round_amount(value);
    rounded.rescale(AMOUNT_SCALE);
    rounded.to_string()
}

/// Format a decimal with at least two places, trailing zeros beyond that
/// stripped: `19` → `"19.00"`, `0.005` → `"0.005"`.
pub fn format_decimal(d: Decimal) -> String {
    let s = d.normalize().to_string();
    if let Some(dot_pos) = s.find('.') {
        let decimals = s.len() - dot_pos - 1;
        if decimals < 2 {
            format!("{s}{}", "0".repeat(2 - decimals))
        } else {
            s
        }
    } else {
        format!("{s}.00")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_nineteen_percent() {
        let a = line_amounts(dec!(1), dec!(100.00), dec!(0), dec!(19)).unwrap();
        assert_eq!(a.net, dec!(100.00));
        assert_eq!(a.tax, dec!(19.00));
        assert_eq!(a.gross, dec!(119.00));
    }

    #[test]
    fn discount_applies_before_tax() {
        let a = line_amounts(dec!(1), dec!(50), dec!(10), dec!(20)).unwrap();
        assert_eq!(a.discount, dec!(5));
        assert_eq!(a.net, dec!(45));
        assert_eq!(a.tax, dec!(9));
        assert_eq!(a.gross, dec!(54));
    }

    #[test]
    fn rounding_is_half_up() {
        assert_eq!(round_amount(dec!(0.005)), dec!(0.01));
        assert_eq!(round_amount(dec!(0.004)), dec!(0.00));
        assert_eq!(round_amount(dec!(-0.005)), dec!(-0.01));
        // 3 × 3.33 = 9.99; 19% = 1.8981 → 1.90
        let a = line_amounts(dec!(3), dec!(3.33), dec!(0), dec!(19)).unwrap();
        assert_eq!(a.tax, dec!(1.90));
    }

    #[test]
    fn oversized_product_is_an_error() {
        let quantity = Decimal::from(100_000_000_000_000_000_u64);
        let unit_price = Decimal::from(1_000_000_000_000_000_u64);
        let err = line_amounts(quantity, unit_price, dec!(0), dec!(19)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Overflow {
                field: "base".into()
            }
        );
    }

    #[test]
    fn tax_on_near_maximum_net_is_an_error() {
        let err = line_amounts(dec!(1), Decimal::MAX, dec!(0), dec!(19)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Overflow {
                field: "tax_amount".into()
            }
        );
    }

    #[test]
    fn format_amount_fixed_scale() {
        assert_eq!(format_amount(dec!(119)), "119.00");
        assert_eq!(format_amount(dec!(19.000000000002)), "19.00");
        assert_eq!(format_amount(dec!(1234567.5)), "1234567.50");
        assert_eq!(format_amount(dec!(0)), "0.00");
    }

    #[test]
    fn format_decimal_cases() {
        assert_eq!(format_decimal(dec!(100)), "100.00");
        assert_eq!(format_decimal(dec!(1500.0)), "1500.00");
        assert_eq!(format_decimal(dec!(49.90)), "49.90");
        assert_eq!(format_decimal(dec!(0.005)), "0.005");
        assert_eq!(format_decimal(dec!(19)), "19.00");
    }

    #[test]
    fn totals_match_is_exact() {
        let a = InvoiceTotals {
            subtotal: dec!(100.00),
            total_tax: dec!(19.00),
            total_discount: dec!(0),
            grand_total: dec!(119.00),
        };
        let mut b = a;
        assert!(totals_match(&a, &b));
        b.grand_total = dec!(119.000000001);
        assert!(!totals_match(&a, &b));
    }
}
