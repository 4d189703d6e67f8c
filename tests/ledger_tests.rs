//! Decimal ledger: worked examples, rounding, tax rules and arithmetic
//! invariants.
//!
//! Run with: `cargo test --features core --test ledger_tests`

#![cfg(feature = "core")]

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use zugferd_pipeline::core::*;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn party(name: &str, country: &str) -> Party {
    PartyBuilder::new(name, AddressBuilder::new("Berlin", country).build()).build()
}

fn invoice_with(lines: Vec<LineItem>) -> InvoiceDocument {
    let mut builder = InvoiceBuilder::new("RE-2025-001", date(2025, 7, 14))
        .due_date(date(2025, 8, 13))
        .seller(party("ACME GmbH", "DE"))
        .buyer(party("Kunde AG", "AT"));
    for line in lines {
        builder = builder.add_line(line);
    }
    builder.build_unchecked().unwrap()
}

fn two_line_invoice() -> InvoiceDocument {
    invoice_with(vec![
        LineItemBuilder::new("A", "Consulting", dec!(1), dec!(50))
            .discount(dec!(10))
            .tax_rate(dec!(20))
            .build(),
        LineItemBuilder::new("B", "Licence", dec!(2), dec!(100))
            .tax_rate(dec!(10))
            .build(),
    ])
}

// ---------------------------------------------------------------------------
// Worked examples
// ---------------------------------------------------------------------------

#[test]
fn two_line_worked_example() {
    let inv = two_line_invoice();

    assert_eq!(inv.lines[0].discount_amount, dec!(5.00));
    assert_eq!(inv.lines[0].net_amount, dec!(45.00));
    assert_eq!(inv.lines[0].tax_amount, dec!(9.00));
    assert_eq!(inv.lines[0].gross_total, dec!(54.00));

    assert_eq!(inv.lines[1].net_amount, dec!(200.00));
    assert_eq!(inv.lines[1].tax_amount, dec!(20.00));

    assert_eq!(inv.totals.subtotal, dec!(245));
    assert_eq!(inv.totals.total_tax, dec!(29));
    assert_eq!(inv.totals.total_discount, dec!(5));
    assert_eq!(inv.totals.grand_total, dec!(274));
}

#[test]
fn single_line_nineteen_percent() {
    let inv = invoice_with(vec![
        LineItemBuilder::new("1", "Beratung", dec!(1), dec!(100))
            .tax_rate(dec!(19))
            .build(),
    ]);
    assert_eq!(inv.totals.total_tax, dec!(19.00));
    assert_eq!(format_amount(inv.totals.grand_total), "119.00");
}

#[test]
fn zero_rate_line_has_no_tax() {
    let inv = invoice_with(vec![
        LineItemBuilder::new("1", "Export", dec!(3), dec!(33.33)).build(),
    ]);
    assert_eq!(inv.totals.total_tax, Decimal::ZERO);
    assert_eq!(inv.totals.grand_total, dec!(99.99));
}

#[test]
fn full_discount_zeroes_the_line() {
    let inv = invoice_with(vec![
        LineItemBuilder::new("1", "Gift", dec!(1), dec!(80))
            .discount(dec!(100))
            .tax_rate(dec!(19))
            .build(),
    ]);
    assert_eq!(inv.lines[0].net_amount, Decimal::ZERO);
    assert_eq!(inv.totals.total_discount, dec!(80));
    assert_eq!(inv.totals.grand_total, Decimal::ZERO);
}

// ---------------------------------------------------------------------------
// Rounding and formatting
// ---------------------------------------------------------------------------

#[test]
fn rounding_is_half_up() {
    assert_eq!(round_amount(dec!(0.005)), dec!(0.01));
    assert_eq!(round_amount(dec!(0.004)), dec!(0.00));
    assert_eq!(round_amount(dec!(2.675)), dec!(2.68));
    assert_eq!(round_amount(dec!(-2.675)), dec!(-2.68));
}

#[test]
fn line_tax_rounds_once() {
    // 3 × 0.35 = 1.05; 1.05 × 19% = 0.1995 → 0.20
    let amounts = line_amounts(dec!(3), dec!(0.35), Decimal::ZERO, dec!(19)).unwrap();
    assert_eq!(amounts.net, dec!(1.05));
    assert_eq!(amounts.tax, dec!(0.20));
    assert_eq!(amounts.gross, dec!(1.25));
}

#[test]
fn amounts_never_show_float_artifacts() {
    let amounts = line_amounts(dec!(0.1), dec!(0.2), Decimal::ZERO, dec!(19)).unwrap();
    assert_eq!(format_amount(amounts.net), "0.02");
    assert_eq!(format_amount(dec!(19.000000000002)), "19.00");
    assert_eq!(format_amount(dec!(1234567.8)), "1234567.80");
}

#[test]
fn decimal_formatting_keeps_two_places() {
    assert_eq!(format_decimal(dec!(19)), "19.00");
    assert_eq!(format_decimal(dec!(7.5)), "7.50");
    assert_eq!(format_decimal(dec!(0.125)), "0.125");
    assert_eq!(format_decimal(dec!(2.500)), "2.50");
}

// ---------------------------------------------------------------------------
// Tax rules
// ---------------------------------------------------------------------------

#[test]
fn percentage_rule_overrides_line_rates() {
    let mut inv = two_line_invoice();
    let totals = compute_totals_with(&mut inv, &TaxRule::Percentage(dec!(19))).unwrap();
    // 45 × 19% = 8.55; 200 × 19% = 38.00
    assert_eq!(totals.total_tax, dec!(46.55));
    assert!(inv.lines.iter().all(|l| l.tax_rate == dec!(19)));
}

#[test]
fn rule_is_resolved_from_invoice_language() {
    let rules = TaxRules::new().with_rule("de", TaxRule::Percentage(dec!(7)));
    let mut inv = two_line_invoice();
    inv.language = "de-DE".into();
    let prepared = prepare_invoice(inv, &Defaults::default(), &rules, date(2025, 7, 14)).unwrap();
    // 245 × 7%, rounded per line: 3.15 + 14.00
    assert_eq!(prepared.totals.total_tax, dec!(17.15));
}

#[test]
fn overflowing_quantity_times_price_is_an_error() {
    let line = LineItemBuilder::new("1", "Item", Decimal::from(100_000_000_000_000_000_u64), dec!(0))
        .tax_rate(dec!(19))
        .build();
    let mut inv = invoice_with(vec![line]);
    inv.lines[0].unit_price = Decimal::from(1_000_000_000_000_000_u64);

    let err = compute_totals(&mut inv).unwrap_err();
    assert_eq!(
        err,
        LedgerError::Overflow {
            field: "lines[0].base".into()
        }
    );
    assert_eq!(inv.lines[0].net_amount, Decimal::ZERO);
}

#[test]
fn overflowing_document_sum_is_an_error() {
    let half = Decimal::MAX / dec!(2);
    let lines = (1..=3)
        .map(|n| {
            LineItemBuilder::new(n.to_string(), "Item", dec!(1), dec!(1))
                .tax_rate(Decimal::ZERO)
                .build()
        })
        .collect();
    let mut inv = invoice_with(lines);
    for line in &mut inv.lines {
        line.net_amount = half;
    }
    assert!(matches!(
        sum_totals(&inv.lines),
        Err(LedgerError::Overflow { field }) if field == "totals.subtotal"
    ));
}

#[test]
fn builder_reports_overflow_as_validation_failure() {
    let line = LineItemBuilder::new(
        "1",
        "Item",
        Decimal::from(100_000_000_000_000_000_u64),
        Decimal::from(1_000_000_000_000_000_u64),
    )
    .tax_rate(dec!(19))
    .build();
    let err = InvoiceBuilder::new("RE-1", date(2025, 7, 14))
        .seller(party("ACME GmbH", "DE"))
        .buyer(party("Kunde AG", "AT"))
        .add_line(line)
        .build_unchecked()
        .unwrap_err();
    assert!(err.has_field("lines[0].base"));
}

// ---------------------------------------------------------------------------
// Validation of stated totals
// ---------------------------------------------------------------------------

#[test]
fn stated_totals_must_match_exactly() {
    let mut inv = two_line_invoice();
    assert!(validate_arithmetic(&inv).is_empty());

    inv.totals.grand_total += dec!(0.01);
    let errors = validate_arithmetic(&inv);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, "totals.grand_total");
    assert_eq!(errors[0].rule.as_deref(), Some("BR-CO-15"));
}

#[test]
fn trailing_zero_scale_is_not_a_mismatch() {
    let inv = two_line_invoice();
    let mut stated = inv.totals;
    stated.grand_total = dec!(274.0000);
    assert!(totals_match(&stated, &inv.totals));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

fn amount() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn quantity() -> impl Strategy<Value = Decimal> {
    (1i64..100_000).prop_map(|milli| Decimal::new(milli, 3))
}

fn percent() -> impl Strategy<Value = Decimal> {
    (0i64..=10_000).prop_map(|basis| Decimal::new(basis, 2))
}

fn line() -> impl Strategy<Value = LineItem> {
    (quantity(), amount(), percent(), percent()).prop_map(|(qty, price, discount, rate)| {
        LineItemBuilder::new("1", "Item", qty, price)
            .discount(discount)
            .tax_rate(rate)
            .build()
    })
}

proptest! {
    #[test]
    fn grand_total_is_sum_of_rounded_lines(lines in prop::collection::vec(line(), 1..20)) {
        let inv = invoice_with(lines);
        let net: Decimal = inv.lines.iter().map(|l| l.net_amount).sum();
        let tax: Decimal = inv.lines.iter().map(|l| l.tax_amount).sum();
        prop_assert_eq!(inv.totals.subtotal, net);
        prop_assert_eq!(inv.totals.total_tax, tax);
        prop_assert_eq!(inv.totals.grand_total, net + tax);
    }

    #[test]
    fn recomputation_is_idempotent(lines in prop::collection::vec(line(), 1..20)) {
        let mut inv = invoice_with(lines);
        let first = inv.clone();
        compute_totals(&mut inv).unwrap();
        prop_assert_eq!(inv, first);
    }

    #[test]
    fn derived_amounts_have_two_places(q in quantity(), p in amount(), d in percent(), r in percent()) {
        let a = line_amounts(q, p, d, r).unwrap();
        for value in [a.base, a.discount, a.net, a.tax, a.gross] {
            prop_assert!(value.scale() <= 2);
        }
        prop_assert!(a.net >= Decimal::ZERO);
        prop_assert_eq!(a.net, a.base - a.discount);
    }

    #[test]
    fn formatted_amount_is_plain_decimal(p in amount()) {
        let s = format_amount(p);
        let (_, frac) = s.split_once('.').unwrap();
        prop_assert_eq!(frac.len(), 2);
        prop_assert!(!s.contains('e') && !s.contains(','));
    }
}
