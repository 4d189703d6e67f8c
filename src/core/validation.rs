use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

use super::error::{ValidationError, ValidationFailure};
use super::ledger;
use super::tax_rules::TaxRules;
use super::types::*;

/// Validate an invoice before it enters the compliance pipeline.
/// Returns all validation errors found (not just the first).
pub fn validate_invoice(invoice: &InvoiceDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    // BR-02: An Invoice shall have an Invoice number
    if invoice.number.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "number",
            "invoice number must not be empty",
            "BR-02",
        ));
    }

    if invoice.issue_date.is_none() {
        errors.push(ValidationError::with_rule(
            "issue_date",
            "issue date must be set",
            "BR-03",
        ));
    }

    // BR-05: An Invoice shall have an Invoice currency code
    let code = &invoice.currency.code;
    if code.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "currency.code",
            "currency code must not be empty",
            "BR-05",
        ));
    } else if code.len() != 3 {
        errors.push(ValidationError::with_rule(
            "currency.code",
            "currency code must be 3 characters (ISO 4217)",
            "BR-05",
        ));
    } else if !super::currencies::is_known_currency_code(code) {
        errors.push(ValidationError::with_rule(
            "currency.code",
            format!("currency code '{code}' is not a known ISO 4217 code"),
            "BR-05",
        ));
    }

    validate_party(&invoice.seller, "seller", "BR-06", &mut errors);
    validate_party(&invoice.buyer, "buyer", "BR-07", &mut errors);

    // BR-16: An Invoice shall have at least one Invoice line
    if invoice.lines.is_empty() {
        errors.push(ValidationError::with_rule(
            "lines",
            "invoice must have at least one line item",
            "BR-16",
        ));
    }

    for (i, line) in invoice.lines.iter().enumerate() {
        validate_line(line, i, &mut errors);
    }

    if let (Some(issue), Some(due)) = (invoice.issue_date, invoice.due_date) {
        if due <= issue {
            errors.push(ValidationError::new(
                "due_date",
                format!("due date {due} must be after issue date {issue}"),
            ));
        }
    }

    errors.extend(validate_arithmetic(invoice));

    if !errors.is_empty() {
        tracing::warn!(
            invoice = %invoice.number,
            errors = errors.len(),
            "invoice failed validation"
        );
    }
    errors
}

/// Check stated totals against a fresh recomputation. Exact decimal equality.
pub fn validate_arithmetic(invoice: &InvoiceDocument) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let stated = invoice.totals;
    let mut scratch = invoice.clone();
    let recomputed = match ledger::compute_totals(&mut scratch) {
        Ok(totals) => totals,
        Err(overflow) => {
            errors.push(overflow.into());
            return errors;
        }
    };

    if ledger::totals_match(&stated, &recomputed) {
        return errors;
    }

    let checks = [
        ("totals.subtotal", stated.subtotal, recomputed.subtotal, "BR-CO-10"),
        ("totals.total_tax", stated.total_tax, recomputed.total_tax, "BR-CO-14"),
        (
            "totals.total_discount",
            stated.total_discount,
            recomputed.total_discount,
            "BR-CO-11",
        ),
        (
            "totals.grand_total",
            stated.grand_total,
            recomputed.grand_total,
            "BR-CO-15",
        ),
    ];
    for (field, have, want, rule) in checks {
        if have != want {
            errors.push(ValidationError::with_rule(
                field,
                format!("stated {have} does not match recomputed {want}"),
                rule,
            ));
        }
    }
    errors
}

fn validate_party(party: &Party, prefix: &str, rule: &str, errors: &mut Vec<ValidationError>) {
    if party.name.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.name"),
            "name must not be empty",
            rule,
        ));
    }

    validate_address(&party.address, &format!("{prefix}.address"), errors);
}

fn validate_address(address: &Address, prefix: &str, errors: &mut Vec<ValidationError>) {
    if address.city.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.city"),
            "city must not be empty",
            "BR-09",
        ));
    }

    let country = &address.country;
    if country.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.country"),
            "country code must not be empty",
            "BR-09",
        ));
    } else if country.len() != 2 {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.country"),
            "country code must be 2 characters (ISO 3166-1 alpha-2)",
            "BR-09",
        ));
    } else if !super::countries::is_known_country_code(country) {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.country"),
            format!("country code '{country}' is not a known ISO 3166-1 alpha-2 code"),
            "BR-09",
        ));
    }
}

fn validate_line(line: &LineItem, index: usize, errors: &mut Vec<ValidationError>) {
    let prefix = format!("lines[{index}]");

    if line.id.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.id"),
            "line identifier must not be empty",
            "BR-21",
        ));
    }

    if line.description.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.description"),
            "item description must not be empty",
            "BR-25",
        ));
    }

    if line.quantity <= Decimal::ZERO {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.quantity"),
            "quantity must be greater than zero",
            "BR-22",
        ));
    }

    if line.unit_price.is_sign_negative() {
        errors.push(ValidationError::with_rule(
            format!("{prefix}.unit_price"),
            "unit price must not be negative",
            "BR-27",
        ));
    }

    check_percentage(line.discount, &format!("{prefix}.discount"), errors);
    check_percentage(line.tax_rate, &format!("{prefix}.tax_rate"), errors);
}

fn check_percentage(value: Decimal, field: &str, errors: &mut Vec<ValidationError>) {
    if value < Decimal::ZERO || value > dec!(100) {
        errors.push(ValidationError::new(
            field,
            format!("percentage {value} must be between 0 and 100"),
        ));
    }
}

/// Values filled in for fields an invoice source left unset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// ISO 4217 code used when the invoice has none.
    pub default_currency: String,
    /// Days between issue and due date when no due date is given.
    pub default_due_days: u32,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            default_currency: "EUR".to_string(),
            default_due_days: 30,
        }
    }
}

/// Fill unset issue date, due date and currency.
///
/// This is the only place defaults are applied; later stages treat an
/// unset field as an error.
pub fn apply_defaults(invoice: &mut InvoiceDocument, defaults: &Defaults, today: NaiveDate) {
    let issue = *invoice.issue_date.get_or_insert(today);
    if invoice.due_date.is_none() {
        invoice.due_date = issue.checked_add_days(Days::new(u64::from(defaults.default_due_days)));
    }
    if invoice.currency.code.trim().is_empty() {
        invoice.currency = Currency::from_code(&defaults.default_currency);
    } else if invoice.currency.symbol.is_empty() {
        invoice.currency.symbol = super::currency_symbol(&invoice.currency.code).to_string();
    }
}

/// Default, recompute and validate an invoice in one step.
///
/// The tax rule is resolved from the invoice language once, then applied to
/// every line.
pub fn prepare_invoice(
    mut invoice: InvoiceDocument,
    defaults: &Defaults,
    rules: &TaxRules,
    today: NaiveDate,
) -> Result<InvoiceDocument, ValidationFailure> {
    apply_defaults(&mut invoice, defaults, today);
    let rule = rules.resolve(&invoice.language);
    ledger::compute_totals_with(&mut invoice, rule)?;

    let errors = validate_invoice(&invoice);
    if errors.is_empty() {
        Ok(invoice)
    } else {
        Err(ValidationFailure::new(errors))
    }
}
