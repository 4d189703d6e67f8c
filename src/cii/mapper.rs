use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use super::profile::ZugferdProfile;
use super::tree::*;
use crate::core::{InvoiceDocument, LineItem, Party, format_amount, format_decimal};

/// UNTDID 1001 commercial invoice.
pub const COMMERCIAL_INVOICE: &str = "380";

/// Category of a single mapping violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ViolationKind {
    /// A schema-mandatory value is empty or absent.
    Missing,
    /// The issue date is unset and cannot be written as `YYYYMMDD`.
    InvalidDateFormat,
    /// The profile string names no known profile.
    UnknownProfile,
    /// A value is present but not acceptable for its element.
    InvalidValue,
}

impl ViolationKind {
    fn tag(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::InvalidDateFormat => "invalid-date-format",
            Self::UnknownProfile => "unknown-profile",
            Self::InvalidValue => "invalid-value",
        }
    }
}

/// One mandatory-field problem, addressed by schema path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingViolation {
    pub path: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl MappingViolation {
    fn new(path: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for MappingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind.tag(), self.path, self.message)
    }
}

/// Every violation found while mapping one invoice.
#[derive(Debug, Clone, Error)]
#[error("mapping failed: {}", join(.violations))]
pub struct MappingError {
    pub violations: Vec<MappingViolation>,
}

impl MappingError {
    /// Whether a violation of `kind` was reported for `path`.
    pub fn has(&self, path: &str, kind: ViolationKind) -> bool {
        self.violations
            .iter()
            .any(|v| v.path == path && v.kind == kind)
    }
}

fn join(violations: &[MappingViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Translate an invoice into a compliance document tree.
///
/// Pure and deterministic. Never fills defaults: an unset issue date is an
/// [`ViolationKind::InvalidDateFormat`] violation. All violations are
/// collected before returning.
pub fn map_to_compliance_tree(
    invoice: &InvoiceDocument,
) -> Result<ComplianceDocumentTree, MappingError> {
    let mut violations = Vec::new();

    // 1. Profile / guideline
    let profile = if invoice.profile.trim().is_empty() {
        violations.push(MappingViolation::new(
            paths::GUIDELINE_ID,
            ViolationKind::Missing,
            "profile must not be empty",
        ));
        None
    } else {
        let parsed = ZugferdProfile::parse(&invoice.profile);
        if parsed.is_none() {
            violations.push(MappingViolation::new(
                paths::GUIDELINE_ID,
                ViolationKind::UnknownProfile,
                format!("unknown profile '{}'", invoice.profile),
            ));
        }
        parsed
    };

    // 2. Parties
    let seller = map_party(
        &invoice.seller,
        paths::SELLER_NAME,
        paths::SELLER_COUNTRY,
        &mut violations,
    );
    let buyer = map_party(
        &invoice.buyer,
        paths::BUYER_NAME,
        paths::BUYER_COUNTRY,
        &mut violations,
    );
    if profile.is_some_and(|p| p.requires_seller_vat_id()) && seller.vat_id.is_none() {
        violations.push(MappingViolation::new(
            paths::SELLER_VAT_ID,
            ViolationKind::Missing,
            "seller VAT identifier is required by this profile",
        ));
    }

    // 3. Document id
    if invoice.number.trim().is_empty() {
        violations.push(MappingViolation::new(
            paths::DOCUMENT_ID,
            ViolationKind::Missing,
            "invoice number must not be empty",
        ));
    }

    // 4. Issue date
    let issue_date = match invoice.issue_date {
        Some(date) => format_date(date),
        None => {
            violations.push(MappingViolation::new(
                paths::ISSUE_DATE,
                ViolationKind::InvalidDateFormat,
                "issue date is unset",
            ));
            String::new()
        }
    };

    // 5. Grand total
    let totals = invoice.totals;
    if totals.grand_total.is_sign_negative() && !totals.grand_total.is_zero() {
        violations.push(MappingViolation::new(
            paths::GRAND_TOTAL,
            ViolationKind::InvalidValue,
            format!(
                "grand total {} must not be negative for a commercial invoice",
                totals.grand_total
            ),
        ));
    }

    // 6. Currency, verbatim
    let currency = invoice.currency.code.clone();
    if currency.trim().is_empty() {
        violations.push(MappingViolation::new(
            paths::CURRENCY,
            ViolationKind::Missing,
            "currency code must not be empty",
        ));
    } else if currency.chars().count() != 3 {
        violations.push(MappingViolation::new(
            paths::CURRENCY,
            ViolationKind::InvalidValue,
            format!("currency code '{currency}' must have 3 letters"),
        ));
    }

    // 7. One tax detail per line, in source order
    let tax_details = invoice.lines.iter().map(map_tax_detail).collect();

    // 8. Line items
    let with_lines = profile.is_none_or(|p| p.has_line_items());
    let line_items = if with_lines {
        if invoice.lines.is_empty() {
            violations.push(MappingViolation::new(
                paths::LINE_ITEMS,
                ViolationKind::Missing,
                "at least one line item is required",
            ));
        }
        invoice
            .lines
            .iter()
            .enumerate()
            .map(|(i, line)| map_line(line, i, &mut violations))
            .collect()
    } else {
        Vec::new()
    };

    if !violations.is_empty() {
        tracing::warn!(
            invoice = %invoice.number,
            violations = violations.len(),
            "invoice could not be mapped"
        );
        return Err(MappingError { violations });
    }

    // Only reachable with a parsed profile.
    let guideline_id = profile.map(|p| p.urn()).unwrap_or_default().to_string();
    let tree = ComplianceDocumentTree {
        context: DocumentContext { guideline_id },
        header: DocumentHeader {
            id: invoice.number.clone(),
            type_code: COMMERCIAL_INVOICE.to_string(),
            issue_date,
            notes: invoice.notes.clone(),
        },
        transaction: TradeTransaction {
            line_items,
            agreement: TradeAgreement { seller, buyer },
            settlement: TradeSettlement {
                currency_code: currency,
                tax_details,
                due_date: invoice.due_date.map(format_date),
                summation: MonetarySummation {
                    line_total: format_amount(totals.subtotal),
                    tax_basis_total: format_amount(totals.subtotal),
                    tax_total: format_amount(totals.total_tax),
                    grand_total: format_amount(totals.grand_total),
                    due_payable: format_amount(totals.grand_total),
                },
            },
        },
    };
    tracing::debug!(
        invoice = %invoice.number,
        guideline = %tree.context.guideline_id,
        lines = tree.transaction.line_items.len(),
        "mapped invoice to compliance tree"
    );
    Ok(tree)
}

/// Date in UN/CEFACT format 102.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

fn map_party(
    party: &Party,
    name_path: &str,
    country_path: &str,
    violations: &mut Vec<MappingViolation>,
) -> TradePartyNode {
    if party.name.trim().is_empty() {
        violations.push(MappingViolation::new(
            name_path,
            ViolationKind::Missing,
            "party name must not be empty",
        ));
    }
    if party.address.country.trim().is_empty() {
        violations.push(MappingViolation::new(
            country_path,
            ViolationKind::Missing,
            "address country must not be empty",
        ));
    }
    TradePartyNode {
        name: party.name.clone(),
        address: PostalAddressNode {
            postcode: non_empty(party.address.postal_code.as_deref()),
            line_one: non_empty(party.address.street.as_deref()),
            city: non_empty(Some(party.address.city.as_str())),
            country_id: party.address.country.clone(),
        },
        vat_id: non_empty(party.vat_id.as_deref()),
    }
}

fn map_tax_detail(line: &LineItem) -> TaxDetailNode {
    TaxDetailNode {
        calculated_amount: format_amount(line.tax_amount),
        type_code: "VAT".to_string(),
        basis_amount: format_amount(line.net_amount),
        category_code: category_code(line.tax_rate).to_string(),
        rate_percent: line.tax_rate,
    }
}

fn map_line(
    line: &LineItem,
    index: usize,
    violations: &mut Vec<MappingViolation>,
) -> LineItemNode {
    if line.description.trim().is_empty() {
        violations.push(MappingViolation::new(
            format!("{}[{index}]/SpecifiedTradeProduct/Name", paths::LINE_ITEMS),
            ViolationKind::Missing,
            "line description must not be empty",
        ));
    }
    LineItemNode {
        line_id: line.id.clone(),
        name: line.description.clone(),
        net_price: format_decimal(line.unit_price),
        billed_quantity: line.quantity,
        unit_code: line.unit.clone(),
        tax_type_code: "VAT".to_string(),
        tax_category_code: category_code(line.tax_rate).to_string(),
        tax_rate: line.tax_rate,
        line_total: format_amount(line.net_amount),
    }
}

/// UNCL 5305: standard rate `S`, zero rated `Z`.
fn category_code(rate: Decimal) -> &'static str {
    if rate.is_zero() { "Z" } else { "S" }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
