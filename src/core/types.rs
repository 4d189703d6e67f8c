use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The canonical in-memory invoice.
///
/// Created by a loader or [`InvoiceBuilder`](super::InvoiceBuilder); mutated
/// only by total recomputation and default filling, then treated as
/// immutable for XML mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDocument {
    /// Invoice number (document id in the XML).
    pub number: String,
    /// Issue date. `None` is the unset value; only [`apply_defaults`](super::apply_defaults) fills it.
    pub issue_date: Option<NaiveDate>,
    /// Payment due date.
    pub due_date: Option<NaiveDate>,
    pub currency: Currency,
    pub seller: Party,
    pub buyer: Party,
    /// At least one line for a valid invoice.
    pub lines: Vec<LineItem>,
    /// Derived by [`compute_totals`](super::compute_totals).
    #[serde(default)]
    pub totals: InvoiceTotals,
    /// Profile / guideline identifier selecting the schema dialect
    /// (e.g. "EN16931" or a guideline URN).
    pub profile: String,
    /// Language / locale tag; selects the tax rule.
    #[serde(default)]
    pub language: String,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Invoice currency: ISO 4217 code plus display symbol.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    #[serde(default)]
    pub symbol: String,
}

impl Currency {
    /// Currency from a code, with the symbol looked up (falls back to the code).
    pub fn from_code(code: impl Into<String>) -> Self {
        let code = code.into();
        let symbol = super::currency_symbol(&code).to_string();
        Self { code, symbol }
    }
}

/// Seller or buyer. Owned by the enclosing invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    pub name: String,
    /// VAT identifier (e.g. "DE123456789").
    #[serde(default)]
    pub vat_id: Option<String>,
    pub address: Address,
}

/// Structured postal address. The country is mandatory for schema mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub street: Option<String>,
    pub city: String,
    #[serde(default)]
    pub postal_code: Option<String>,
    /// Country code (ISO 3166-1 alpha-2).
    pub country: String,
}

/// A single invoice line.
///
/// `quantity`, `unit_price`, `discount` and `tax_rate` are inputs; the
/// remaining amounts are derived and overwritten on every recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Opaque line identity.
    pub id: String,
    pub description: String,
    pub quantity: Decimal,
    /// Unit of measure (UNECE Rec 20), "C62" (one) by default.
    #[serde(default = "default_unit")]
    pub unit: String,
    pub unit_price: Decimal,
    /// Discount percentage, 0–100.
    #[serde(default)]
    pub discount: Decimal,
    /// Tax rate percentage, 0–100.
    #[serde(default)]
    pub tax_rate: Decimal,
    /// Derived: discount amount taken off `quantity × unit_price`.
    #[serde(default)]
    pub discount_amount: Decimal,
    /// Derived: discounted net amount.
    #[serde(default)]
    pub net_amount: Decimal,
    /// Derived: `net_amount × tax_rate / 100`.
    #[serde(default)]
    pub tax_amount: Decimal,
    /// Derived: `net_amount + tax_amount`.
    #[serde(default)]
    pub gross_total: Decimal,
}

fn default_unit() -> String {
    "C62".to_string()
}

/// Document totals. `grand_total` is always `subtotal + total_tax`, both
/// being sums of already-rounded line values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    /// Sum of discounted line net amounts.
    pub subtotal: Decimal,
    /// Sum of line tax amounts.
    pub total_tax: Decimal,
    /// Sum of line discount amounts.
    pub total_discount: Decimal,
    /// `subtotal + total_tax`.
    pub grand_total: Decimal,
}
