use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::error::{ValidationError, ValidationFailure};
use super::ledger;
use super::types::*;
use super::validation;

/// Builder for constructing invoices.
///
/// ```
/// use zugferd_pipeline::core::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let invoice = InvoiceBuilder::new("INV-2025-001", NaiveDate::from_ymd_opt(2025, 7, 14).unwrap())
///     .due_date(NaiveDate::from_ymd_opt(2025, 8, 13).unwrap())
///     .seller(PartyBuilder::new("ACME GmbH", AddressBuilder::new("Berlin", "DE").build())
///         .vat_id("DE123456789")
///         .build())
///     .buyer(PartyBuilder::new("Kunde AG", AddressBuilder::new("München", "DE").build()).build())
///     .add_line(LineItemBuilder::new("1", "Consulting", dec!(1), dec!(100.00))
///         .tax_rate(dec!(19))
///         .build())
///     .build()
///     .unwrap();
///
/// assert_eq!(invoice.totals.grand_total, dec!(119.00));
/// ```
pub struct InvoiceBuilder {
    number: String,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    currency: Currency,
    seller: Option<Party>,
    buyer: Option<Party>,
    lines: Vec<LineItem>,
    profile: String,
    language: String,
    notes: Vec<String>,
}

impl InvoiceBuilder {
    pub fn new(number: impl Into<String>, issue_date: NaiveDate) -> Self {
        Self {
            number: number.into(),
            issue_date: Some(issue_date),
            due_date: None,
            currency: Currency::from_code("EUR"),
            seller: None,
            buyer: None,
            lines: Vec::new(),
            profile: "EN16931".to_string(),
            language: "en".to_string(),
            notes: Vec::new(),
        }
    }

    pub fn due_date(mut self, date: NaiveDate) -> Self {
        self.due_date = Some(date);
        self
    }

    /// Set the currency code; the symbol is looked up.
    pub fn currency(mut self, code: impl Into<String>) -> Self {
        self.currency = Currency::from_code(code);
        self
    }

    pub fn currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.currency.symbol = symbol.into();
        self
    }

    pub fn seller(mut self, party: Party) -> Self {
        self.seller = Some(party);
        self
    }

    pub fn buyer(mut self, party: Party) -> Self {
        self.buyer = Some(party);
        self
    }

    pub fn add_line(mut self, line: LineItem) -> Self {
        self.lines.push(line);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Build the invoice, computing totals and running validation.
    /// Returns all validation errors (not just the first).
    pub fn build(self) -> Result<InvoiceDocument, ValidationFailure> {
        let invoice = self.build_unchecked()?;
        let errors = validation::validate_invoice(&invoice);
        if !errors.is_empty() {
            return Err(ValidationFailure::new(errors));
        }
        Ok(invoice)
    }

    /// Build with totals computed but without business-rule validation.
    /// Only the presence of both parties and representable totals are
    /// enforced.
    pub fn build_unchecked(self) -> Result<InvoiceDocument, ValidationFailure> {
        let mut missing = Vec::new();
        if self.seller.is_none() {
            missing.push(ValidationError::new("seller", "seller is required"));
        }
        if self.buyer.is_none() {
            missing.push(ValidationError::new("buyer", "buyer is required"));
        }
        let (Some(seller), Some(buyer)) = (self.seller, self.buyer) else {
            return Err(ValidationFailure::new(missing));
        };

        let mut invoice = InvoiceDocument {
            number: self.number,
            issue_date: self.issue_date,
            due_date: self.due_date,
            currency: self.currency,
            seller,
            buyer,
            lines: self.lines,
            totals: InvoiceTotals::default(),
            profile: self.profile,
            language: self.language,
            notes: self.notes,
        };
        ledger::compute_totals(&mut invoice)?;
        Ok(invoice)
    }
}

/// Builder for Party (seller/buyer).
pub struct PartyBuilder {
    name: String,
    vat_id: Option<String>,
    address: Address,
}

impl PartyBuilder {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            vat_id: None,
            address,
        }
    }

    pub fn vat_id(mut self, id: impl Into<String>) -> Self {
        self.vat_id = Some(id.into());
        self
    }

    pub fn build(self) -> Party {
        Party {
            name: self.name,
            vat_id: self.vat_id,
            address: self.address,
        }
    }
}

/// Builder for Address.
pub struct AddressBuilder {
    street: Option<String>,
    city: String,
    postal_code: Option<String>,
    country: String,
}

impl AddressBuilder {
    pub fn new(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            street: None,
            city: city.into(),
            postal_code: None,
            country: country.into(),
        }
    }

    pub fn street(mut self, street: impl Into<String>) -> Self {
        self.street = Some(street.into());
        self
    }

    pub fn postal_code(mut self, code: impl Into<String>) -> Self {
        self.postal_code = Some(code.into());
        self
    }

    pub fn build(self) -> Address {
        Address {
            street: self.street,
            city: self.city,
            postal_code: self.postal_code,
            country: self.country,
        }
    }
}

/// Builder for LineItem. Derived amounts start at zero until totals are computed.
pub struct LineItemBuilder {
    id: String,
    description: String,
    quantity: Decimal,
    unit: String,
    unit_price: Decimal,
    discount: Decimal,
    tax_rate: Decimal,
}

impl LineItemBuilder {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            quantity,
            unit: "C62".to_string(),
            unit_price,
            discount: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
        }
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Discount percentage (0–100).
    pub fn discount(mut self, percent: Decimal) -> Self {
        self.discount = percent;
        self
    }

    /// Tax rate percentage (0–100).
    pub fn tax_rate(mut self, percent: Decimal) -> Self {
        self.tax_rate = percent;
        self
    }

    pub fn build(self) -> LineItem {
        LineItem {
            id: self.id,
            description: self.description,
            quantity: self.quantity,
            unit: self.unit,
            unit_price: self.unit_price,
            discount: self.discount,
            tax_rate: self.tax_rate,
            discount_amount: Decimal::ZERO,
            net_amount: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            gross_total: Decimal::ZERO,
        }
    }
}
