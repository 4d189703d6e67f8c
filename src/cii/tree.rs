//! Typed mirror of the Cross Industry Invoice element hierarchy.
//!
//! Field order in each struct is the element order in the schema. Amounts
//! that the schema types as text are carried as pre-formatted strings;
//! quantities and percentages stay [`Decimal`].

use rust_decimal::Decimal;

/// `rsm:CrossIndustryInvoice`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceDocumentTree {
    pub context: DocumentContext,
    pub header: DocumentHeader,
    pub transaction: TradeTransaction,
}

/// `rsm:ExchangedDocumentContext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContext {
    /// `GuidelineSpecifiedDocumentContextParameter/ID`.
    pub guideline_id: String,
}

/// `rsm:ExchangedDocument`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHeader {
    pub id: String,
    /// UNTDID 1001 code, `380` for a commercial invoice.
    pub type_code: String,
    /// `IssueDateTime/DateTimeString`, format 102 (`YYYYMMDD`).
    pub issue_date: String,
    pub notes: Vec<String>,
}

/// `rsm:SupplyChainTradeTransaction`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeTransaction {
    pub line_items: Vec<LineItemNode>,
    pub agreement: TradeAgreement,
    pub settlement: TradeSettlement,
}

/// `ram:IncludedSupplyChainTradeLineItem`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemNode {
    pub line_id: String,
    /// `SpecifiedTradeProduct/Name`.
    pub name: String,
    /// `NetPriceProductTradePrice/ChargeAmount`.
    pub net_price: String,
    pub billed_quantity: Decimal,
    pub unit_code: String,
    pub tax_type_code: String,
    pub tax_category_code: String,
    pub tax_rate: Decimal,
    /// `SpecifiedTradeSettlementLineMonetarySummation/LineTotalAmount`.
    pub line_total: String,
}

/// `ram:ApplicableHeaderTradeAgreement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeAgreement {
    pub seller: TradePartyNode,
    pub buyer: TradePartyNode,
}

/// `ram:SellerTradeParty` / `ram:BuyerTradeParty`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradePartyNode {
    pub name: String,
    pub address: PostalAddressNode,
    /// `SpecifiedTaxRegistration/ID` with scheme `VA`.
    pub vat_id: Option<String>,
}

/// `ram:PostalTradeAddress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostalAddressNode {
    pub postcode: Option<String>,
    pub line_one: Option<String>,
    pub city: Option<String>,
    pub country_id: String,
}

/// `ram:ApplicableHeaderTradeSettlement`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeSettlement {
    pub currency_code: String,
    pub tax_details: Vec<TaxDetailNode>,
    /// `SpecifiedTradePaymentTerms/DueDateDateTime`, format 102.
    pub due_date: Option<String>,
    pub summation: MonetarySummation,
}

/// Header `ram:ApplicableTradeTax`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxDetailNode {
    pub calculated_amount: String,
    pub type_code: String,
    pub basis_amount: String,
    pub category_code: String,
    pub rate_percent: Decimal,
}

/// `ram:SpecifiedTradeSettlementHeaderMonetarySummation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonetarySummation {
    pub line_total: String,
    pub tax_basis_total: String,
    /// Written with a `currencyID` attribute.
    pub tax_total: String,
    pub grand_total: String,
    pub due_payable: String,
}

/// Schema paths of mandatory leaves, used to address mapping violations.
pub mod paths {
    pub const GUIDELINE_ID: &str =
        "ExchangedDocumentContext/GuidelineSpecifiedDocumentContextParameter/ID";
    pub const DOCUMENT_ID: &str = "ExchangedDocument/ID";
    pub const ISSUE_DATE: &str = "ExchangedDocument/IssueDateTime/DateTimeString";
    pub const SELLER_NAME: &str = "ApplicableHeaderTradeAgreement/SellerTradeParty/Name";
    pub const SELLER_COUNTRY: &str =
        "ApplicableHeaderTradeAgreement/SellerTradeParty/PostalTradeAddress/CountryID";
    pub const SELLER_VAT_ID: &str =
        "ApplicableHeaderTradeAgreement/SellerTradeParty/SpecifiedTaxRegistration/ID";
    pub const BUYER_NAME: &str = "ApplicableHeaderTradeAgreement/BuyerTradeParty/Name";
    pub const BUYER_COUNTRY: &str =
        "ApplicableHeaderTradeAgreement/BuyerTradeParty/PostalTradeAddress/CountryID";
    pub const CURRENCY: &str = "ApplicableHeaderTradeSettlement/InvoiceCurrencyCode";
    pub const GRAND_TOTAL: &str =
        "ApplicableHeaderTradeSettlement/SpecifiedTradeSettlementHeaderMonetarySummation/GrandTotalAmount";
    pub const LINE_ITEMS: &str = "SupplyChainTradeTransaction/IncludedSupplyChainTradeLineItem";
}
