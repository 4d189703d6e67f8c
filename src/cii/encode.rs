use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

use super::cii_ns;
use super::tree::*;
use crate::core::format_decimal;

/// Internal serialization failure. Valid trees never produce one.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EncodingError {
    #[error("XML write error: {0}")]
    Write(#[from] std::io::Error),

    #[error("XML parse error: {0}")]
    Parse(#[from] quick_xml::Error),

    #[error("invalid XML document: {0}")]
    Structure(String),
}

/// Thin wrapper over a quick-xml writer with two-space indentation.
pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    pub fn new() -> Result<Self, EncodingError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(Self { writer })
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner().into_inner()
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self, EncodingError> {
        self.writer.write_event(Event::Start(BytesStart::new(name)))?;
        Ok(self)
    }

    pub fn start_element_with_attrs(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, EncodingError> {
        let mut elem = BytesStart::new(name);
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        self.writer.write_event(Event::Start(elem))?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self, EncodingError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self, EncodingError> {
        self.text_element_with_attrs(name, text, &[])
    }

    pub fn text_element_with_attrs(
        &mut self,
        name: &str,
        text: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self, EncodingError> {
        self.start_element_with_attrs(name, attrs)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end_element(name)
    }

    /// Element containing a single `udt:DateTimeString` in format 102.
    pub fn date_element(&mut self, name: &str, yyyymmdd: &str) -> Result<&mut Self, EncodingError> {
        self.start_element(name)?;
        self.text_element_with_attrs("udt:DateTimeString", yyyymmdd, &[("format", "102")])?;
        self.end_element(name)
    }
}

/// Serialize a compliance tree to UTF-8 XML.
///
/// Namespaces are declared once on the root. Element order is the tree's
/// field order, so identical trees give identical bytes.
pub fn encode_xml(tree: &ComplianceDocumentTree) -> Result<Vec<u8>, EncodingError> {
    if tree.header.issue_date.len() != 8 {
        tracing::error!(issue_date = %tree.header.issue_date, "tree carries a malformed issue date");
        return Err(EncodingError::Structure(format!(
            "issue date '{}' is not YYYYMMDD",
            tree.header.issue_date
        )));
    }

    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs(
        "rsm:CrossIndustryInvoice",
        &[
            ("xmlns:rsm", cii_ns::RSM),
            ("xmlns:ram", cii_ns::RAM),
            ("xmlns:udt", cii_ns::UDT),
        ],
    )?;

    w.start_element("rsm:ExchangedDocumentContext")?;
    w.start_element("ram:GuidelineSpecifiedDocumentContextParameter")?;
    w.text_element("ram:ID", &tree.context.guideline_id)?;
    w.end_element("ram:GuidelineSpecifiedDocumentContextParameter")?;
    w.end_element("rsm:ExchangedDocumentContext")?;

    let header = &tree.header;
    w.start_element("rsm:ExchangedDocument")?;
    w.text_element("ram:ID", &header.id)?;
    w.text_element("ram:TypeCode", &header.type_code)?;
    w.date_element("ram:IssueDateTime", &header.issue_date)?;
    for note in &header.notes {
        w.start_element("ram:IncludedNote")?;
        w.text_element("ram:Content", note)?;
        w.end_element("ram:IncludedNote")?;
    }
    w.end_element("rsm:ExchangedDocument")?;

    let tx = &tree.transaction;
    w.start_element("rsm:SupplyChainTradeTransaction")?;
    for line in &tx.line_items {
        write_line(&mut w, line)?;
    }

    w.start_element("ram:ApplicableHeaderTradeAgreement")?;
    write_party(&mut w, &tx.agreement.seller, "ram:SellerTradeParty")?;
    write_party(&mut w, &tx.agreement.buyer, "ram:BuyerTradeParty")?;
    w.end_element("ram:ApplicableHeaderTradeAgreement")?;

    w.start_element("ram:ApplicableHeaderTradeDelivery")?;
    w.end_element("ram:ApplicableHeaderTradeDelivery")?;

    write_settlement(&mut w, &tx.settlement)?;

    w.end_element("rsm:SupplyChainTradeTransaction")?;
    w.end_element("rsm:CrossIndustryInvoice")?;

    let bytes = w.into_bytes();
    tracing::debug!(document = %header.id, bytes = bytes.len(), "encoded CII XML");
    Ok(bytes)
}

fn write_line(w: &mut XmlWriter, line: &LineItemNode) -> Result<(), EncodingError> {
    w.start_element("ram:IncludedSupplyChainTradeLineItem")?;

    w.start_element("ram:AssociatedDocumentLineDocument")?;
    w.text_element("ram:LineID", &line.line_id)?;
    w.end_element("ram:AssociatedDocumentLineDocument")?;

    w.start_element("ram:SpecifiedTradeProduct")?;
    w.text_element("ram:Name", &line.name)?;
    w.end_element("ram:SpecifiedTradeProduct")?;

    w.start_element("ram:SpecifiedLineTradeAgreement")?;
    w.start_element("ram:NetPriceProductTradePrice")?;
    w.text_element("ram:ChargeAmount", &line.net_price)?;
    w.end_element("ram:NetPriceProductTradePrice")?;
    w.end_element("ram:SpecifiedLineTradeAgreement")?;

    w.start_element("ram:SpecifiedLineTradeDelivery")?;
    w.text_element_with_attrs(
        "ram:BilledQuantity",
        &format_decimal(line.billed_quantity),
        &[("unitCode", line.unit_code.as_str())],
    )?;
    w.end_element("ram:SpecifiedLineTradeDelivery")?;

    w.start_element("ram:SpecifiedLineTradeSettlement")?;
    w.start_element("ram:ApplicableTradeTax")?;
    w.text_element("ram:TypeCode", &line.tax_type_code)?;
    w.text_element("ram:CategoryCode", &line.tax_category_code)?;
    w.text_element("ram:RateApplicablePercent", &format_decimal(line.tax_rate))?;
    w.end_element("ram:ApplicableTradeTax")?;
    w.start_element("ram:SpecifiedTradeSettlementLineMonetarySummation")?;
    w.text_element("ram:LineTotalAmount", &line.line_total)?;
    w.end_element("ram:SpecifiedTradeSettlementLineMonetarySummation")?;
    w.end_element("ram:SpecifiedLineTradeSettlement")?;

    w.end_element("ram:IncludedSupplyChainTradeLineItem")?;
    Ok(())
}

fn write_party(w: &mut XmlWriter, party: &TradePartyNode, element: &str) -> Result<(), EncodingError> {
    w.start_element(element)?;
    w.text_element("ram:Name", &party.name)?;

    let addr = &party.address;
    w.start_element("ram:PostalTradeAddress")?;
    if let Some(postcode) = &addr.postcode {
        w.text_element("ram:PostcodeCode", postcode)?;
    }
    if let Some(line) = &addr.line_one {
        w.text_element("ram:LineOne", line)?;
    }
    if let Some(city) = &addr.city {
        w.text_element("ram:CityName", city)?;
    }
    w.text_element("ram:CountryID", &addr.country_id)?;
    w.end_element("ram:PostalTradeAddress")?;

    if let Some(vat_id) = &party.vat_id {
        w.start_element("ram:SpecifiedTaxRegistration")?;
        w.text_element_with_attrs("ram:ID", vat_id, &[("schemeID", "VA")])?;
        w.end_element("ram:SpecifiedTaxRegistration")?;
    }

    w.end_element(element)?;
    Ok(())
}

fn write_settlement(w: &mut XmlWriter, s: &TradeSettlement) -> Result<(), EncodingError> {
    w.start_element("ram:ApplicableHeaderTradeSettlement")?;
    w.text_element("ram:InvoiceCurrencyCode", &s.currency_code)?;

    for tax in &s.tax_details {
        w.start_element("ram:ApplicableTradeTax")?;
        w.text_element("ram:CalculatedAmount", &tax.calculated_amount)?;
        w.text_element("ram:TypeCode", &tax.type_code)?;
        w.text_element("ram:BasisAmount", &tax.basis_amount)?;
        w.text_element("ram:CategoryCode", &tax.category_code)?;
        w.text_element("ram:RateApplicablePercent", &format_decimal(tax.rate_percent))?;
        w.end_element("ram:ApplicableTradeTax")?;
    }

    if let Some(due) = &s.due_date {
        w.start_element("ram:SpecifiedTradePaymentTerms")?;
        w.date_element("ram:DueDateDateTime", due)?;
        w.end_element("ram:SpecifiedTradePaymentTerms")?;
    }

    let sum = &s.summation;
    w.start_element("ram:SpecifiedTradeSettlementHeaderMonetarySummation")?;
    w.text_element("ram:LineTotalAmount", &sum.line_total)?;
    w.text_element("ram:TaxBasisTotalAmount", &sum.tax_basis_total)?;
    w.text_element_with_attrs(
        "ram:TaxTotalAmount",
        &sum.tax_total,
        &[("currencyID", s.currency_code.as_str())],
    )?;
    w.text_element("ram:GrandTotalAmount", &sum.grand_total)?;
    w.text_element("ram:DuePayableAmount", &sum.due_payable)?;
    w.end_element("ram:SpecifiedTradeSettlementHeaderMonetarySummation")?;

    w.end_element("ram:ApplicableHeaderTradeSettlement")?;
    Ok(())
}
