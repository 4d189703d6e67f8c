use std::str::FromStr;

use quick_xml::Reader;
use quick_xml::events::Event;
use rust_decimal::Decimal;

use super::encode::EncodingError;
use super::tree::*;

/// Parse CII XML back into a compliance tree.
///
/// Elements are matched by local name, so any namespace prefixes work.
/// Elements outside the modeled subset are skipped. Leaf text is taken
/// verbatim, surrounding whitespace included; whitespace between elements
/// is ignored.
pub fn decode_xml(xml: &[u8]) -> Result<ComplianceDocumentTree, EncodingError> {
    let mut reader = Reader::from_reader(xml);

    let mut p = Parsed::default();
    let mut path: Vec<String> = Vec::new();
    // Text of the innermost open element; None once a child element opens.
    let mut leaf: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "BilledQuantity" {
                    for attr in e.attributes().flatten() {
                        if attr.key.local_name().as_ref() == b"unitCode" {
                            p.unit_code = Some(attr.unescape_value()?.into_owned());
                        }
                    }
                }
                match name.as_str() {
                    "IncludedSupplyChainTradeLineItem" => p.line = Some(PartialLine::default()),
                    "ApplicableTradeTax" if !in_path(&path, "IncludedSupplyChainTradeLineItem") => {
                        p.tax = Some(PartialTax::default())
                    }
                    _ => {}
                }
                path.push(name);
                leaf = Some(String::new());
            }
            Event::Empty(e) => {
                path.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                p.handle_text(&path, String::new())?;
                path.pop();
                leaf = None;
            }
            Event::Text(e) => {
                if let Some(text) = leaf.as_mut() {
                    text.push_str(&e.unescape()?);
                }
            }
            Event::CData(e) => {
                if let Some(text) = leaf.as_mut() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(_) => {
                if let Some(text) = leaf.take() {
                    p.handle_text(&path, text)?;
                }
                let ended = path.pop().unwrap_or_default();
                match ended.as_str() {
                    "IncludedSupplyChainTradeLineItem" => {
                        if let Some(line) = p.line.take() {
                            p.lines.push(line.finish(&mut p.unit_code)?);
                        }
                    }
                    "ApplicableTradeTax" => {
                        if let Some(tax) = p.tax.take() {
                            p.tax_details.push(tax.finish()?);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    p.finish()
}

fn in_path(path: &[String], name: &str) -> bool {
    path.iter().any(|p| p == name)
}

fn required(value: Option<String>, what: &str) -> Result<String, EncodingError> {
    value.ok_or_else(|| EncodingError::Structure(format!("missing {what}")))
}

fn parse_decimal(text: &str, what: &str) -> Result<Decimal, EncodingError> {
    Decimal::from_str(text)
        .map_err(|e| EncodingError::Structure(format!("invalid decimal in {what}: {e}")))
}

#[derive(Default)]
struct PartialLine {
    line_id: Option<String>,
    name: Option<String>,
    net_price: Option<String>,
    billed_quantity: Option<Decimal>,
    tax_type_code: Option<String>,
    tax_category_code: Option<String>,
    tax_rate: Option<Decimal>,
    line_total: Option<String>,
}

impl PartialLine {
    fn finish(self, unit_code: &mut Option<String>) -> Result<LineItemNode, EncodingError> {
        Ok(LineItemNode {
            line_id: required(self.line_id, "LineID")?,
            name: required(self.name, "SpecifiedTradeProduct/Name")?,
            net_price: required(self.net_price, "NetPriceProductTradePrice")?,
            billed_quantity: self
                .billed_quantity
                .ok_or_else(|| EncodingError::Structure("missing BilledQuantity".into()))?,
            unit_code: required(unit_code.take(), "BilledQuantity/@unitCode")?,
            tax_type_code: required(self.tax_type_code, "line tax TypeCode")?,
            tax_category_code: required(self.tax_category_code, "line tax CategoryCode")?,
            tax_rate: self
                .tax_rate
                .ok_or_else(|| EncodingError::Structure("missing line RateApplicablePercent".into()))?,
            line_total: required(self.line_total, "LineTotalAmount")?,
        })
    }
}

#[derive(Default)]
struct PartialTax {
    calculated_amount: Option<String>,
    type_code: Option<String>,
    basis_amount: Option<String>,
    category_code: Option<String>,
    rate_percent: Option<Decimal>,
}

impl PartialTax {
    fn finish(self) -> Result<TaxDetailNode, EncodingError> {
        Ok(TaxDetailNode {
            calculated_amount: required(self.calculated_amount, "CalculatedAmount")?,
            type_code: required(self.type_code, "tax TypeCode")?,
            basis_amount: required(self.basis_amount, "BasisAmount")?,
            category_code: required(self.category_code, "tax CategoryCode")?,
            rate_percent: self
                .rate_percent
                .ok_or_else(|| EncodingError::Structure("missing RateApplicablePercent".into()))?,
        })
    }
}

#[derive(Default)]
struct PartialParty {
    name: Option<String>,
    postcode: Option<String>,
    line_one: Option<String>,
    city: Option<String>,
    country_id: Option<String>,
    vat_id: Option<String>,
}

impl PartialParty {
    fn set(&mut self, leaf: &str, path: &[String], text: String) {
        match leaf {
            "Name" => self.name = Some(text),
            "PostcodeCode" => self.postcode = Some(text),
            "LineOne" => self.line_one = Some(text),
            "CityName" => self.city = Some(text),
            "CountryID" => self.country_id = Some(text),
            "ID" if in_path(path, "SpecifiedTaxRegistration") => self.vat_id = Some(text),
            _ => {}
        }
    }

    fn finish(self, role: &str) -> Result<TradePartyNode, EncodingError> {
        Ok(TradePartyNode {
            name: required(self.name, &format!("{role}/Name"))?,
            address: PostalAddressNode {
                postcode: self.postcode,
                line_one: self.line_one,
                city: self.city,
                country_id: required(self.country_id, &format!("{role}/CountryID"))?,
            },
            vat_id: self.vat_id,
        })
    }
}

#[derive(Default)]
struct Parsed {
    guideline_id: Option<String>,
    id: Option<String>,
    type_code: Option<String>,
    issue_date: Option<String>,
    notes: Vec<String>,
    lines: Vec<LineItemNode>,
    line: Option<PartialLine>,
    unit_code: Option<String>,
    seller: PartialParty,
    buyer: PartialParty,
    currency_code: Option<String>,
    tax_details: Vec<TaxDetailNode>,
    tax: Option<PartialTax>,
    due_date: Option<String>,
    line_total: Option<String>,
    tax_basis_total: Option<String>,
    tax_total: Option<String>,
    grand_total: Option<String>,
    due_payable: Option<String>,
}

impl Parsed {
    fn handle_text(&mut self, path: &[String], text: String) -> Result<(), EncodingError> {
        let leaf = path.last().map(String::as_str).unwrap_or("");

        if in_path(path, "ExchangedDocumentContext") {
            if leaf == "ID" && in_path(path, "GuidelineSpecifiedDocumentContextParameter") {
                self.guideline_id = Some(text);
            }
            return Ok(());
        }

        if in_path(path, "ExchangedDocument") {
            match leaf {
                "ID" => self.id = Some(text),
                "TypeCode" => self.type_code = Some(text),
                "DateTimeString" if in_path(path, "IssueDateTime") => self.issue_date = Some(text),
                "Content" if in_path(path, "IncludedNote") => self.notes.push(text),
                _ => {}
            }
            return Ok(());
        }

        if let Some(line) = self.line.as_mut() {
            match leaf {
                "LineID" => line.line_id = Some(text),
                "Name" if in_path(path, "SpecifiedTradeProduct") => line.name = Some(text),
                "ChargeAmount" if in_path(path, "NetPriceProductTradePrice") => {
                    line.net_price = Some(text)
                }
                "BilledQuantity" => {
                    line.billed_quantity = Some(parse_decimal(&text, "BilledQuantity")?)
                }
                "TypeCode" if in_path(path, "ApplicableTradeTax") => {
                    line.tax_type_code = Some(text)
                }
                "CategoryCode" if in_path(path, "ApplicableTradeTax") => {
                    line.tax_category_code = Some(text)
                }
                "RateApplicablePercent" => {
                    line.tax_rate = Some(parse_decimal(&text, "RateApplicablePercent")?)
                }
                "LineTotalAmount" => line.line_total = Some(text),
                _ => {}
            }
            return Ok(());
        }

        if in_path(path, "SellerTradeParty") {
            self.seller.set(leaf, path, text);
            return Ok(());
        }
        if in_path(path, "BuyerTradeParty") {
            self.buyer.set(leaf, path, text);
            return Ok(());
        }

        if let Some(tax) = self.tax.as_mut() {
            match leaf {
                "CalculatedAmount" => tax.calculated_amount = Some(text),
                "TypeCode" => tax.type_code = Some(text),
                "BasisAmount" => tax.basis_amount = Some(text),
                "CategoryCode" => tax.category_code = Some(text),
                "RateApplicablePercent" => {
                    tax.rate_percent = Some(parse_decimal(&text, "RateApplicablePercent")?)
                }
                _ => {}
            }
            return Ok(());
        }

        match leaf {
            "InvoiceCurrencyCode" => self.currency_code = Some(text),
            "DateTimeString" if in_path(path, "DueDateDateTime") => self.due_date = Some(text),
            "LineTotalAmount" => self.line_total = Some(text),
            "TaxBasisTotalAmount" => self.tax_basis_total = Some(text),
            "TaxTotalAmount" => self.tax_total = Some(text),
            "GrandTotalAmount" => self.grand_total = Some(text),
            "DuePayableAmount" => self.due_payable = Some(text),
            _ => {}
        }
        Ok(())
    }

    fn finish(self) -> Result<ComplianceDocumentTree, EncodingError> {
        Ok(ComplianceDocumentTree {
            context: DocumentContext {
                guideline_id: required(self.guideline_id, "guideline ID")?,
            },
            header: DocumentHeader {
                id: required(self.id, "document ID")?,
                type_code: required(self.type_code, "document TypeCode")?,
                issue_date: required(self.issue_date, "IssueDateTime")?,
                notes: self.notes,
            },
            transaction: TradeTransaction {
                line_items: self.lines,
                agreement: TradeAgreement {
                    seller: self.seller.finish("SellerTradeParty")?,
                    buyer: self.buyer.finish("BuyerTradeParty")?,
                },
                settlement: TradeSettlement {
                    currency_code: required(self.currency_code, "InvoiceCurrencyCode")?,
                    tax_details: self.tax_details,
                    due_date: self.due_date,
                    summation: MonetarySummation {
                        line_total: required(self.line_total, "LineTotalAmount")?,
                        tax_basis_total: required(self.tax_basis_total, "TaxBasisTotalAmount")?,
                        tax_total: required(self.tax_total, "TaxTotalAmount")?,
                        grand_total: required(self.grand_total, "GrandTotalAmount")?,
                        due_payable: required(self.due_payable, "DuePayableAmount")?,
                    },
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_truncated_document() {
        let xml = br#"<rsm:CrossIndustryInvoice xmlns:rsm="x"><rsm:ExchangedDocument>"#;
        assert!(decode_xml(xml).is_err());
    }

    #[test]
    fn missing_grand_total_is_structural() {
        let xml = br#"<?xml version="1.0"?>
<CrossIndustryInvoice>
  <ExchangedDocumentContext><GuidelineSpecifiedDocumentContextParameter><ID>urn:cen.eu:en16931:2017</ID></GuidelineSpecifiedDocumentContextParameter></ExchangedDocumentContext>
  <ExchangedDocument><ID>1</ID><TypeCode>380</TypeCode><IssueDateTime><DateTimeString format="102">20250714</DateTimeString></IssueDateTime></ExchangedDocument>
</CrossIndustryInvoice>"#;
        let err = decode_xml(xml).unwrap_err();
        assert!(err.to_string().contains("SellerTradeParty/Name"));
    }
}
