//! UN/CEFACT Cross Industry Invoice (CII) mapping and serialization.
//!
//! An [`InvoiceDocument`](crate::core::InvoiceDocument) is first mapped into a
//! [`ComplianceDocumentTree`], which mirrors the CII element hierarchy, then
//! encoded to XML. [`decode_xml`] reads the same subset back.
//!
//! ```
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//! use zugferd_pipeline::cii;
//! use zugferd_pipeline::core::*;
//!
//! let invoice = InvoiceBuilder::new("INV-1", NaiveDate::from_ymd_opt(2025, 7, 14).unwrap())
//!     .seller(PartyBuilder::new("ACME GmbH", AddressBuilder::new("Berlin", "DE").build()).build())
//!     .buyer(PartyBuilder::new("Kunde AG", AddressBuilder::new("Wien", "AT").build()).build())
//!     .add_line(LineItemBuilder::new("1", "Beratung", dec!(1), dec!(100)).tax_rate(dec!(19)).build())
//!     .build()
//!     .unwrap();
//!
//! let tree = cii::map_to_compliance_tree(&invoice).unwrap();
//! let xml = cii::encode_xml(&tree).unwrap();
//! assert_eq!(cii::decode_xml(&xml).unwrap(), tree);
//! ```

mod decode;
mod encode;
mod mapper;
mod profile;
mod tree;

pub use decode::decode_xml;
pub use encode::{EncodingError, XmlWriter, encode_xml};
pub use mapper::{
    COMMERCIAL_INVOICE, MappingError, MappingViolation, ViolationKind, format_date,
    map_to_compliance_tree,
};
pub use profile::{UnknownProfile, XRECHNUNG_GUIDELINE_ID, ZugferdProfile};
pub use tree::*;

/// CII D16B namespace URIs, shared by every profile.
pub mod cii_ns {
    pub const RSM: &str = "urn:un:unece:uncefact:data:standard:CrossIndustryInvoice:100";
    pub const RAM: &str =
        "urn:un:unece:uncefact:data:standard:ReusableAggregateBusinessInformationEntity:100";
    pub const UDT: &str = "urn:un:unece:uncefact:data:standard:UnqualifiedDataType:100";
}
