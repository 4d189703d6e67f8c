//! # zugferd-pipeline
//!
//! Invoice compliance encoding: exact decimal totals, UN/CEFACT Cross
//! Industry Invoice (CII) XML, XSD validation, and embedding of the XML into
//! an existing PDF as a PDF/A-3 associated file (ZUGFeRD / Factur-X).
//!
//! All monetary values use [`rust_decimal::Decimal`], never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use rust_decimal_macros::dec;
//! use zugferd_pipeline::core::*;
//!
//! let invoice = InvoiceBuilder::new("RE-2025-001", NaiveDate::from_ymd_opt(2025, 7, 14).unwrap())
//!     .due_date(NaiveDate::from_ymd_opt(2025, 8, 13).unwrap())
//!     .seller(PartyBuilder::new("ACME GmbH", AddressBuilder::new("Berlin", "DE").postal_code("10115").build())
//!         .vat_id("DE123456789").build())
//!     .buyer(PartyBuilder::new("Kunde AG", AddressBuilder::new("Wien", "AT").build()).build())
//!     .add_line(LineItemBuilder::new("1", "Beratung", dec!(1), dec!(100)).tax_rate(dec!(19)).build())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(invoice.totals.grand_total, dec!(119.00));
//! ```
//!
//! With the `pipeline` feature, [`pipeline::CompliancePipeline`] runs every
//! stage and reports the first one that fails.
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` | Invoice model, decimal ledger, tax rules, upstream validation |
//! | `cii` | Mapping to the CII tree, XML encoding and decoding |
//! | `xsd` | XSD compilation, validation and schema cache |
//! | `pdf` | Attachment embedding, extraction and structure inspection |
//! | `pipeline` (default) | Everything, plus the orchestrator and TOML config |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "cii")]
pub mod cii;

#[cfg(feature = "xsd")]
pub mod xsd;

#[cfg(feature = "pdf")]
pub mod pdf;

#[cfg(feature = "pipeline")]
pub mod config;

#[cfg(feature = "pipeline")]
pub mod pipeline;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
