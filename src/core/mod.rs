//! Invoice domain model, decimal ledger, and upstream validation.
//!
//! Everything here is pure: no I/O, no XML, no PDF. Totals are computed with
//! [`rust_decimal::Decimal`] and rounded exactly once per derived line value.

mod builder;
mod countries;
mod currencies;
mod error;
mod ledger;
mod tax_rules;
mod types;
mod validation;

pub use builder::*;
pub use countries::is_known_country_code;
pub use currencies::{currency_symbol, is_known_currency_code};
pub use error::*;
pub use ledger::*;
pub use tax_rules::*;
pub use types::*;
pub use validation::*;
