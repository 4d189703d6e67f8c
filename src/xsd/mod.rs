//! XML Schema (XSD 1.0) validation.
//!
//! Schemas are compiled into a native component model: global and local
//! element declarations, named and anonymous complex types, `sequence` /
//! `choice` / `all` content models with occurrence bounds, simple and complex
//! content derivation, attribute declarations and groups, and simple-type
//! restrictions (`pattern`, `enumeration`, `whiteSpace`, length and range
//! facets). A schema using anything outside that subset, such as identity
//! constraints, substitution groups or remote imports, fails to compile with
//! [`SchemaError::Unparsable`] rather than being checked partially. So does a
//! reference to a type, element, group or attribute no loaded file declares.
//!
//! A missing or unreadable schema is [`SchemaError::Unavailable`], which is
//! distinct from a document that fails validation
//! ([`SchemaError::Violations`]).

mod cache;
mod dom;
mod model;
mod simple;
mod validate;

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use cache::SchemaCache;
pub use model::CompiledSchema;

/// One reason a document does not conform, with the element path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Slash-separated element path, e.g. `/rsm:CrossIndustryInvoice/rsm:ExchangedDocument`.
    pub path: String,
    pub reason: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SchemaError {
    /// The schema (or a file it imports) cannot be read.
    #[error("schema unavailable at {}: {source}", .path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The schema file is not a usable XSD document.
    #[error("schema {} could not be compiled: {reason}", .path.display())]
    Unparsable { path: PathBuf, reason: String },

    /// The document does not conform. Carries every violation found.
    #[error("{} schema violation(s): {}", .0.len(), join(.0))]
    Violations(Vec<SchemaViolation>),
}

impl SchemaError {
    /// Whether the schema could not be checked at all, as opposed to the
    /// document failing the check.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Unparsable { .. })
    }

    pub fn violations(&self) -> &[SchemaViolation] {
        match self {
            Self::Violations(v) => v,
            _ => &[],
        }
    }
}

fn join(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl CompiledSchema {
    /// Validate a document. Reports every violation, never just the first.
    /// A document that is not well-formed is a single violation at `/`.
    pub fn validate(&self, xml: &[u8]) -> Result<(), SchemaError> {
        let root = dom::parse_document(xml).map_err(|e| {
            SchemaError::Violations(vec![SchemaViolation {
                path: "/".into(),
                reason: format!("document is not well-formed: {e}"),
            }])
        })?;
        let violations = validate::validate_document(self, &root);
        if violations.is_empty() {
            Ok(())
        } else {
            tracing::warn!(violations = violations.len(), "XML failed schema validation");
            Err(SchemaError::Violations(violations))
        }
    }
}

/// Compile the schema at `schema_path` and validate `xml` against it.
///
/// Use a [`SchemaCache`] to reuse the compiled schema across calls.
pub fn validate_xml(xml: &[u8], schema_path: impl AsRef<Path>) -> Result<(), SchemaError> {
    CompiledSchema::load(schema_path)?.validate(xml)
}
