//! Pipeline configuration, loadable from TOML.
//!
//! ```
//! use zugferd_pipeline::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_toml_str(r#"
//!     schema_path = "schemas/zugferd/EN16931.xsd"
//!
//!     [attachment]
//!     description = "Rechnung 2025-07"
//!
//!     [defaults]
//!     default_currency = "EUR"
//!     default_due_days = 14
//!
//!     [tax_rules.de]
//!     kind = "percentage"
//!     rate = "19"
//! "#).unwrap();
//!
//! assert_eq!(config.defaults.default_due_days, 14);
//! assert_eq!(config.attachment.filename, "ZUGFeRD-invoice.xml");
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use crate::core::{Defaults, TaxRule, TaxRules};
use crate::pdf::{ATTACHMENT_FILENAME, DEFAULT_RELATIONSHIP, EmbedOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root XSD the generated XML is validated against.
    pub schema_path: PathBuf,
    pub attachment: AttachmentConfig,
    pub defaults: Defaults,
    /// Tax rules keyed by locale tag (`de`, `de-AT`, ...).
    pub tax_rules: BTreeMap<String, TaxRuleConfig>,
    /// External PDF validator run after embedding. The built-in structural
    /// check is used when unset.
    pub pdf_validator: Option<CommandConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from("schemas/zugferd/EN16931.xsd"),
            attachment: AttachmentConfig::default(),
            defaults: Defaults::default(),
            tax_rules: BTreeMap::new(),
            pdf_validator: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    pub filename: String,
    pub description: String,
    pub relationship: String,
    /// Add an XMP metadata stream when the base PDF has none.
    pub xmp: bool,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            filename: ATTACHMENT_FILENAME.to_string(),
            description: "ZUGFeRD invoice data".to_string(),
            relationship: DEFAULT_RELATIONSHIP.to_string(),
            xmp: true,
        }
    }
}

impl AttachmentConfig {
    /// Embedding options for one run, stamped with the current time.
    pub fn embed_options(&self, conformance_level: &str) -> EmbedOptions {
        EmbedOptions::new(&self.description)
            .filename(&self.filename)
            .relationship(&self.relationship)
            .write_xmp(self.xmp)
            .conformance_level(conformance_level)
    }
}

/// Serialized form of a [`TaxRule`]. Formula rules are code, not config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaxRuleConfig {
    LineRate,
    Percentage { rate: Decimal },
}

impl From<TaxRuleConfig> for TaxRule {
    fn from(config: TaxRuleConfig) -> Self {
        match config {
            TaxRuleConfig::LineRate => TaxRule::LineRate,
            TaxRuleConfig::Percentage { rate } => TaxRule::Percentage(rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandConfig {
    pub program: PathBuf,
    /// Arguments placed before the PDF path.
    #[serde(default)]
    pub args: Vec<String>,
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(config = %path.display(), rules = config.tax_rules.len(), "loaded pipeline config");
        Ok(config)
    }

    /// Build the locale table; unmatched locales use each line's own rate.
    pub fn tax_rules(&self) -> TaxRules {
        self.tax_rules
            .iter()
            .fold(TaxRules::new(), |rules, (locale, rule)| {
                rules.with_rule(locale, TaxRule::from(*rule))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LineItemBuilder;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(config.attachment.xmp);
        assert_eq!(config.defaults.default_currency, "EUR");
    }

    #[test]
    fn tax_rules_resolve_by_locale() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [tax_rules.de]
            kind = "percentage"
            rate = "19"

            [tax_rules.en]
            kind = "line_rate"
            "#,
        )
        .unwrap();
        let rules = config.tax_rules();
        let line = LineItemBuilder::new("1", "Item", dec!(1), dec!(10))
            .tax_rate(dec!(7))
            .build();
        assert_eq!(rules.resolve("de-DE").rate_for(&line), dec!(19));
        assert_eq!(rules.resolve("en").rate_for(&line), dec!(7));
    }

    #[test]
    fn validator_command() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [pdf_validator]
            program = "pdfcpu"
            args = ["validate", "-m", "strict"]
            "#,
        )
        .unwrap();
        let cmd = config.pdf_validator.unwrap();
        assert_eq!(cmd.program, PathBuf::from("pdfcpu"));
        assert_eq!(cmd.args.len(), 3);
    }

    #[test]
    fn unknown_rule_kind_is_rejected() {
        let err = PipelineConfig::from_toml_str(
            r#"
            [tax_rules.de]
            kind = "magic"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = PipelineConfig::from_file("/nonexistent/pipeline.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
