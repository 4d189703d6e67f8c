//! Locale-keyed tax rules passed explicitly into total computation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use super::types::LineItem;

/// Computes the effective tax rate (percent) for a line.
pub type RateFormula = Arc<dyn Fn(&LineItem) -> Decimal + Send + Sync>;

/// How the effective tax rate of a line is determined.
#[derive(Clone, Default)]
pub enum TaxRule {
    /// Use each line's own `tax_rate`.
    #[default]
    LineRate,
    /// Apply one percentage to every line.
    Percentage(Decimal),
    /// Derive the rate per line.
    Formula(RateFormula),
}

impl TaxRule {
    /// Rule backed by a closure.
    pub fn formula(f: impl Fn(&LineItem) -> Decimal + Send + Sync + 'static) -> Self {
        Self::Formula(Arc::new(f))
    }

    /// Effective rate for `line` under this rule.
    pub fn rate_for(&self, line: &LineItem) -> Decimal {
        match self {
            Self::LineRate => line.tax_rate,
            Self::Percentage(rate) => *rate,
            Self::Formula(f) => f(line),
        }
    }
}

impl fmt::Debug for TaxRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LineRate => f.write_str("LineRate"),
            Self::Percentage(rate) => f.debug_tuple("Percentage").field(rate).finish(),
            Self::Formula(_) => f.write_str("Formula(..)"),
        }
    }
}

/// Tax rules keyed by locale, with a fallback.
///
/// Resolution tries the exact tag, then its language part
/// (`"de-AT"` → `"de"`), then the fallback.
#[derive(Debug, Clone, Default)]
pub struct TaxRules {
    rules: BTreeMap<String, TaxRule>,
    fallback: TaxRule,
}

impl TaxRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule used when no locale matches.
    pub fn with_fallback(mut self, rule: TaxRule) -> Self {
        self.fallback = rule;
        self
    }

    /// Register a rule for a locale tag (case-insensitive).
    pub fn with_rule(mut self, locale: impl AsRef<str>, rule: TaxRule) -> Self {
        self.insert(locale, rule);
        self
    }

    pub fn insert(&mut self, locale: impl AsRef<str>, rule: TaxRule) {
        self.rules.insert(normalize_locale(locale.as_ref()), rule);
    }

    pub fn resolve(&self, locale: &str) -> &TaxRule {
        let tag = normalize_locale(locale);
        if let Some(rule) = self.rules.get(&tag) {
            return rule;
        }
        tag.split(['-', '_'])
            .next()
            .and_then(|lang| self.rules.get(lang))
            .unwrap_or(&self.fallback)
    }
}

fn normalize_locale(locale: &str) -> String {
    locale.trim().to_ascii_lowercase().replace('_', "-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(rate: Decimal) -> LineItem {
        crate::core::LineItemBuilder::new("1", "Item", dec!(1), dec!(10))
            .tax_rate(rate)
            .build()
    }

    #[test]
    fn resolves_exact_then_language_then_fallback() {
        let rules = TaxRules::new()
            .with_rule("de", TaxRule::Percentage(dec!(19)))
            .with_rule("de-AT", TaxRule::Percentage(dec!(20)))
            .with_fallback(TaxRule::Percentage(dec!(0)));

        assert_eq!(rules.resolve("de-AT").rate_for(&line(dec!(7))), dec!(20));
        assert_eq!(rules.resolve("de_at").rate_for(&line(dec!(7))), dec!(20));
        assert_eq!(rules.resolve("de-CH").rate_for(&line(dec!(7))), dec!(19));
        assert_eq!(rules.resolve("fr").rate_for(&line(dec!(7))), dec!(0));
    }

    #[test]
    fn default_fallback_keeps_line_rate() {
        let rules = TaxRules::new();
        assert_eq!(rules.resolve("en").rate_for(&line(dec!(7))), dec!(7));
    }

    #[test]
    fn formula_sees_the_line() {
        let rule = TaxRule::formula(|l| {
            if l.description.contains("Book") {
                dec!(7)
            } else {
                dec!(19)
            }
        });
        let mut book = line(dec!(0));
        book.description = "Book".into();
        assert_eq!(rule.rate_for(&book), dec!(7));
        assert_eq!(rule.rate_for(&line(dec!(0))), dec!(19));
    }
}
