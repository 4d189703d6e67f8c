//! Simple types: built-in lexical checks and restriction facets.

use std::borrow::Cow;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;

use super::dom::QName;

pub const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Built-in datatypes with a lexical check. Names outside this list are not
/// built-ins and must resolve to a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    AnySimple,
    String,
    NormalizedString,
    Token,
    Decimal,
    Integer,
    NonNegativeInteger,
    PositiveInteger,
    Boolean,
    Date,
    DateTime,
    Base64Binary,
}

impl Builtin {
    pub fn from_qname(name: &QName) -> Option<Self> {
        if name.ns != XS_NS {
            return None;
        }
        Some(match name.local.as_str() {
            "string" => Self::String,
            "normalizedString" => Self::NormalizedString,
            "decimal" | "double" | "float" => Self::Decimal,
            "integer" | "long" | "int" | "short" | "byte" | "nonPositiveInteger"
            | "negativeInteger" => Self::Integer,
            "nonNegativeInteger" | "unsignedLong" | "unsignedInt" | "unsignedShort"
            | "unsignedByte" => Self::NonNegativeInteger,
            "positiveInteger" => Self::PositiveInteger,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "dateTime" => Self::DateTime,
            "base64Binary" => Self::Base64Binary,
            "token" | "language" | "Name" | "NCName" | "NMTOKEN" | "ID" | "IDREF" | "QName"
            | "anyURI" | "ENTITY" | "time" | "duration" | "gYear" | "gYearMonth" | "gMonth"
            | "gMonthDay" | "gDay" | "hexBinary" => Self::Token,
            "anySimpleType" => Self::AnySimple,
            _ => return None,
        })
    }

    /// Whether the value space collapses whitespace before checking.
    pub fn collapses(&self) -> bool {
        !matches!(self, Self::String | Self::NormalizedString | Self::AnySimple)
    }

    pub fn check(&self, value: &str) -> Result<(), String> {
        let ok = match self {
            Self::AnySimple | Self::String | Self::NormalizedString | Self::Token => true,
            Self::Decimal => parse_decimal(value).is_some() || matches!(value, "INF" | "-INF" | "NaN"),
            Self::Integer => is_integer(value),
            Self::NonNegativeInteger => is_integer(value) && !value.starts_with('-'),
            Self::PositiveInteger => {
                is_integer(value)
                    && !value.starts_with('-')
                    && !value.trim_start_matches(['+', '0']).is_empty()
            }
            Self::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Self::Date => is_date(value),
            Self::DateTime => is_date_time(value),
            Self::Base64Binary => value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b' ')),
        };
        if ok {
            Ok(())
        } else {
            Err(format!("'{value}' is not a valid {self:?} value"))
        }
    }
}

fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn parse_decimal(value: &str) -> Option<Decimal> {
    let body = value.strip_prefix(['+', '-']).unwrap_or(value);
    let well_formed = !body.is_empty()
        && body.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && body.bytes().filter(|&b| b == b'.').count() <= 1
        && body != ".";
    if !well_formed {
        return None;
    }
    Decimal::from_str(value.strip_prefix('+').unwrap_or(value)).ok()
}

fn is_date(value: &str) -> bool {
    let (date, zone) = value.split_at_checked(10).unwrap_or((value, ""));
    let zone_ok = zone.is_empty()
        || zone == "Z"
        || (zone.len() == 6 && zone.starts_with(['+', '-']) && zone.as_bytes()[3] == b':');
    zone_ok && NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok()
}

fn is_date_time(value: &str) -> bool {
    DateTime::parse_from_rfc3339(value).is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
}

/// The `xs:whiteSpace` facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

impl WhiteSpace {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "preserve" => Some(Self::Preserve),
            "replace" => Some(Self::Replace),
            "collapse" => Some(Self::Collapse),
            _ => None,
        }
    }
}

/// Restriction facets. The schema loader rejects facets not listed here.
#[derive(Debug, Clone, Default)]
pub struct Facets {
    /// Alternatives from one derivation step; a value must match at least one.
    pub patterns: Vec<Regex>,
    pub enumeration: Vec<String>,
    pub length: Option<usize>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_inclusive: Option<Decimal>,
    pub max_inclusive: Option<Decimal>,
    pub min_exclusive: Option<Decimal>,
    pub max_exclusive: Option<Decimal>,
    pub total_digits: Option<u32>,
    pub fraction_digits: Option<u32>,
    pub white_space: Option<WhiteSpace>,
}

impl Facets {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.enumeration.is_empty()
            && self.length.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.min_inclusive.is_none()
            && self.max_inclusive.is_none()
            && self.min_exclusive.is_none()
            && self.max_exclusive.is_none()
            && self.total_digits.is_none()
            && self.fraction_digits.is_none()
            && self.white_space.is_none()
    }

    /// Compile an XSD pattern; XSD patterns are implicitly anchored.
    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), String> {
        let translated = pattern.replace("\\i", "[_:A-Za-z]").replace("\\c", "[-._:A-Za-z0-9]");
        let re = Regex::new(&format!("^(?:{translated})$"))
            .map_err(|err| format!("pattern '{pattern}' cannot be compiled: {err}"))?;
        self.patterns.push(re);
        Ok(())
    }

    /// Apply `xs:whiteSpace` before the other facets. `None` means the
    /// facet is absent and the base type decides.
    pub fn normalize<'v>(&self, value: &'v str) -> Option<Cow<'v, str>> {
        match self.white_space? {
            WhiteSpace::Preserve => Some(Cow::Borrowed(value)),
            WhiteSpace::Replace => Some(Cow::Owned(value.replace(['\t', '\n', '\r'], " "))),
            WhiteSpace::Collapse => Some(Cow::Owned(collapse(value))),
        }
    }

    pub fn check(&self, value: &str) -> Result<(), String> {
        if !self.patterns.is_empty() && !self.patterns.iter().any(|p| p.is_match(value)) {
            return Err(format!("'{value}' does not match the required pattern"));
        }
        if !self.enumeration.is_empty() && !self.enumeration.iter().any(|e| e == value) {
            return Err(format!("'{value}' is not one of the allowed values"));
        }

        let len = value.chars().count();
        if let Some(n) = self.length.filter(|&n| n != len) {
            return Err(format!("'{value}' must have length {n}"));
        }
        if let Some(n) = self.min_length.filter(|&n| len < n) {
            return Err(format!("'{value}' is shorter than {n}"));
        }
        if let Some(n) = self.max_length.filter(|&n| len > n) {
            return Err(format!("'{value}' is longer than {n}"));
        }

        let has_numeric = self.min_inclusive.is_some()
            || self.max_inclusive.is_some()
            || self.min_exclusive.is_some()
            || self.max_exclusive.is_some()
            || self.total_digits.is_some()
            || self.fraction_digits.is_some();
        if !has_numeric {
            return Ok(());
        }
        let Some(number) = parse_decimal(value) else {
            return Err(format!("'{value}' is not numeric"));
        };
        if self.min_inclusive.is_some_and(|m| number < m)
            || self.max_inclusive.is_some_and(|m| number > m)
            || self.min_exclusive.is_some_and(|m| number <= m)
            || self.max_exclusive.is_some_and(|m| number >= m)
        {
            return Err(format!("'{value}' is out of range"));
        }
        let normalized = number.normalize();
        if let Some(n) = self.fraction_digits.filter(|&n| normalized.scale() > n) {
            return Err(format!("'{value}' has more than {n} fraction digits"));
        }
        if let Some(n) = self.total_digits {
            let digits = normalized.mantissa().unsigned_abs().to_string().len() as u32;
            if digits > n {
                return Err(format!("'{value}' has more than {n} digits"));
            }
        }
        Ok(())
    }
}

/// Collapse runs of whitespace to single spaces and trim.
pub fn collapse(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
