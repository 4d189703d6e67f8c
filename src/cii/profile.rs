use std::fmt;
use std::str::FromStr;

/// ZUGFeRD / Factur-X conformance profile.
///
/// Selects the guideline URN written into the document context and the
/// profile-specific mapping rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZugferdProfile {
    /// Minimal machine-readable data (no line items).
    Minimum,
    /// Basic data without line items.
    BasicWl,
    /// Basic with line items.
    Basic,
    /// Full EN 16931 European norm.
    EN16931,
    /// Extended profile (beyond EN 16931).
    Extended,
    /// XRechnung profile (German public sector).
    XRechnung,
}

/// XRechnung 3.0 specification identifier.
pub const XRECHNUNG_GUIDELINE_ID: &str =
    "urn:cen.eu:en16931:2017#compliant#urn:xeinkauf.de:kosit:xrechnung_3.0";

impl ZugferdProfile {
    pub const ALL: [Self; 6] = [
        Self::Minimum,
        Self::BasicWl,
        Self::Basic,
        Self::EN16931,
        Self::Extended,
        Self::XRechnung,
    ];

    /// The URN identifier used in `GuidelineSpecifiedDocumentContextParameter`.
    pub fn urn(&self) -> &'static str {
        match self {
            Self::Minimum => "urn:factur-x.eu:1p0:minimum",
            Self::BasicWl => "urn:factur-x.eu:1p0:basicwl",
            Self::Basic => "urn:cen.eu:en16931:2017#compliant#urn:factur-x.eu:1p0:basic",
            Self::EN16931 => "urn:cen.eu:en16931:2017",
            Self::Extended => "urn:cen.eu:en16931:2017#conformant#urn:factur-x.eu:1p0:extended",
            Self::XRechnung => XRECHNUNG_GUIDELINE_ID,
        }
    }

    /// The XMP `fx:ConformanceLevel` value.
    pub fn conformance_level(&self) -> &'static str {
        match self {
            Self::Minimum => "MINIMUM",
            Self::BasicWl => "BASIC WL",
            Self::Basic => "BASIC",
            Self::EN16931 => "EN 16931",
            Self::Extended => "EXTENDED",
            Self::XRechnung => "XRECHNUNG",
        }
    }

    /// Whether the profile transmits individual invoice lines.
    pub fn has_line_items(&self) -> bool {
        !matches!(self, Self::Minimum | Self::BasicWl)
    }

    /// Whether the seller VAT identifier is mandatory.
    pub fn requires_seller_vat_id(&self) -> bool {
        matches!(self, Self::XRechnung)
    }

    /// Parse a profile name ("EN16931", "BASIC WL", ...) or guideline URN.
    /// Names are matched case-insensitively, ignoring spaces, `-` and `_`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(p) = Self::ALL.into_iter().find(|p| p.urn() == value) {
            return Some(p);
        }
        let key: String = value
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_uppercase)
            .collect();
        match key.as_str() {
            "MINIMUM" => Some(Self::Minimum),
            "BASICWL" => Some(Self::BasicWl),
            "BASIC" => Some(Self::Basic),
            "EN16931" | "COMFORT" => Some(Self::EN16931),
            "EXTENDED" => Some(Self::Extended),
            "XRECHNUNG" => Some(Self::XRechnung),
            _ => None,
        }
    }
}

impl fmt::Display for ZugferdProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.conformance_level())
    }
}

/// Returned by [`ZugferdProfile::from_str`] for unrecognised input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown profile '{0}'")]
pub struct UnknownProfile(pub String);

impl FromStr for ZugferdProfile {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownProfile(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_urns() {
        assert_eq!(ZugferdProfile::parse("EN16931"), Some(ZugferdProfile::EN16931));
        assert_eq!(ZugferdProfile::parse("basic wl"), Some(ZugferdProfile::BasicWl));
        assert_eq!(ZugferdProfile::parse("Basic-WL"), Some(ZugferdProfile::BasicWl));
        assert_eq!(ZugferdProfile::parse("xrechnung"), Some(ZugferdProfile::XRechnung));
        for p in ZugferdProfile::ALL {
            assert_eq!(ZugferdProfile::parse(p.urn()), Some(p));
        }
        assert_eq!(ZugferdProfile::parse(""), None);
        assert!("ZUGFERD-3000".parse::<ZugferdProfile>().is_err());
    }

    #[test]
    fn line_items_by_profile() {
        assert!(!ZugferdProfile::Minimum.has_line_items());
        assert!(!ZugferdProfile::BasicWl.has_line_items());
        assert!(ZugferdProfile::Basic.has_line_items());
        assert!(ZugferdProfile::XRechnung.requires_seller_vat_id());
    }
}
