//! Currency codes and display symbols.

/// Check whether `code` can be an ISO 4217 currency code.
///
/// Three upper-case ASCII letters, excluding the `X` codes that name funds,
/// precious metals or test values rather than a currency.
pub fn is_known_currency_code(code: &str) -> bool {
    code.len() == 3
        && code.bytes().all(|b| b.is_ascii_uppercase())
        && !NON_CURRENCY_CODES.contains(&code)
}

static NON_CURRENCY_CODES: &[&str] = &[
    "XAG", "XAU", "XBA", "XBB", "XBC", "XBD", "XDR", "XPD", "XPT", "XSU", "XTS", "XUA", "XXX",
];

/// Display symbol for a currency code. Codes without a dedicated symbol are
/// their own symbol.
pub fn currency_symbol(code: &str) -> &str {
    match code {
        "EUR" => "€",
        "USD" => "$",
        "GBP" => "£",
        "SEK" | "NOK" | "DKK" => "kr",
        "PLN" => "zł",
        "CZK" => "Kč",
        "HUF" => "Ft",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_codes() {
        for code in ["EUR", "CHF", "SEK", "XOF"] {
            assert!(is_known_currency_code(code), "{code}");
        }
        for code in ["XTS", "XAU", "", "EURO", "eur", "EU"] {
            assert!(!is_known_currency_code(code), "{code}");
        }
    }

    #[test]
    fn symbols() {
        assert_eq!(currency_symbol("EUR"), "€");
        assert_eq!(currency_symbol("SEK"), "kr");
        assert_eq!(currency_symbol("CHF"), "CHF");
    }
}
