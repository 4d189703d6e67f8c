//! Country codes for party addresses (EN 16931 code list: ISO 3166-1
//! alpha-2 plus `XI` for Northern Ireland).
//!
//! Checked by shape, not against a full table: two upper-case ASCII letters
//! outside the ranges ISO 3166 leaves to private use.

/// Check whether `code` can be an ISO 3166-1 alpha-2 country code.
pub fn is_known_country_code(code: &str) -> bool {
    let &[first, second] = code.as_bytes() else {
        return false;
    };
    if !first.is_ascii_uppercase() || !second.is_ascii_uppercase() {
        return false;
    }
    code == "XI" || !is_user_assigned(first, second)
}

/// `AA`, `QM`–`QZ`, `XA`–`XZ` and `ZZ`.
fn is_user_assigned(first: u8, second: u8) -> bool {
    match first {
        b'A' => second == b'A',
        b'Q' => second >= b'M',
        b'X' => true,
        b'Z' => second == b'Z',
        _ => false,
    }
}
