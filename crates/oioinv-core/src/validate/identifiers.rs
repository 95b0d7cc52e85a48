//! CVR, VAT and GLN identifier handling.

use crate::normalize::rules::patterns::DK_VAT;

/// CVR is exactly 8 ASCII digits.
pub fn is_valid_cvr_format(cvr: &str) -> bool {
    cvr.len() == 8 && cvr.chars().all(|c| c.is_ascii_digit())
}

/// GLN is exactly 13 ASCII digits.
pub fn is_valid_gln_format(gln: &str) -> bool {
    gln.len() == 13 && gln.chars().all(|c| c.is_ascii_digit())
}

/// Strip labels, separators and a "DK" prefix from an extracted CVR.
///
/// The result is not guaranteed to be well-formed; the validator decides.
pub fn clean_cvr(raw: &str) -> String {
    let upper = raw.trim().to_uppercase();
    let without_label = upper
        .trim_start_matches("CVR-NR.")
        .trim_start_matches("CVR-NR")
        .trim_start_matches("CVR NR.")
        .trim_start_matches("CVR")
        .trim_start_matches([':', '.', ' ']);
    let compact: String = without_label
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '.')
        .collect();
    compact.strip_prefix("DK").unwrap_or(&compact).to_string()
}

/// CVR embedded in a Danish VAT number ("DK 12 34 56 78" -> "12345678").
pub fn cvr_from_vat_number(vat: &str) -> Option<String> {
    let caps = DK_VAT.captures(vat.trim())?;
    Some(caps[1].chars().filter(|c| c.is_ascii_digit()).collect())
}

/// VAT number in OIOUBL DK:SE form.
pub fn format_vat_number(cvr: &str) -> String {
    format!("DK{}", cvr)
}
