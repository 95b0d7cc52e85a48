//! Common regex patterns for Danish invoice field normalization.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Dates: 15-01-2024, 15.01.24, 15/1/2024
    pub static ref DATE_DMY: Regex = Regex::new(
        r"^(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})$"
    ).unwrap();

    // ISO dates, optionally followed by a time part
    pub static ref DATE_YMD: Regex = Regex::new(
        r"^(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})(?:[T ].*)?$"
    ).unwrap();

    // "15. januar 2024", "3 okt. 2024"
    pub static ref DATE_DANISH_LONG: Regex = Regex::new(
        r"(?i)^(\d{1,2})\.?\s*(januar|februar|marts|april|maj|juni|juli|august|september|oktober|november|december|jan|feb|mar|apr|jun|jul|aug|sep|sept|okt|nov|dec)\.?\s+(\d{4})$"
    ).unwrap();

    // Currency and unit tokens removed before amount parsing
    pub static ref AMOUNT_NOISE: Regex = Regex::new(
        r"(?i)(dkk|eur|usd|sek|nok|kr\.?|€|\$|%|,-$)"
    ).unwrap();

    pub static ref AMOUNT_SHAPE: Regex = Regex::new(
        r"^-?[0-9.,]*[0-9][0-9.,]*$"
    ).unwrap();

    // FIK payment line: +71<000000001234567+12345678<
    pub static ref FIK_CODE: Regex = Regex::new(
        r"\+?\s*(71|73|75)\s*<\s*(\d{0,16})\s*\+\s*(\d{8})\s*<"
    ).unwrap();

    // "Netto 14 dage", "30 days", "8 dg."
    pub static ref TERMS_DAYS: Regex = Regex::new(
        r"(?i)(\d{1,3})\s*(?:dage|dag|days|day|dg\.?)\b"
    ).unwrap();

    // "Hovedgade 45B", "Vestergade 12-14, 2. tv"
    pub static ref STREET_NUMBER: Regex = Regex::new(
        r"^(.+?)\s+(\d+\s?[A-Za-z]?(?:-\d+[A-Za-z]?)?(?:,?\s.*)?)$"
    ).unwrap();

    // Danish VAT number: DK + 8 digits
    pub static ref DK_VAT: Regex = Regex::new(
        r"(?i)^DK\s?(\d{2}\s?\d{2}\s?\d{2}\s?\d{2})$"
    ).unwrap();

    // Combined bank account: "1234 0001234567", "1234-1234567"
    pub static ref REG_ACCOUNT: Regex = Regex::new(
        r"^(\d{4})[\s\-]+(\d{1,10})$"
    ).unwrap();

    pub static ref POSTAL_CODE_DK: Regex = Regex::new(
        r"\b(\d{4})\b"
    ).unwrap();
}
