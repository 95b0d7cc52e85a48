//! Date parsing for Danish invoices.

use chrono::{Duration, NaiveDate};

use super::patterns::{DATE_DANISH_LONG, DATE_DMY, DATE_YMD, TERMS_DAYS};

/// Parse a date written in one of the accepted formats.
///
/// Accepts `dd-mm-yyyy` (also with `.` or `/` and two-digit years),
/// `yyyy-mm-dd` with an optional time part, and Danish long dates such as
/// `15. januar 2024`. Returns `None` for anything else.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if let Some(caps) = DATE_YMD.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_DMY.captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let year = parse_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = DATE_DANISH_LONG.captures(s) {
        let day: u32 = caps[1].parse().ok()?;
        let month = danish_month_to_number(&caps[2])?;
        let year: i32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

/// Number of days granted by payment terms text, if it states one.
pub fn parse_terms_days(terms: &str) -> Option<i64> {
    if let Some(caps) = TERMS_DAYS.captures(terms) {
        return caps[1].parse().ok();
    }
    let lower = terms.to_lowercase();
    if lower.contains("kontant") || lower.contains("straks") {
        return Some(0);
    }
    None
}

/// Due date implied by payment terms counted from the issue date.
pub fn due_date_from_terms(issue_date: NaiveDate, terms: &str) -> Option<NaiveDate> {
    let days = parse_terms_days(terms)?;
    issue_date.checked_add_signed(Duration::days(days))
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    if s.len() == 2 {
        // Invoices are recent: two-digit years are 20xx
        Some(2000 + year)
    } else {
        Some(year)
    }
}

fn danish_month_to_number(month: &str) -> Option<u32> {
    let month = month.to_lowercase();
    let number = match month.as_str() {
        "januar" | "jan" => 1,
        "februar" | "feb" => 2,
        "marts" | "mar" => 3,
        "april" | "apr" => 4,
        "maj" => 5,
        "juni" | "jun" => 6,
        "juli" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "oktober" | "okt" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_danish() {
        assert_eq!(parse_date("15-01-2024"), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("15.01.2024"), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("5/3/24"), Some(date(2024, 3, 5)));
    }

    #[test]
    fn test_parse_date_iso() {
        assert_eq!(parse_date("2024-01-15"), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("2024-01-15T00:00:00"), Some(date(2024, 1, 15)));
    }

    #[test]
    fn test_parse_date_long() {
        assert_eq!(parse_date("15. januar 2024"), Some(date(2024, 1, 15)));
        assert_eq!(parse_date("3 okt. 2024"), Some(date(2024, 10, 3)));
    }

    #[test]
    fn test_parse_date_invalid() {
        assert_eq!(parse_date("31-02-2024"), None);
        assert_eq!(parse_date("i morgen"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_terms_days() {
        assert_eq!(parse_terms_days("Netto 14 dage"), Some(14));
        assert_eq!(parse_terms_days("30 days net"), Some(30));
        assert_eq!(parse_terms_days("Netto kontant"), Some(0));
        assert_eq!(parse_terms_days("Løbende måned + 30"), None);
        assert_eq!(
            due_date_from_terms(date(2024, 1, 15), "netto 8 dage"),
            Some(date(2024, 1, 23))
        );
    }
}
