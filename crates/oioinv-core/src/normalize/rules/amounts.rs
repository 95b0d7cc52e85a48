//! Amount parsing for Danish invoices.

use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use super::patterns::{AMOUNT_NOISE, AMOUNT_SHAPE};

/// Parse a loosely formatted amount ("1.234,56 kr.", "1 234.56", "100,-").
///
/// When both separators occur the last one is the decimal separator. A
/// separator that occurs more than once is a thousands separator. A single
/// separator is a decimal separator. Anything else left after removing
/// currency tokens makes the text malformed.
pub fn parse_danish_amount(s: &str) -> Option<Decimal> {
    let stripped = AMOUNT_NOISE.replace_all(s.trim(), "");
    let cleaned: String = stripped
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\'' && *c != '\u{00a0}')
        .collect();

    if !AMOUNT_SHAPE.is_match(&cleaned) {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let normalized = match (commas, dots) {
        (0, 0) => cleaned,
        (_, 0) if commas > 1 => cleaned.replace(',', ""),
        (_, 0) => cleaned.replace(',', "."),
        (0, _) if dots > 1 => cleaned.replace('.', ""),
        (0, _) => cleaned,
        _ => {
            let comma_pos = cleaned.rfind(',');
            let dot_pos = cleaned.rfind('.');
            match (comma_pos, dot_pos) {
                (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
                _ => cleaned.replace(',', ""),
            }
        }
    };

    Decimal::from_str(&normalized).ok()
}

/// Round to two decimals, halves away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_danish_amount() {
        assert_eq!(parse_danish_amount("100,00"), Some(d("100.00")));
        assert_eq!(parse_danish_amount("1.234,56"), Some(d("1234.56")));
        assert_eq!(parse_danish_amount("1 234,56 kr."), Some(d("1234.56")));
        assert_eq!(parse_danish_amount("DKK 1,234.56"), Some(d("1234.56")));
        assert_eq!(parse_danish_amount("12.345.678"), Some(d("12345678")));
        assert_eq!(parse_danish_amount("2.5"), Some(d("2.5")));
        assert_eq!(parse_danish_amount("100,-"), Some(d("100")));
        assert_eq!(parse_danish_amount("-50,25"), Some(d("-50.25")));
        assert_eq!(parse_danish_amount("62.00%"), Some(d("62.00")));
    }

    #[test]
    fn test_parse_malformed_amount() {
        assert_eq!(parse_danish_amount(""), None);
        assert_eq!(parse_danish_amount("abc"), None);
        assert_eq!(parse_danish_amount("12abc"), None);
        assert_eq!(parse_danish_amount("1-2"), None);
        assert_eq!(parse_danish_amount(",."), None);
    }

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(d("0.125")), d("0.13"));
        assert_eq!(round_money(d("0.124")), d("0.12"));
        assert_eq!(round_money(d("-0.125")), d("-0.13"));
    }
}
