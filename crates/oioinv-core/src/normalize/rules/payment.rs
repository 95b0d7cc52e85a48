//! Payment instruction parsing: FIK codes and Danish bank accounts.

use crate::models::invoice::{BankAccount, FikPayment};

use super::patterns::{FIK_CODE, REG_ACCOUNT};

/// Parse a FIK payment line such as `+71<000000001234567+12345678<`.
///
/// Card type 73 carries no payment identification; 71 and 75 must.
pub fn parse_fik(s: &str) -> Option<FikPayment> {
    let caps = FIK_CODE.captures(s)?;
    let card_type = caps[1].to_string();
    let payment_id = Some(caps[2].to_string()).filter(|id| !id.is_empty());

    match (card_type.as_str(), &payment_id) {
        ("73", _) => {}
        ("71", Some(id)) if id.len() == 15 => {}
        ("75", Some(id)) if id.len() == 16 => {}
        _ => return None,
    }

    Some(FikPayment {
        card_type: card_type.clone(),
        payment_id: if card_type == "73" { None } else { payment_id },
        creditor_account: caps[3].to_string(),
    })
}

fn digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Assemble bank details from the separate extracted parts.
///
/// An account number written as "reg account" is split when no separate
/// registration number was extracted.
pub fn parse_bank_account(
    reg_number: Option<&str>,
    account_number: Option<&str>,
    iban: Option<&str>,
    bic: Option<&str>,
) -> Option<BankAccount> {
    let mut reg = reg_number.map(digits).filter(|r| r.len() == 4);
    let mut account = None;

    if let Some(raw) = account_number.map(str::trim) {
        match REG_ACCOUNT.captures(raw) {
            Some(caps) if reg.is_none() => {
                reg = Some(caps[1].to_string());
                account = Some(caps[2].to_string());
            }
            _ => account = Some(digits(raw)).filter(|a| !a.is_empty() && a.len() <= 14),
        }
    }

    let iban = iban
        .map(|i| i.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase())
        .filter(|i| i.len() >= 15 && i.chars().take(2).all(|c| c.is_ascii_alphabetic()));
    let bic = bic
        .map(|b| b.trim().to_uppercase())
        .filter(|b| b.len() == 8 || b.len() == 11);

    let bank = BankAccount {
        reg_number: reg,
        account_number: account,
        iban,
        bic,
    };
    if bank.is_empty() { None } else { Some(bank) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_fik_71() {
        let fik = parse_fik("+71<000000001234567+12345678<").unwrap();
        assert_eq!(fik.card_type, "71");
        assert_eq!(fik.payment_id.as_deref(), Some("000000001234567"));
        assert_eq!(fik.creditor_account, "12345678");
    }

    #[test]
    fn test_parse_fik_73_without_id() {
        let fik = parse_fik("Betal med +73< +87654321<").unwrap();
        assert_eq!(fik.card_type, "73");
        assert_eq!(fik.payment_id, None);
    }

    #[test]
    fn test_parse_fik_invalid() {
        assert!(parse_fik("+71<123+12345678<").is_none());
        assert!(parse_fik("+01<000000001234567+12345678<").is_none());
        assert!(parse_fik("1234 5678").is_none());
    }

    #[test]
    fn test_parse_bank_account_combined() {
        let bank = parse_bank_account(None, Some("1234 0001234567"), None, None).unwrap();
        assert_eq!(bank.reg_number.as_deref(), Some("1234"));
        assert_eq!(bank.account_number.as_deref(), Some("0001234567"));
    }

    #[test]
    fn test_parse_bank_account_iban() {
        let bank = parse_bank_account(None, None, Some("dk50 0040 0440 1162 43"), Some("danbdkkk"))
            .unwrap();
        assert_eq!(bank.iban.as_deref(), Some("DK5000400440116243"));
        assert_eq!(bank.bic.as_deref(), Some("DANBDKKK"));
    }

    #[test]
    fn test_parse_bank_account_empty() {
        assert_eq!(parse_bank_account(None, None, None, None), None);
        assert_eq!(parse_bank_account(Some("12"), Some("abc"), None, None), None);
    }
}
