//! Field normalizer: raw extraction to typed invoice fields.
//!
//! Pure transformation. Values that cannot be coerced become absent and are
//! recorded as [`NormalizationNote`]s, which the validator turns into
//! diagnostics. Only a missing invoice number, currency or line item list
//! stops a document here.

pub mod rules;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use crate::directory::normalize_name;
use crate::error::DocumentError;
use crate::models::config::DefaultCustomer;
use crate::models::invoice::{
    AdditionalCharge, Address, Contact, LineItem, NormalizationNote, NormalizedInvoiceFields,
    Party, PaymentInfo, TaxCategory,
};
use crate::models::raw::{ChargeKind, RawCharge, RawExtraction, RawLineItem, RawParty, RawPayment};
use crate::validate::identifiers::{clean_cvr, cvr_from_vat_number};

use rules::patterns::{POSTAL_CODE_DK, STREET_NUMBER};
use rules::{
    due_date_from_terms, parse_bank_account, parse_danish_amount, parse_date, parse_fik,
    round_money, unit_code,
};

/// Coerces a [`RawExtraction`] into [`NormalizedInvoiceFields`].
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    default_customer: DefaultCustomer,
    use_default_customer_only: bool,
    processing_date: NaiveDate,
}

/// Notes collected while normalizing one document.
#[derive(Default)]
struct Notes(Vec<NormalizationNote>);

impl Notes {
    fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(NormalizationNote {
            field: field.into(),
            message: message.into(),
        });
    }
}

impl FieldNormalizer {
    /// `processing_date` stands in for a missing issue date.
    pub fn new(default_customer: DefaultCustomer, processing_date: NaiveDate) -> Self {
        Self {
            default_customer,
            use_default_customer_only: false,
            processing_date,
        }
    }

    pub fn with_default_customer_only(mut self, enabled: bool) -> Self {
        self.use_default_customer_only = enabled;
        self
    }

    pub fn normalize(&self, raw: &RawExtraction) -> Result<NormalizedInvoiceFields, DocumentError> {
        let invoice_number = raw.invoice_number.as_str().map(str::to_string);
        let currency = raw.currency.as_str().and_then(normalize_currency);

        let mut missing = Vec::new();
        if invoice_number.is_none() {
            missing.push("invoice_number".to_string());
        }
        if currency.is_none() {
            missing.push("currency".to_string());
        }
        if raw.line_items.is_empty() {
            missing.push("line_items".to_string());
        }
        let (invoice_number, currency) = match (invoice_number, currency) {
            (Some(number), Some(currency)) if missing.is_empty() => (number, currency),
            _ => return Err(DocumentError::ExtractionIncomplete { missing }),
        };

        let mut notes = Notes::default();

        let issue_date = match raw.issue_date.as_str() {
            Some(text) => parse_date(text).unwrap_or_else(|| {
                notes.add("issue_date", format!("unparsable date '{}', using processing date", text));
                self.processing_date
            }),
            None => {
                notes.add("issue_date", "issue date missing, using processing date");
                self.processing_date
            }
        };

        let payment = self.normalize_payment(&raw.payment, &mut notes);

        let due_date = match raw.due_date.as_str() {
            Some(text) => {
                let parsed = parse_date(text);
                if parsed.is_none() {
                    notes.add("due_date", format!("unparsable date '{}'", text));
                }
                parsed
            }
            None => None,
        }
        .or_else(|| {
            payment
                .terms
                .as_deref()
                .and_then(|terms| due_date_from_terms(issue_date, terms))
        });

        let supplier = normalize_party("supplier", &raw.supplier, &mut notes);
        let (customer, customer_is_default) = self.resolve_customer(&raw.customer, &mut notes);

        let line_items = raw
            .line_items
            .iter()
            .enumerate()
            .map(|(i, item)| normalize_line(i + 1, item, &mut notes))
            .collect();

        let charges = raw
            .charges
            .iter()
            .enumerate()
            .filter_map(|(i, charge)| normalize_charge(i + 1, charge, &mut notes))
            .collect();

        let stated_total = parse_amount_field("total_amount", raw.total_amount.as_str(), &mut notes);

        debug!(
            "Normalized invoice {} with {} notes",
            invoice_number,
            notes.0.len()
        );

        Ok(NormalizedInvoiceFields {
            invoice_number,
            issue_date,
            due_date,
            currency,
            customer_reference: raw.customer_reference.as_str().map(str::to_string),
            order_number: raw.order_number.as_str().map(str::to_string),
            supplier,
            customer,
            customer_is_default,
            line_items,
            charges,
            payment,
            stated_total,
            notes: notes.0,
        })
    }

    fn default_party(&self) -> Party {
        let c = &self.default_customer;
        let (street, building_number) = split_street(&c.street);
        Party {
            name: Some(c.name.clone()),
            address: Address {
                street,
                building_number,
                postal_code: Some(c.postal_code.clone()),
                city: Some(c.city.clone()),
                country: c.country.clone(),
            },
            cvr: Some(c.cvr.clone()),
            vat_number: c.vat_number.clone(),
            gln: c.gln.clone(),
            contact: Contact {
                name: c.contact_name.clone(),
                phone: c.contact_phone.clone(),
                email: c.contact_email.clone(),
            },
        }
    }

    /// Apply the customer policy. Returns the party and whether it is the default.
    fn resolve_customer(&self, raw: &RawParty, notes: &mut Notes) -> (Party, bool) {
        if self.use_default_customer_only {
            return (self.default_party(), true);
        }
        if raw.is_empty() {
            notes.add("customer", "no customer extracted, using default customer");
            return (self.default_party(), true);
        }

        let mut party = normalize_party("customer", raw, notes);
        let default = self.default_party();
        let mut filled = Vec::new();

        if party.name.is_none() {
            party.name = default.name.clone();
            filled.push("name");
        }
        if party.address.is_empty() {
            party.address = default.address.clone();
            filled.push("address");
        }
        if party.contact.is_empty() {
            party.contact = default.contact.clone();
            filled.push("contact");
        }

        // Identifiers only carry over when the customer is the default company.
        let same_company = party
            .name
            .as_deref()
            .zip(default.name.as_deref())
            .is_some_and(|(a, b)| normalize_name(a) == normalize_name(b));
        if same_company {
            if party.cvr.is_none() {
                party.cvr = default.cvr.clone();
                filled.push("cvr");
            }
            if party.vat_number.is_none() {
                party.vat_number = default.vat_number.clone();
            }
            if party.gln.is_none() {
                party.gln = default.gln.clone();
            }
        }

        if !filled.is_empty() {
            notes.add(
                "customer",
                format!("taken from default customer: {}", filled.join(", ")),
            );
        }
        (party, false)
    }

    fn normalize_payment(&self, raw: &RawPayment, notes: &mut Notes) -> PaymentInfo {
        let fik = raw.fik_code.as_str().and_then(|code| {
            let parsed = parse_fik(code);
            if parsed.is_none() {
                notes.add("payment.fik_code", format!("unrecognized FIK code '{}'", code));
            }
            parsed
        });

        let bank = parse_bank_account(
            raw.reg_number.as_str(),
            raw.account_number.as_str(),
            raw.iban.as_str(),
            raw.bic.as_str(),
        );

        if raw.means_code.as_str() == Some("93") && fik.is_none() {
            notes.add("payment.means_code", "payment means 93 (FIK) stated without a FIK code");
        }

        PaymentInfo {
            terms: raw.terms.as_str().map(str::to_string),
            bank,
            fik,
        }
    }
}

/// Upper-case ISO code; "kr", "kr." and "dkr" mean DKK.
pub fn normalize_currency(raw: &str) -> Option<String> {
    let upper = raw.trim().trim_end_matches('.').to_uppercase();
    let code = match upper.as_str() {
        "KR" | "DKR" | "DANSKE KRONER" => "DKK".to_string(),
        "€" => "EUR".to_string(),
        _ => upper,
    };
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Some(code)
    } else {
        None
    }
}

/// Split "Hovedgade 45B" into street name and building number.
fn split_street(street: &str) -> (Option<String>, Option<String>) {
    let street = street.trim();
    if street.is_empty() {
        return (None, None);
    }
    match STREET_NUMBER.captures(street) {
        Some(caps) => (Some(caps[1].to_string()), Some(caps[2].trim().to_string())),
        None => (Some(street.to_string()), None),
    }
}

fn normalize_country(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "DK".to_string();
    };
    let upper = raw.trim().to_uppercase();
    match upper.as_str() {
        "DANMARK" | "DENMARK" | "DNK" => "DK".to_string(),
        "SVERIGE" | "SWEDEN" => "SE".to_string(),
        "NORGE" | "NORWAY" => "NO".to_string(),
        "TYSKLAND" | "GERMANY" | "DEUTSCHLAND" => "DE".to_string(),
        code if code.len() == 2 => code.to_string(),
        _ => "DK".to_string(),
    }
}

fn normalize_party(path: &str, raw: &RawParty, notes: &mut Notes) -> Party {
    let (street, building_number) = raw
        .street
        .as_str()
        .map(split_street)
        .unwrap_or((None, None));

    let country = normalize_country(raw.country.as_str());
    let postal_code = raw.postal_code.as_str().map(|code| {
        if country == "DK" {
            POSTAL_CODE_DK
                .captures(code)
                .map(|caps| caps[1].to_string())
                .unwrap_or_else(|| code.to_string())
        } else {
            code.to_string()
        }
    });

    let vat_number = raw
        .vat_number
        .as_str()
        .map(|v| v.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase());

    let cvr = match raw.cvr.as_str() {
        Some(text) => Some(clean_cvr(text)),
        None => {
            let derived = vat_number.as_deref().and_then(cvr_from_vat_number);
            if derived.is_some() {
                notes.add(format!("{}.cvr", path), "CVR derived from VAT number");
            }
            derived
        }
    };

    Party {
        name: raw.name.as_str().map(str::to_string),
        address: Address {
            street,
            building_number,
            postal_code,
            city: raw.city.as_str().map(str::to_string),
            country,
        },
        cvr,
        vat_number,
        gln: None,
        contact: Contact {
            name: raw.contact_name.as_str().map(str::to_string),
            phone: raw.contact_phone.as_str().map(str::to_string),
            email: raw.contact_email.as_str().map(str::to_string),
        },
    }
}

fn parse_amount_field(path: &str, text: Option<&str>, notes: &mut Notes) -> Option<Decimal> {
    let text = text?;
    let parsed = parse_danish_amount(text);
    if parsed.is_none() {
        notes.add(path, format!("malformed number '{}'", text));
    }
    parsed
}

fn parse_tax_category(raw: Option<&str>) -> TaxCategory {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("0" | "0%" | "zero" | "zerorated" | "momsfri" | "exempt") => TaxCategory::ZeroRated,
        _ => TaxCategory::StandardRated,
    }
}

fn normalize_line(number: usize, raw: &RawLineItem, notes: &mut Notes) -> LineItem {
    let path = format!("line_items[{}]", number);

    let description = raw
        .description
        .as_str()
        .or(raw.item_number.as_str())
        .map(str::to_string)
        .unwrap_or_default();

    let mut quantity = parse_amount_field(&format!("{}.quantity", path), raw.quantity.as_str(), notes);
    let mut unit_price =
        parse_amount_field(&format!("{}.unit_price", path), raw.unit_price.as_str(), notes);
    let stated_total =
        parse_amount_field(&format!("{}.line_total", path), raw.line_total.as_str(), notes);

    let mut discount_percent =
        parse_amount_field(&format!("{}.discount", path), raw.discount_percent.as_str(), notes);
    if let Some(discount) = discount_percent {
        if discount < Decimal::ZERO || discount > Decimal::ONE_HUNDRED {
            notes.add(format!("{}.discount", path), format!("discount {}% ignored", discount));
            discount_percent = None;
        } else if discount.is_zero() {
            discount_percent = None;
        }
    }

    // A line printed with only an amount is one unit at that amount.
    if !raw.quantity.is_present() && (unit_price.is_some() || stated_total.is_some()) {
        quantity = Some(Decimal::ONE);
        notes.add(format!("{}.quantity", path), "quantity missing, assuming 1");
    }
    if !raw.unit_price.is_present() && discount_percent.is_none() {
        if let (Some(total), Some(qty)) = (stated_total, quantity) {
            if let Some(derived) = total.checked_div(qty) {
                unit_price = Some(derived);
                notes.add(format!("{}.unit_price", path), "unit price derived from line total");
            }
        }
    }

    LineItem {
        item_number: raw.item_number.as_str().map(str::to_string),
        description,
        quantity,
        unit_code: unit_code(raw.unit.as_str()).to_string(),
        unit_price,
        discount_percent,
        tax_category: parse_tax_category(raw.tax_category.as_str()),
        stated_total,
    }
}

fn normalize_charge(number: usize, raw: &RawCharge, notes: &mut Notes) -> Option<AdditionalCharge> {
    let path = format!("charges[{}]", number);
    let amount = match raw.amount.as_str() {
        Some(text) => match parse_danish_amount(text) {
            Some(amount) => round_money(amount),
            None => {
                notes.add(path, format!("malformed charge amount '{}', charge dropped", text));
                return None;
            }
        },
        None => return None,
    };
    if amount.is_zero() {
        return None;
    }

    let (reason_code, default_label) = match raw.kind {
        ChargeKind::Environmental => ("ENV", "Miljøafgift"),
        ChargeKind::Freight => ("FC", "Fragt"),
        ChargeKind::Other => ("ZZZ", "Gebyr"),
    };

    Some(AdditionalCharge {
        reason_code: reason_code.to_string(),
        label: raw.label.as_str().unwrap_or(default_label).to_string(),
        amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::raw::Field;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn line(desc: &str, qty: &str, price: &str) -> RawLineItem {
        RawLineItem {
            description: desc.into(),
            quantity: qty.into(),
            unit_price: price.into(),
            ..Default::default()
        }
    }

    fn raw_invoice() -> RawExtraction {
        RawExtraction {
            invoice_number: "112262".into(),
            currency: "DKK".into(),
            supplier: RawParty::named("lego system a/s"),
            line_items: vec![line("Widget", "2", "100,00")],
            ..Default::default()
        }
    }

    fn normalizer() -> FieldNormalizer {
        FieldNormalizer::new(DefaultCustomer::default(), today())
    }

    #[test]
    fn test_normalize_minimal() {
        let fields = normalizer().normalize(&raw_invoice()).unwrap();
        assert_eq!(fields.invoice_number, "112262");
        assert_eq!(fields.currency, "DKK");
        assert_eq!(fields.issue_date, today());
        assert_eq!(fields.line_items[0].quantity, Some(d("2")));
        assert_eq!(fields.line_items[0].unit_price, Some(d("100.00")));
        assert_eq!(fields.line_items[0].unit_code, "EA");
        assert!(fields.notes.iter().any(|n| n.field == "issue_date"));
    }

    #[test]
    fn test_missing_required_fields() {
        let raw = RawExtraction {
            invoice_number: "1".into(),
            ..Default::default()
        };
        match normalizer().normalize(&raw) {
            Err(DocumentError::ExtractionIncomplete { missing }) => {
                assert_eq!(missing, vec!["currency".to_string(), "line_items".to_string()]);
            }
            other => panic!("expected ExtractionIncomplete, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_currency_is_missing() {
        let mut raw = raw_invoice();
        raw.currency = "Danish".into();
        assert!(matches!(
            normalizer().normalize(&raw),
            Err(DocumentError::ExtractionIncomplete { .. })
        ));
        raw.currency = "kr.".into();
        assert_eq!(normalizer().normalize(&raw).unwrap().currency, "DKK");
    }

    #[test]
    fn test_default_customer_only_discards_extracted() {
        let mut raw = raw_invoice();
        raw.customer = RawParty::named("Someone Else ApS");
        let fields = normalizer()
            .with_default_customer_only(true)
            .normalize(&raw)
            .unwrap();
        assert!(fields.customer_is_default);
        assert_eq!(fields.customer.name.as_deref(), Some("Nordsjælland Teknik ApS"));
        assert_eq!(fields.customer.cvr.as_deref(), Some("29847156"));
        assert_eq!(fields.customer.address.street.as_deref(), Some("Hovedgade"));
        assert_eq!(fields.customer.address.building_number.as_deref(), Some("45B"));
    }

    #[test]
    fn test_extracted_customer_fills_missing_parts() {
        let mut raw = raw_invoice();
        raw.customer = RawParty {
            name: "Someone Else ApS".into(),
            cvr: "DK12345678".into(),
            ..Default::default()
        };
        let fields = normalizer().normalize(&raw).unwrap();
        assert!(!fields.customer_is_default);
        assert_eq!(fields.customer.name.as_deref(), Some("Someone Else ApS"));
        assert_eq!(fields.customer.cvr.as_deref(), Some("12345678"));
        assert_eq!(fields.customer.address.city.as_deref(), Some("Hillerød"));
    }

    #[test]
    fn test_other_customer_does_not_inherit_default_cvr() {
        let mut raw = raw_invoice();
        raw.customer = RawParty::named("Someone Else ApS");
        let fields = normalizer().normalize(&raw).unwrap();
        assert_eq!(fields.customer.cvr, None);
    }

    #[test]
    fn test_malformed_numbers_become_absent() {
        let mut raw = raw_invoice();
        raw.line_items = vec![line("Widget", "to", "100,00")];
        raw.total_amount = "ca. 250".into();
        let fields = normalizer().normalize(&raw).unwrap();
        assert_eq!(fields.line_items[0].quantity, None);
        assert_eq!(fields.stated_total, None);
        assert!(fields.notes.iter().any(|n| n.field == "line_items[1].quantity"));
        assert!(fields.notes.iter().any(|n| n.field == "total_amount"));
    }

    #[test]
    fn test_line_with_only_amount() {
        let mut raw = raw_invoice();
        raw.line_items = vec![RawLineItem {
            description: "Fragt".into(),
            line_total: "150,00".into(),
            ..Default::default()
        }];
        let fields = normalizer().normalize(&raw).unwrap();
        let item = &fields.line_items[0];
        assert_eq!(item.quantity, Some(Decimal::ONE));
        assert_eq!(item.unit_price, Some(d("150")));
        assert_eq!(item.net_amount(), Some(d("150")));
    }

    #[test]
    fn test_dates_and_terms() {
        let mut raw = raw_invoice();
        raw.issue_date = "15-01-2024".into();
        raw.payment.terms = "Netto 14 dage".into();
        let fields = normalizer().normalize(&raw).unwrap();
        assert_eq!(fields.issue_date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(fields.due_date, NaiveDate::from_ymd_opt(2024, 1, 29));

        raw.due_date = "2024-02-01".into();
        let fields = normalizer().normalize(&raw).unwrap();
        assert_eq!(fields.due_date, NaiveDate::from_ymd_opt(2024, 2, 1));
    }

    #[test]
    fn test_charges() {
        let mut raw = raw_invoice();
        raw.charges = vec![
            RawCharge {
                kind: ChargeKind::Environmental,
                label: Field::Absent,
                amount: "12,50".into(),
            },
            RawCharge {
                kind: ChargeKind::Freight,
                label: "Levering".into(),
                amount: "0".into(),
            },
            RawCharge {
                kind: ChargeKind::Other,
                label: Field::Absent,
                amount: "gratis".into(),
            },
        ];
        let fields = normalizer().normalize(&raw).unwrap();
        assert_eq!(fields.charges.len(), 1);
        assert_eq!(fields.charges[0].reason_code, "ENV");
        assert_eq!(fields.charges[0].label, "Miljøafgift");
        assert_eq!(fields.charges[0].amount, d("12.50"));
        assert!(fields.notes.iter().any(|n| n.field == "charges[3]"));
    }

    #[test]
    fn test_supplier_cvr_from_vat() {
        let mut raw = raw_invoice();
        raw.supplier.vat_number = "DK 47 45 87 14".into();
        let fields = normalizer().normalize(&raw).unwrap();
        assert_eq!(fields.supplier.cvr.as_deref(), Some("47458714"));
        assert_eq!(fields.supplier.vat_number.as_deref(), Some("DK47458714"));
    }

    #[test]
    fn test_payment_fik() {
        let mut raw = raw_invoice();
        raw.payment.fik_code = "+71<000000001234567+12345678<".into();
        let fields = normalizer().normalize(&raw).unwrap();
        assert_eq!(fields.payment.means().code(), "93");
    }

    #[test]
    fn test_normalize_currency() {
        assert_eq!(normalize_currency("dkk").as_deref(), Some("DKK"));
        assert_eq!(normalize_currency("DKR").as_deref(), Some("DKK"));
        assert_eq!(normalize_currency("EURO"), None);
    }
}
