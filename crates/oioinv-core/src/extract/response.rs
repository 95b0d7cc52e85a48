//! Turning model replies into [`RawExtraction`] field sets.
//!
//! Replies are flat JSON objects (`supplier_name`, `line_items`, ...). Values
//! are kept as text; `null`, blank strings and missing keys become
//! [`Field::Absent`].

use serde_json::{Map, Value};
use tracing::warn;

use crate::models::raw::{
    ChargeKind, Field, RawCharge, RawExtraction, RawLineItem, RawParty, RawPayment,
};

/// Strip code fences and anything outside the outermost JSON object.
pub fn clean_json(content: &str) -> &str {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed).trim();

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Close an unterminated string and unbalanced brackets of a truncated reply.
pub fn repair_json(content: &str) -> String {
    let mut fixed = String::with_capacity(content.len() + 8);
    let mut in_string = false;
    let mut escaped = false;
    let mut open: Vec<char> = Vec::new();

    for c in content.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                '\n' | '\r' => {
                    fixed.push_str("\\n");
                    continue;
                }
                _ => {}
            }
        } else {
            match c {
                '"' => in_string = true,
                '{' => open.push('}'),
                '[' => open.push(']'),
                '}' | ']' => {
                    open.pop();
                }
                _ => {}
            }
        }
        fixed.push(c);
    }

    if in_string {
        fixed.push('"');
    }
    let trimmed_len = fixed.trim_end().trim_end_matches(',').len();
    fixed.truncate(trimmed_len);
    while let Some(close) = open.pop() {
        fixed.push(close);
    }
    fixed
}

/// Parse a reply into a JSON object, repairing it once if needed.
pub fn parse_reply(content: &str) -> Result<Map<String, Value>, String> {
    let cleaned = clean_json(content);
    let value = match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => value,
        Err(first) => {
            warn!("Reply is not valid JSON ({}), attempting repair", first);
            serde_json::from_str::<Value>(&repair_json(cleaned))
                .map_err(|e| format!("reply is not valid JSON: {}", e))?
        }
    };
    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("reply is a JSON {}, expected an object", json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text of a scalar value. Numbers keep their JSON spelling.
fn text(value: Option<&Value>) -> Field<String> {
    match value {
        Some(Value::String(s)) => Field::text(Some(s)),
        Some(Value::Number(n)) => Field::Present(n.to_string()),
        _ => Field::Absent,
    }
}

fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Field<String> {
    keys.iter()
        .map(|k| text(map.get(*k)))
        .find(Field::is_present)
        .unwrap_or_default()
}

fn party(map: &Map<String, Value>, prefix: &str) -> RawParty {
    let get = |suffixes: &[&str]| {
        let keys: Vec<String> = suffixes.iter().map(|s| format!("{}_{}", prefix, s)).collect();
        let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
        first_text(map, &keys)
    };
    RawParty {
        name: get(&["name"]),
        street: get(&["street", "address"]),
        city: get(&["city"]),
        postal_code: get(&["postal_code", "zip"]),
        country: get(&["country"]),
        cvr: get(&["cvr"]),
        vat_number: get(&["vat", "vat_number", "se_number"]),
        contact_name: get(&["contact_name", "contact"]),
        contact_phone: get(&["contact_phone", "phone"]),
        contact_email: get(&["contact_email", "email"]),
    }
}

fn line_item(value: &Value) -> Option<RawLineItem> {
    let map = value.as_object()?;
    Some(RawLineItem {
        item_number: first_text(map, &["item_number", "item_no", "sku"]),
        description: first_text(map, &["description", "name"]),
        quantity: first_text(map, &["quantity", "qty"]),
        unit: first_text(map, &["unit", "unit_of_measure"]),
        unit_price: first_text(map, &["unit_price", "price"]),
        discount_percent: first_text(map, &["discount", "discount_percent"]),
        line_total: first_text(map, &["amount", "line_total", "total"]),
        tax_category: first_text(map, &["tax_category", "vat_percent", "tax_percent"]),
    })
}

fn charges(map: &Map<String, Value>) -> Vec<RawCharge> {
    let mut charges = Vec::new();
    let labelled = [
        (ChargeKind::Environmental, "environmental_fee"),
        (ChargeKind::Freight, "shipping_fee"),
    ];
    for (kind, key) in labelled {
        let amount = text(map.get(key));
        if amount.is_present() {
            charges.push(RawCharge {
                kind,
                label: text(map.get(&format!("{}_description", key))),
                amount,
            });
        }
    }
    if let Some(Value::Array(others)) = map.get("other_charges") {
        for other in others.iter().filter_map(Value::as_object) {
            charges.push(RawCharge {
                kind: ChargeKind::Other,
                label: first_text(other, &["description", "label"]),
                amount: first_text(other, &["amount"]),
            });
        }
    }
    charges
}

fn payment(map: &Map<String, Value>) -> RawPayment {
    RawPayment {
        terms: first_text(map, &["payment_terms"]),
        means_code: first_text(map, &["payment_means_code"]),
        fik_code: first_text(map, &["fik_code", "fik"]),
        reg_number: first_text(map, &["reg_number", "bank_reg_number"]),
        account_number: first_text(map, &["account_number", "bank_account"]),
        iban: first_text(map, &["iban"]),
        bic: first_text(map, &["bic", "swift"]),
    }
}

/// Map one reply object to a field set. Usage is left empty.
pub fn extraction_from_reply(map: &Map<String, Value>) -> RawExtraction {
    let line_items = match map.get("line_items") {
        Some(Value::Array(items)) => items.iter().filter_map(line_item).collect(),
        _ => Vec::new(),
    };
    RawExtraction {
        invoice_number: first_text(map, &["invoice_number"]),
        issue_date: first_text(map, &["invoice_date", "issue_date"]),
        due_date: first_text(map, &["due_date", "payment_due_date"]),
        currency: first_text(map, &["currency"]),
        customer_reference: first_text(map, &["customer_reference"]),
        order_number: first_text(map, &["order_number"]),
        supplier: party(map, "supplier"),
        customer: party(map, "customer"),
        line_items,
        charges: charges(map),
        payment: payment(map),
        total_amount: first_text(map, &["total_amount", "total"]),
        usage: Vec::new(),
    }
}

fn fill(target: &mut Field<String>, source: Field<String>) {
    if !target.is_present() {
        *target = source;
    }
}

fn fill_party(target: &mut RawParty, source: RawParty) {
    fill(&mut target.name, source.name);
    fill(&mut target.street, source.street);
    fill(&mut target.city, source.city);
    fill(&mut target.postal_code, source.postal_code);
    fill(&mut target.country, source.country);
    fill(&mut target.cvr, source.cvr);
    fill(&mut target.vat_number, source.vat_number);
    fill(&mut target.contact_name, source.contact_name);
    fill(&mut target.contact_phone, source.contact_phone);
    fill(&mut target.contact_email, source.contact_email);
}

/// Merge a later chunk into the running field set.
///
/// Scalars keep the first present value. Line items are appended, except
/// items identical to ones from earlier chunks, which come from the overlap
/// between consecutive chunks. Charges are taken from the first chunk that has any.
pub fn merge_extractions(into: &mut RawExtraction, next: RawExtraction) {
    fill(&mut into.invoice_number, next.invoice_number);
    fill(&mut into.issue_date, next.issue_date);
    fill(&mut into.due_date, next.due_date);
    fill(&mut into.currency, next.currency);
    fill(&mut into.customer_reference, next.customer_reference);
    fill(&mut into.order_number, next.order_number);
    fill(&mut into.total_amount, next.total_amount);
    fill_party(&mut into.supplier, next.supplier);
    fill_party(&mut into.customer, next.customer);

    let seen = into.line_items.len();
    for item in next.line_items {
        if !into.line_items[..seen].contains(&item) {
            into.line_items.push(item);
        }
    }

    if into.charges.is_empty() {
        into.charges = next.charges;
    }

    let RawPayment {
        terms,
        means_code,
        fik_code,
        reg_number,
        account_number,
        iban,
        bic,
    } = next.payment;
    fill(&mut into.payment.terms, terms);
    fill(&mut into.payment.means_code, means_code);
    fill(&mut into.payment.fik_code, fik_code);
    fill(&mut into.payment.reg_number, reg_number);
    fill(&mut into.payment.account_number, account_number);
    fill(&mut into.payment.iban, iban);
    fill(&mut into.payment.bic, bic);

    into.usage.extend(next.usage);
}
