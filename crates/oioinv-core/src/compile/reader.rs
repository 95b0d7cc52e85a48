//! Read back the key figures of an OIOUBL invoice document.

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::Event;
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

use super::xml::{XmlError, XmlResult};

/// Header and monetary totals of a rendered invoice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvoiceSummary {
    pub invoice_number: String,
    pub uuid: String,
    pub currency: String,
    pub issue_date: Option<NaiveDate>,
    pub line_count: usize,
    pub supplier_name: Option<String>,
    pub customer_name: Option<String>,
    pub line_extension: Decimal,
    pub tax_total: Decimal,
    pub tax_inclusive: Decimal,
    pub payable: Decimal,
}

fn local_name(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    match name.split_once(':') {
        Some((_, local)) => local.to_string(),
        None => name.into_owned(),
    }
}

fn parse_amount(path: &str, text: &str) -> XmlResult<Decimal> {
    Decimal::from_str(text.trim())
        .map_err(|e| XmlError(format!("{}: invalid amount '{}': {}", path, text, e)))
}

/// Parse an invoice produced by [`super::oioubl::render`].
pub fn parse_invoice_summary(xml: &str) -> XmlResult<InvoiceSummary> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut summary = InvoiceSummary::default();
    let mut path: Vec<String> = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if path.is_empty() {
                    if name != "Invoice" {
                        return Err(XmlError(format!("root element is '{}', expected 'Invoice'", name)));
                    }
                    saw_root = true;
                }
                if path.len() == 1 && name == "InvoiceLine" {
                    summary.line_count += 1;
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                path.pop();
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| XmlError(e.to_string()))?.to_string();
                let joined = path.join("/");
                match joined.as_str() {
                    "Invoice/ID" => summary.invoice_number = text,
                    "Invoice/UUID" => summary.uuid = text,
                    "Invoice/DocumentCurrencyCode" => summary.currency = text,
                    "Invoice/IssueDate" => {
                        summary.issue_date = NaiveDate::parse_from_str(&text, "%Y-%m-%d").ok();
                    }
                    "Invoice/AccountingSupplierParty/Party/PartyName/Name" => {
                        summary.supplier_name = Some(text);
                    }
                    "Invoice/AccountingCustomerParty/Party/PartyName/Name" => {
                        summary.customer_name = Some(text);
                    }
                    "Invoice/TaxTotal/TaxAmount" => summary.tax_total = parse_amount(&joined, &text)?,
                    "Invoice/LegalMonetaryTotal/LineExtensionAmount" => {
                        summary.line_extension = parse_amount(&joined, &text)?;
                    }
                    "Invoice/LegalMonetaryTotal/TaxInclusiveAmount" => {
                        summary.tax_inclusive = parse_amount(&joined, &text)?;
                    }
                    "Invoice/LegalMonetaryTotal/PayableAmount" => {
                        summary.payable = parse_amount(&joined, &text)?;
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(XmlError(format!(
                    "parse error at position {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err(XmlError("document has no Invoice element".to_string()));
    }
    if summary.invoice_number.is_empty() {
        return Err(XmlError("invoice has no ID".to_string()));
    }
    Ok(summary)
}
