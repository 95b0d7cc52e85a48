//! Business-rule validator.
//!
//! Produces a list of diagnostics instead of a pass/fail flag. Any
//! error-level diagnostic blocks compilation; warnings travel with the
//! document into the batch report.

pub mod identifiers;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compile::totals::compute_totals;
use crate::directory::CompanyDirectory;
use crate::models::invoice::{NormalizedInvoiceFields, Party, PaymentMeansKind, ResolvedIdentity};

use identifiers::{is_valid_cvr_format, is_valid_gln_format};

/// Allowed difference between computed and stated grand total (one øre).
pub const TOTALS_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path of the offending field, e.g. `line_items[2].quantity`.
    pub field: String,
    pub message: String,
}

impl Diagnostic {
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Ordered diagnostics for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }

    /// Errors joined into one line.
    pub fn error_summary(&self) -> String {
        self.errors()
            .map(Diagnostic::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Fields plus everything the validator learned about them.
#[derive(Debug, Clone)]
pub struct ValidatedInvoice {
    pub fields: NormalizedInvoiceFields,
    pub supplier: ResolvedIdentity,
    pub customer: ResolvedIdentity,
    pub report: ValidationReport,
}

/// Checks normalized fields against Danish invoice rules.
pub struct Validator<'a> {
    directory: &'a CompanyDirectory,
}

impl<'a> Validator<'a> {
    pub fn new(directory: &'a CompanyDirectory) -> Self {
        Self { directory }
    }

    pub fn validate(&self, fields: NormalizedInvoiceFields) -> ValidatedInvoice {
        let mut report = ValidationReport::default();

        for note in &fields.notes {
            report.push(Diagnostic::warning(&note.field, &note.message));
        }

        check_header(&fields, &mut report);
        check_lines(&fields, &mut report);
        check_totals(&fields, &mut report);

        let supplier = self.resolve("supplier", &fields.supplier, &mut report);
        let customer = self.resolve("customer", &fields.customer, &mut report);

        debug!(
            "Validated invoice {}: {} errors, {} warnings",
            fields.invoice_number,
            report.errors().count(),
            report.warnings().count()
        );

        ValidatedInvoice {
            fields,
            supplier,
            customer,
            report,
        }
    }

    /// Check identifiers and attach directory CVR/GLN to a party.
    fn resolve(&self, path: &str, party: &Party, report: &mut ValidationReport) -> ResolvedIdentity {
        let name = party.name.clone().unwrap_or_default();
        let entry = self.directory.lookup(&name);

        let mut cvr = None;
        if let Some(extracted) = &party.cvr {
            if is_valid_cvr_format(extracted) {
                cvr = Some(extracted.clone());
            } else {
                report.push(Diagnostic::error(
                    format!("{}.cvr", path),
                    format!("CVR must be exactly 8 digits, got '{}'", extracted),
                ));
            }
        }

        if let Some(entry) = &entry {
            match (&cvr, &entry.cvr) {
                (None, Some(dir_cvr)) if party.cvr.is_none() => cvr = Some(dir_cvr.clone()),
                (Some(own), Some(dir_cvr)) if own != dir_cvr => {
                    report.push(Diagnostic::warning(
                        format!("{}.cvr", path),
                        format!("CVR {} differs from directory entry {}", own, dir_cvr),
                    ));
                }
                _ => {}
            }
        } else if party.cvr.is_none() {
            report.push(Diagnostic::warning(
                format!("{}.cvr", path),
                format!("CVR absent and no directory match for '{}'", name),
            ));
        }

        let gln = match &party.gln {
            Some(gln) if is_valid_gln_format(gln) => Some(gln.clone()),
            Some(gln) => {
                report.push(Diagnostic::error(
                    format!("{}.gln", path),
                    format!("GLN must be exactly 13 digits, got '{}'", gln),
                ));
                None
            }
            None => entry.and_then(|e| e.gln),
        };

        ResolvedIdentity { name, cvr, gln }
    }
}

fn check_header(fields: &NormalizedInvoiceFields, report: &mut ValidationReport) {
    if fields.invoice_number.trim().is_empty() {
        report.push(Diagnostic::error("invoice_number", "invoice number is empty"));
    }
    if fields.currency.len() != 3 || !fields.currency.chars().all(|c| c.is_ascii_uppercase()) {
        report.push(Diagnostic::error(
            "currency",
            format!("currency '{}' is not a 3-letter ISO code", fields.currency),
        ));
    }
    if fields.supplier.name.as_deref().is_none_or(|n| n.trim().is_empty()) {
        report.push(Diagnostic::error("supplier.name", "supplier name missing"));
    }
    if let Some(due) = fields.due_date {
        if due < fields.issue_date {
            report.push(Diagnostic::warning("due_date", "due date is before issue date"));
        }
    }
    if fields.payment.means() == PaymentMeansKind::Fik && fields.due_date.is_none() {
        report.push(Diagnostic::warning("due_date", "FIK payment without due date"));
    }
}

fn check_lines(fields: &NormalizedInvoiceFields, report: &mut ValidationReport) {
    if fields.line_items.is_empty() {
        report.push(Diagnostic::error("line_items", "at least one line item is required"));
        return;
    }

    for (i, line) in fields.line_items.iter().enumerate() {
        let path = format!("line_items[{}]", i + 1);

        match line.quantity {
            None => report.push(Diagnostic::error(
                format!("{}.quantity", path),
                "quantity missing or malformed",
            )),
            Some(q) if q <= Decimal::ZERO => report.push(Diagnostic::error(
                format!("{}.quantity", path),
                format!("quantity must be greater than zero, got {}", q),
            )),
            Some(_) => {}
        }

        match line.unit_price {
            None => report.push(Diagnostic::error(
                format!("{}.unit_price", path),
                "unit price missing or malformed",
            )),
            Some(p) if p < Decimal::ZERO => report.push(Diagnostic::error(
                format!("{}.unit_price", path),
                format!("unit price must not be negative, got {}", p),
            )),
            Some(_) => {}
        }

        if line.description.trim().is_empty() {
            report.push(Diagnostic::warning(
                format!("{}.description", path),
                "line has no description",
            ));
        }

        if line.is_out_of_range() {
            report.push(Diagnostic::error(
                format!("{}.line_total", path),
                "amount out of range: quantity x price is too large",
            ));
        }

        if let (Some(stated), Some(net)) = (line.stated_total, line.net_amount()) {
            if exceeds_tolerance(stated, net) {
                report.push(Diagnostic::warning(
                    format!("{}.line_total", path),
                    format!("stated line total {} differs from quantity x price {}", stated, net.round_dp(2)),
                ));
            }
        }
    }

    for (i, charge) in fields.charges.iter().enumerate() {
        if charge.amount < Decimal::ZERO {
            report.push(Diagnostic::error(
                format!("charges[{}]", i + 1),
                format!("charge amount must not be negative, got {}", charge.amount),
            ));
        }
    }
}

fn check_totals(fields: &NormalizedInvoiceFields, report: &mut ValidationReport) {
    let lines_complete = fields.line_items.iter().all(|l| l.net_amount().is_some());
    let totals = compute_totals(&fields.line_items, &fields.charges);
    // Line errors are reported already
    if totals.is_none() && lines_complete && !fields.line_items.is_empty() {
        report.push(Diagnostic::error(
            "total_amount",
            "amount out of range: invoice totals are too large",
        ));
    }

    let Some(stated) = fields.stated_total else {
        report.push(Diagnostic::warning(
            "total_amount",
            "no grand total stated, totals not reconciled",
        ));
        return;
    };
    let Some(totals) = totals else {
        return;
    };
    if exceeds_tolerance(totals.amount_after_tax, stated) {
        report.push(Diagnostic::error(
            "total_amount",
            format!(
                "totals mismatch: lines and charges with VAT give {}, invoice states {}",
                totals.amount_after_tax, stated
            ),
        ));
    }
}

/// Differences that do not fit a `Decimal` count as exceeding.
fn exceeds_tolerance(a: Decimal, b: Decimal) -> bool {
    a.checked_sub(b).is_none_or(|diff| diff.abs() > TOTALS_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::invoice::{Address, LineItem, PaymentInfo};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn party(name: &str, cvr: Option<&str>) -> Party {
        Party {
            name: Some(name.to_string()),
            address: Address {
                country: "DK".to_string(),
                ..Default::default()
            },
            cvr: cvr.map(str::to_string),
            ..Default::default()
        }
    }

    fn fields() -> NormalizedInvoiceFields {
        NormalizedInvoiceFields {
            invoice_number: "112262".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            due_date: None,
            currency: "DKK".to_string(),
            customer_reference: None,
            order_number: None,
            supplier: party("lego system a/s", None),
            customer: party("Nordsjælland Teknik ApS", Some("29847156")),
            customer_is_default: true,
            line_items: vec![LineItem::new("Widget", d("2"), d("100.00"))],
            charges: vec![],
            payment: PaymentInfo::default(),
            stated_total: Some(d("250.00")),
            notes: vec![],
        }
    }

    fn validate(fields: NormalizedInvoiceFields) -> ValidatedInvoice {
        let directory = CompanyDirectory::builtin();
        Validator::new(&directory).validate(fields)
    }

    #[test]
    fn test_valid_invoice_resolves_supplier() {
        let result = validate(fields());
        assert!(!result.report.has_errors(), "{:?}", result.report);
        assert_eq!(result.supplier.cvr.as_deref(), Some("47458714"));
        assert_eq!(result.supplier.gln.as_deref(), Some("5790000123456"));
        assert_eq!(result.customer.cvr.as_deref(), Some("29847156"));
    }

    #[test]
    fn test_totals_mismatch_is_error() {
        let mut f = fields();
        f.stated_total = Some(d("240.00"));
        let report = validate(f).report;
        let errors: Vec<_> = report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.starts_with("totals mismatch"));
    }

    #[test]
    fn test_totals_within_tolerance() {
        let mut f = fields();
        f.stated_total = Some(d("250.01"));
        assert!(!validate(f).report.has_errors());
    }

    #[test]
    fn test_amount_out_of_range_is_error() {
        let mut f = fields();
        f.line_items = vec![LineItem::new("Skrue", d("9999999999999999999999999999"), d("99999"))];
        let report = validate(f).report;
        let errors: Vec<_> = report.errors().collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "line_items[1].line_total");
        assert!(errors[0].message.starts_with("amount out of range"));
    }

    #[test]
    fn test_totals_out_of_range_is_error() {
        let mut f = fields();
        let line = LineItem::new("Skrue", d("1"), d("50000000000000000000000000000"));
        f.line_items = vec![line.clone(), line];
        let report = validate(f).report;
        assert!(report
            .errors()
            .any(|d| d.field == "total_amount" && d.message.starts_with("amount out of range")));
    }

    #[test]
    fn test_no_line_items_is_error() {
        let mut f = fields();
        f.line_items.clear();
        let report = validate(f).report;
        assert!(report.errors().any(|d| d.field == "line_items"));
    }

    #[test]
    fn test_line_rules() {
        let mut f = fields();
        let mut zero = LineItem::new("Nul", d("0"), d("10"));
        zero.stated_total = Some(d("0"));
        let mut negative = LineItem::new("Kredit", d("1"), d("-5"));
        negative.unit_price = Some(d("-5"));
        let mut missing = LineItem::new("Ukendt", d("1"), d("1"));
        missing.quantity = None;
        f.line_items = vec![zero, negative, missing];
        f.stated_total = None;

        let report = validate(f).report;
        let fields: Vec<_> = report.errors().map(|d| d.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "line_items[1].quantity",
                "line_items[2].unit_price",
                "line_items[3].quantity",
            ]
        );
    }

    #[test]
    fn test_malformed_cvr_is_error() {
        let mut f = fields();
        f.supplier.cvr = Some("1234567".to_string());
        let report = validate(f).report;
        assert!(report.errors().any(|d| d.field == "supplier.cvr"));
    }

    #[test]
    fn test_unknown_supplier_is_warning_only() {
        let mut f = fields();
        f.supplier = party("Ukendt Leverandør ApS", None);
        let result = validate(f);
        assert!(!result.report.has_errors());
        assert!(result.report.warnings().any(|d| d.field == "supplier.cvr"));
        assert_eq!(result.supplier.cvr, None);
    }

    #[test]
    fn test_cvr_disagrees_with_directory() {
        let mut f = fields();
        f.supplier.cvr = Some("12345678".to_string());
        let result = validate(f);
        assert!(!result.report.has_errors());
        assert_eq!(result.supplier.cvr.as_deref(), Some("12345678"));
        assert!(result.report.warnings().any(|d| d.message.contains("differs from directory")));
    }

    #[test]
    fn test_notes_become_warnings() {
        let mut f = fields();
        f.notes.push(crate::models::invoice::NormalizationNote {
            field: "issue_date".to_string(),
            message: "issue date missing, using processing date".to_string(),
        });
        let report = validate(f).report;
        assert_eq!(report.diagnostics[0].severity, Severity::Warning);
        assert_eq!(report.diagnostics[0].field, "issue_date");
    }

    #[test]
    fn test_tolerance_constant() {
        assert_eq!(TOTALS_TOLERANCE, d("0.01"));
    }
}
