//! Invoice compiler: validated fields to a compiled invoice and its OIOUBL XML.

pub mod oioubl;
pub mod reader;
pub mod totals;
pub mod xml;

use rust_decimal::Decimal;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::DocumentError;
use crate::models::invoice::{LineItem, NormalizedInvoiceFields, ResolvedIdentity};
use crate::normalize::rules::round_money;
use crate::validate::{Diagnostic, ValidatedInvoice};

pub use reader::{InvoiceSummary, parse_invoice_summary};
pub use totals::{TaxSubtotal, Totals, compute_totals};

/// One invoice line with its assigned number and computed amounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledLine {
    /// 1-based, in extraction order.
    pub line_number: u32,
    pub item: LineItem,
    pub quantity: Decimal,
    /// Unit price after discount.
    pub net_unit_price: Decimal,
    pub line_extension: Decimal,
    pub tax_amount: Decimal,
}

/// Document-ready invoice. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInvoice {
    /// Deterministic document UUID.
    pub uuid: String,
    pub fields: NormalizedInvoiceFields,
    pub supplier: ResolvedIdentity,
    pub customer: ResolvedIdentity,
    pub lines: Vec<CompiledLine>,
    pub totals: Totals,
    /// Validation warnings carried to the batch report.
    pub warnings: Vec<Diagnostic>,
}

impl CompiledInvoice {
    pub fn total_tax(&self) -> Decimal {
        self.totals.total_tax
    }

    pub fn amount_before_tax(&self) -> Decimal {
        self.totals.amount_before_tax
    }

    pub fn amount_after_tax(&self) -> Decimal {
        self.totals.amount_after_tax
    }

    /// Render to OIOUBL 2.02 XML.
    pub fn render(&self) -> Result<String, DocumentError> {
        oioubl::render(self).map_err(|e| compilation_error(&self.fields.invoice_number, e.to_string()))
    }
}

fn compilation_error(invoice_number: &str, message: String) -> DocumentError {
    error!(
        invoice = %invoice_number,
        "Invariant violated after validation passed: {}", message
    );
    DocumentError::Compilation(message)
}

/// Builds [`CompiledInvoice`]s. Pure: identical input gives identical output.
#[derive(Debug, Clone, Default)]
pub struct InvoiceCompiler;

impl InvoiceCompiler {
    pub fn new() -> Self {
        Self
    }

    pub fn compile(&self, validated: ValidatedInvoice) -> Result<CompiledInvoice, DocumentError> {
        if validated.report.has_errors() {
            return Err(DocumentError::ValidationFailed(validated.report));
        }
        let ValidatedInvoice {
            fields,
            supplier,
            customer,
            report,
        } = validated;

        check_structure(&fields).map_err(|m| compilation_error(&fields.invoice_number, m))?;

        let totals = compute_totals(&fields.line_items, &fields.charges).ok_or_else(|| {
            compilation_error(&fields.invoice_number, "line without quantity or price".to_string())
        })?;
        if totals.amount_before_tax.checked_add(totals.total_tax) != Some(totals.amount_after_tax) {
            return Err(compilation_error(
                &fields.invoice_number,
                "amount after tax does not equal amount before tax plus tax".to_string(),
            ));
        }

        let mut lines = Vec::with_capacity(fields.line_items.len());
        for (index, item) in fields.line_items.iter().enumerate() {
            let (Some(quantity), Some(net_unit_price), Some(net)) =
                (item.quantity, item.net_unit_price(), item.net_amount())
            else {
                return Err(compilation_error(
                    &fields.invoice_number,
                    format!("line {} lacks quantity or price", index + 1),
                ));
            };
            lines.push(CompiledLine {
                line_number: index as u32 + 1,
                item: item.clone(),
                quantity,
                net_unit_price,
                line_extension: round_money(net),
                tax_amount: round_money(net * item.tax_category.rate()),
            });
        }

        let uuid = document_uuid(&fields, &supplier);
        debug!(
            "Compiled invoice {} with {} lines, total tax {}",
            fields.invoice_number,
            lines.len(),
            totals.total_tax
        );

        Ok(CompiledInvoice {
            uuid,
            fields,
            supplier,
            customer,
            lines,
            totals,
            warnings: report.warnings().cloned().collect(),
        })
    }

    /// Compile and render in one step.
    pub fn compile_to_xml(
        &self,
        validated: ValidatedInvoice,
    ) -> Result<(CompiledInvoice, String), DocumentError> {
        let invoice = self.compile(validated)?;
        let xml = invoice.render()?;
        Ok((invoice, xml))
    }
}

/// Re-check the invariants the validator is expected to guarantee.
fn check_structure(fields: &NormalizedInvoiceFields) -> Result<(), String> {
    if fields.invoice_number.trim().is_empty() {
        return Err("invoice number is empty".to_string());
    }
    if fields.currency.len() != 3 || !fields.currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(format!("currency '{}' is not a 3-letter code", fields.currency));
    }
    if fields.line_items.is_empty() {
        return Err("no line items".to_string());
    }
    if fields.supplier.name.is_none() {
        return Err("supplier has no name".to_string());
    }
    for (i, line) in fields.line_items.iter().enumerate() {
        if !line.quantity.is_some_and(|q| q > Decimal::ZERO) {
            return Err(format!("line {} quantity is not positive", i + 1));
        }
        if !line.unit_price.is_some_and(|p| p >= Decimal::ZERO) {
            return Err(format!("line {} unit price is negative or missing", i + 1));
        }
    }
    Ok(())
}

/// Name-based UUID so re-compiling the same invoice yields the same document.
fn document_uuid(fields: &NormalizedInvoiceFields, supplier: &ResolvedIdentity) -> String {
    let seller = supplier.cvr.as_deref().unwrap_or(&supplier.name);
    let key = format!("oioubl:{}:{}:{}", seller, fields.invoice_number, fields.issue_date);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::CompanyDirectory;
    use crate::models::invoice::{Address, Party, PaymentInfo};
    use crate::validate::{Validator, ValidationReport};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn fields() -> NormalizedInvoiceFields {
        NormalizedInvoiceFields {
            invoice_number: "112262".to_string(),
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            due_date: None,
            currency: "DKK".to_string(),
            customer_reference: None,
            order_number: None,
            supplier: Party {
                name: Some("lego system a/s".to_string()),
                address: Address {
                    country: "DK".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            customer: Party {
                name: Some("Nordsjælland Teknik ApS".to_string()),
                cvr: Some("29847156".to_string()),
                address: Address {
                    country: "DK".to_string(),
                    ..Default::default()
                },
                ..Default::default()
            },
            customer_is_default: true,
            line_items: vec![
                LineItem::new("Widget", d("2"), d("100.00")),
                LineItem::new("Gadget", d("3"), d("10.10")),
            ],
            charges: vec![],
            payment: PaymentInfo::default(),
            stated_total: None,
            notes: vec![],
        }
    }

    fn validated(fields: NormalizedInvoiceFields) -> ValidatedInvoice {
        let directory = CompanyDirectory::builtin();
        Validator::new(&directory).validate(fields)
    }

    #[test]
    fn test_compile_numbers_lines_in_order() {
        let invoice = InvoiceCompiler::new().compile(validated(fields())).unwrap();
        let numbers: Vec<u32> = invoice.lines.iter().map(|l| l.line_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(invoice.lines[1].item.description, "Gadget");
        assert_eq!(invoice.lines[1].line_extension, d("30.30"));
        assert_eq!(invoice.amount_before_tax(), d("230.30"));
        assert_eq!(invoice.total_tax(), d("57.58"));
        assert_eq!(invoice.amount_after_tax(), d("287.88"));
    }

    #[test]
    fn test_compile_refuses_validation_errors() {
        let mut f = fields();
        f.stated_total = Some(d("1.00"));
        let result = InvoiceCompiler::new().compile(validated(f));
        assert!(matches!(result, Err(DocumentError::ValidationFailed(_))));
    }

    #[test]
    fn test_compile_defensive_check() {
        // Bypass the validator with an empty report
        let mut f = fields();
        f.line_items[0].quantity = Some(Decimal::ZERO);
        let validated = ValidatedInvoice {
            fields: f,
            supplier: ResolvedIdentity::default(),
            customer: ResolvedIdentity::default(),
            report: ValidationReport::default(),
        };
        let result = InvoiceCompiler::new().compile(validated);
        assert!(matches!(result, Err(DocumentError::Compilation(_))));
    }

    #[test]
    fn test_uuid_is_deterministic() {
        let a = InvoiceCompiler::new().compile(validated(fields())).unwrap();
        let b = InvoiceCompiler::new().compile(validated(fields())).unwrap();
        assert_eq!(a.uuid, b.uuid);

        let mut other = fields();
        other.invoice_number = "112263".to_string();
        let c = InvoiceCompiler::new().compile(validated(other)).unwrap();
        assert_ne!(a.uuid, c.uuid);
    }

    #[test]
    fn test_warnings_carried() {
        let invoice = InvoiceCompiler::new().compile(validated(fields())).unwrap();
        assert!(invoice.warnings.iter().any(|w| w.field == "total_amount"));
    }
}
