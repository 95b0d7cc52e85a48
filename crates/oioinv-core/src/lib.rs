//! Core library for turning Danish supplier invoices into OIOUBL 2.02 XML.
//!
//! This crate provides:
//! - Company directory lookup (name to CVR and GLN)
//! - Field normalization of AI-extracted invoice data
//! - Business-rule validation with error and warning diagnostics
//! - OIOUBL invoice compilation with VAT totals
//! - Token usage ledger with cost estimation
//! - Batch orchestration with per-document failure isolation
//! - Adapters for PDF text, AI field extraction and delivery sinks

pub mod batch;
pub mod compile;
pub mod directory;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod models;
pub mod normalize;
pub mod validate;

pub use batch::{BatchOrchestrator, BatchReport, ItemOutcome, Outcome, SourceDocument};
pub use compile::{CompiledInvoice, InvoiceCompiler, InvoiceSummary, parse_invoice_summary};
pub use directory::CompanyDirectory;
pub use error::{DispatchError, DocumentError, Error, FailureKind, Result, ServiceError};
pub use ledger::{PriceTable, UsageLedger, UsageLog, UsageTotals};
pub use models::config::AppConfig;
pub use models::raw::{Field, RawExtraction, TokenUsage};
pub use normalize::FieldNormalizer;
pub use validate::{Diagnostic, Severity, ValidatedInvoice, ValidationReport, Validator};
