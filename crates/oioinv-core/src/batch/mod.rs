//! Batch orchestration: drive documents through the pipeline one at a time.
//!
//! Each document yields exactly one [`ItemOutcome`]. Failures are caught at
//! the document boundary and never stop the run.

mod sink;
mod source;

pub use sink::{DeliverySink, FileSink, GraphMailSink, claim_file_name, output_file_name};
pub use source::{LocalFolderSource, SourceDocument};

use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

use crate::compile::InvoiceCompiler;
use crate::directory::CompanyDirectory;
use crate::error::{DispatchError, DocumentError, FailureKind, ServiceError};
use crate::extract::{FieldExtractor, TextExtractor};
use crate::ledger::{UsageLedger, UsageLog, UsageTotals};
use crate::normalize::FieldNormalizer;
use crate::validate::{Diagnostic, Validator};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_EXTRACTION_TIMEOUT: Duration = Duration::from_secs(600);

/// Result of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success {
        invoice_number: String,
        /// Where the sink put the document.
        output: String,
        warnings: Vec<Diagnostic>,
    },
    Failure {
        kind: FailureKind,
        summary: String,
        diagnostics: Vec<Diagnostic>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    fn failure(name: &str, err: &DocumentError) -> Self {
        let diagnostics = match err {
            DocumentError::ValidationFailed(report) => report.diagnostics.clone(),
            _ => Vec::new(),
        };
        Self {
            name: name.to_string(),
            outcome: Outcome::Failure {
                kind: err.kind(),
                summary: err.to_string(),
                diagnostics,
            },
        }
    }
}

/// Per-run report. Items are in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<ItemOutcome>,
    pub usage: UsageTotals,
}

/// Runs documents through extraction, normalization, validation,
/// compilation and delivery.
pub struct BatchOrchestrator {
    text_extractor: Box<dyn TextExtractor>,
    field_extractor: Box<dyn FieldExtractor>,
    sink: Box<dyn DeliverySink>,
    normalizer: FieldNormalizer,
    directory: CompanyDirectory,
    compiler: InvoiceCompiler,
    call_timeout: Duration,
    extraction_timeout: Duration,
}

impl BatchOrchestrator {
    pub fn new(
        directory: CompanyDirectory,
        normalizer: FieldNormalizer,
        text_extractor: Box<dyn TextExtractor>,
        field_extractor: Box<dyn FieldExtractor>,
        sink: Box<dyn DeliverySink>,
    ) -> Self {
        Self {
            text_extractor,
            field_extractor,
            sink,
            normalizer,
            directory,
            compiler: InvoiceCompiler::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            extraction_timeout: DEFAULT_EXTRACTION_TIMEOUT,
        }
    }

    /// Upper bound on text extraction and on delivery.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Upper bound on field extraction of one document, across all the
    /// service calls it makes.
    pub fn with_extraction_timeout(mut self, timeout: Duration) -> Self {
        self.extraction_timeout = timeout;
        self
    }

    pub async fn run(&self, documents: &[SourceDocument], ledger: &mut UsageLedger) -> BatchReport {
        self.run_with(documents, ledger, |_| {}).await
    }

    /// Like [`Self::run`], calling `on_item` as each outcome is recorded.
    ///
    /// The ledger is reset first, so the report only counts this run.
    pub async fn run_with<F>(
        &self,
        documents: &[SourceDocument],
        ledger: &mut UsageLedger,
        mut on_item: F,
    ) -> BatchReport
    where
        F: FnMut(&ItemOutcome),
    {
        info!("Processing batch of {} documents", documents.len());
        ledger.reset();
        let mut names = HashSet::new();
        let mut report = BatchReport {
            total: documents.len(),
            ..Default::default()
        };

        for document in documents {
            let item = self.process_document(document, ledger, &mut names).await;
            if item.is_success() {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
            on_item(&item);
            report.items.push(item);
        }

        report.usage = ledger.snapshot();
        info!(
            "Batch done: {} succeeded, {} failed, {} tokens",
            report.succeeded, report.failed, report.usage.total_tokens
        );
        report
    }

    /// Run one document and fold its result into an outcome.
    ///
    /// `names` holds the output names already used in this run; the
    /// document's name is added to it.
    pub async fn process_document(
        &self,
        document: &SourceDocument,
        ledger: &mut UsageLedger,
        names: &mut HashSet<String>,
    ) -> ItemOutcome {
        let name = document.name();
        match self.run_pipeline(document, ledger, names).await {
            Ok((invoice_number, output, warnings)) => {
                info!(document = %name, "Delivered invoice {} to {}", invoice_number, output);
                ItemOutcome {
                    name: name.to_string(),
                    outcome: Outcome::Success {
                        invoice_number,
                        output,
                        warnings,
                    },
                }
            }
            Err(err) => {
                warn!(document = %name, kind = %err.kind(), "Document failed: {}", err);
                ItemOutcome::failure(name, &err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        document: &SourceDocument,
        ledger: &mut UsageLedger,
        names: &mut HashSet<String>,
    ) -> Result<(String, String, Vec<Diagnostic>), DocumentError> {
        let name = document.name();
        let bytes = document.read().await?;

        let text = self
            .bounded(
                "text extraction",
                self.call_timeout,
                self.text_extractor.extract_text(name, bytes),
            )
            .await?;

        // Calls that finished are charged even when extraction fails or times out
        let usage = UsageLog::new();
        let extracted = self
            .bounded(
                "field extraction",
                self.extraction_timeout,
                self.field_extractor.extract_fields(&text, &usage),
            )
            .await;
        ledger.record_all(&usage.take());
        let raw = extracted?;

        let fields = self.normalizer.normalize(&raw)?;
        let validated = Validator::new(&self.directory).validate(fields);
        let (invoice, xml) = self.compiler.compile_to_xml(validated)?;

        let file_name = claim_file_name(&invoice.fields.invoice_number, names);
        let output = match tokio::time::timeout(
            self.call_timeout,
            self.sink.deliver(&file_name, xml.as_bytes()),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(DispatchError::Timeout(self.call_timeout.as_secs()).into()),
        };

        let warnings = invoice.warnings;
        Ok((invoice.fields.invoice_number, output, warnings))
    }

    async fn bounded<T>(
        &self,
        service: &str,
        limit: Duration,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::timeout(service, limit.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::PriceTable;
    use crate::models::config::DefaultCustomer;
    use crate::models::raw::{Field, RawExtraction, RawLineItem, RawParty, TokenUsage};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    struct EchoText;

    #[async_trait]
    impl TextExtractor for EchoText {
        async fn extract_text(&self, _name: &str, bytes: Vec<u8>) -> Result<String, ServiceError> {
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }

    /// Returns a field set keyed by the document text.
    struct ScriptedFields;

    #[async_trait]
    impl FieldExtractor for ScriptedFields {
        async fn extract_fields(
            &self,
            text: &str,
            log: &UsageLog,
        ) -> Result<RawExtraction, ServiceError> {
            let usage = vec![TokenUsage::new("gpt-4o", 1000, 100)];
            log.record(usage[0].clone());
            match text {
                "fail" => Err(ServiceError::new("field extraction", "boom")),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(RawExtraction::default())
                }
                number => Ok(RawExtraction {
                    invoice_number: Field::from(number),
                    issue_date: Field::from("2024-01-15"),
                    currency: Field::from("DKK"),
                    supplier: RawParty::named("LEGO System A/S"),
                    line_items: vec![RawLineItem {
                        description: Field::from("Klodser"),
                        quantity: Field::from("2"),
                        unit_price: Field::from("100,00"),
                        ..Default::default()
                    }],
                    total_amount: Field::from("250,00"),
                    usage,
                    ..Default::default()
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeliverySink for std::sync::Arc<RecordingSink> {
        async fn deliver(&self, name: &str, _bytes: &[u8]) -> Result<String, DispatchError> {
            self.delivered
                .lock()
                .map_err(|e| DispatchError::Http(e.to_string()))?
                .push(name.to_string());
            Ok(format!("memory:{}", name))
        }
    }

    fn orchestrator(sink: Box<dyn DeliverySink>) -> BatchOrchestrator {
        let normalizer = FieldNormalizer::new(
            DefaultCustomer::default(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        );
        BatchOrchestrator::new(
            CompanyDirectory::builtin(),
            normalizer,
            Box::new(EchoText),
            Box::new(ScriptedFields),
            sink,
        )
        .with_call_timeout(Duration::from_millis(200))
        .with_extraction_timeout(Duration::from_millis(200))
    }

    fn doc(text: &str) -> SourceDocument {
        SourceDocument::from_bytes(format!("{}.pdf", text), text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let sink = std::sync::Arc::new(RecordingSink::default());
        let orch = orchestrator(Box::new(sink.clone()));
        let mut ledger = UsageLedger::new(PriceTable::default());
        let mut seen = Vec::new();

        let report = orch
            .run_with(&[doc("1001"), doc("fail"), doc("1002")], &mut ledger, |item| {
                seen.push(item.name.clone())
            })
            .await;

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(seen, vec!["1001.pdf", "fail.pdf", "1002.pdf"]);
        assert!(matches!(
            &report.items[1].outcome,
            Outcome::Failure { kind: FailureKind::ExternalServiceError, .. }
        ));
        // Usage of the failed call is still charged
        assert_eq!(report.usage.calls, 3);
        assert_eq!(
            *sink.delivered.lock().unwrap(),
            vec!["invoice_1001.xml".to_string(), "invoice_1002.xml".to_string()]
        );
    }

    #[tokio::test]
    async fn test_timeout_is_recoverable() {
        let sink = std::sync::Arc::new(RecordingSink::default());
        let orch = orchestrator(Box::new(sink));
        let mut ledger = UsageLedger::new(PriceTable::default());

        let report = orch.run(&[doc("slow"), doc("1003")], &mut ledger).await;
        match &report.items[0].outcome {
            Outcome::Failure { kind, summary, .. } => {
                assert_eq!(*kind, FailureKind::ExternalServiceError);
                assert!(summary.contains("timed out"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert!(report.items[1].is_success());
        // The slow document's completed call is charged too
        assert_eq!(report.usage.calls, 2);
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let sink = std::sync::Arc::new(RecordingSink::default());
        let orch = orchestrator(Box::new(sink));
        let mut ledger = UsageLedger::new(PriceTable::default());
        let report = orch.run(&[doc("1004")], &mut ledger).await;

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["items"][0]["status"], "success");
        assert_eq!(json["items"][0]["name"], "1004.pdf");
        assert_eq!(json["items"][0]["output"], "memory:invoice_1004.xml");
    }
}
