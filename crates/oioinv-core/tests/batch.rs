//! Batch orchestration against stub collaborators.

use async_trait::async_trait;
use chrono::NaiveDate;
use oioinv_core::batch::{DeliverySink, FileSink};
use oioinv_core::extract::{FieldExtractor, TextExtractor};
use oioinv_core::models::config::DefaultCustomer;
use oioinv_core::models::raw::{RawLineItem, RawParty};
use oioinv_core::{
    BatchOrchestrator, CompanyDirectory, DispatchError, FailureKind, Field, FieldNormalizer,
    Outcome, PriceTable, RawExtraction, ServiceError, SourceDocument, TokenUsage, UsageLedger,
    UsageLog,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tempfile::TempDir;

struct Utf8Text;

#[async_trait]
impl TextExtractor for Utf8Text {
    async fn extract_text(&self, _name: &str, bytes: Vec<u8>) -> Result<String, ServiceError> {
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Deterministic extractor: the document text selects the behavior.
struct StubFields;

fn termostat(quantity: &str, unit_price: &str) -> RawLineItem {
    RawLineItem {
        description: Field::from("Termostat"),
        quantity: Field::from(quantity),
        unit: Field::from("stk"),
        unit_price: Field::from(unit_price),
        ..Default::default()
    }
}

#[async_trait]
impl FieldExtractor for StubFields {
    async fn extract_fields(
        &self,
        text: &str,
        log: &UsageLog,
    ) -> Result<RawExtraction, ServiceError> {
        let first_call = TokenUsage::new("gpt-4o", 1200, 300);
        let raw = match text {
            "service-down" => {
                log.record(TokenUsage::new("gpt-4o", 400, 0));
                return Err(ServiceError::new("field extraction", "HTTP 503"));
            }
            "no-currency" => RawExtraction {
                invoice_number: Field::from("9"),
                line_items: vec![RawLineItem {
                    description: Field::from("Skruer"),
                    quantity: Field::from("1"),
                    unit_price: Field::from("10"),
                    ..Default::default()
                }],
                usage: vec![first_call],
                ..Default::default()
            },
            "huge" => RawExtraction {
                invoice_number: Field::from("7001"),
                issue_date: Field::from("15-01-2024"),
                currency: Field::from("DKK"),
                supplier: RawParty::named("Danfoss A/S"),
                line_items: vec![termostat("9999999999999999999999999999", "99999")],
                usage: vec![first_call],
                ..Default::default()
            },
            number => RawExtraction {
                invoice_number: Field::from(number),
                issue_date: Field::from("15-01-2024"),
                currency: Field::from("DKK"),
                supplier: RawParty::named("Danfoss A/S"),
                line_items: vec![termostat("4", "1.250,00")],
                total_amount: Field::from("6.250,00"),
                usage: vec![first_call, TokenUsage::new("gpt-4o", 800, 150)],
                ..Default::default()
            },
        };
        for call in &raw.usage {
            log.record(call.clone());
        }
        Ok(raw)
    }
}

/// Finishes two calls, then stalls on the third.
struct StallingFields;

#[async_trait]
impl FieldExtractor for StallingFields {
    async fn extract_fields(
        &self,
        _text: &str,
        log: &UsageLog,
    ) -> Result<RawExtraction, ServiceError> {
        log.record(TokenUsage::new("gpt-4o", 1000, 100));
        log.record(TokenUsage::new("gpt-4o", 1000, 100));
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(RawExtraction::default())
    }
}

struct BrokenSink;

#[async_trait]
impl DeliverySink for BrokenSink {
    async fn deliver(&self, _name: &str, _bytes: &[u8]) -> Result<String, DispatchError> {
        Err(DispatchError::Http("HTTP 500: mailbox unavailable".to_string()))
    }
}

fn orchestrator(sink: Box<dyn DeliverySink>) -> BatchOrchestrator {
    let normalizer = FieldNormalizer::new(
        DefaultCustomer::default(),
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
    );
    BatchOrchestrator::new(
        CompanyDirectory::builtin(),
        normalizer,
        Box::new(Utf8Text),
        Box::new(StubFields),
        sink,
    )
    .with_call_timeout(Duration::from_secs(5))
}

fn docs(texts: &[&str]) -> Vec<SourceDocument> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| SourceDocument::from_bytes(format!("doc{}.pdf", i + 1), t.as_bytes().to_vec()))
        .collect()
}

#[tokio::test]
async fn test_scenario_c_one_failing_document() {
    let out = TempDir::new().unwrap();
    let orch = orchestrator(Box::new(FileSink::new(out.path())));
    let mut ledger = UsageLedger::new(PriceTable::default());

    let report = orch
        .run(&docs(&["5001", "service-down", "5002"]), &mut ledger)
        .await;

    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    match &report.items[1].outcome {
        Outcome::Failure { kind, .. } => assert_eq!(*kind, FailureKind::ExternalServiceError),
        other => panic!("expected failure, got {:?}", other),
    }
    // Two calls each for documents 1 and 3, plus the partial charge of document 2
    assert_eq!(report.usage.calls, 5);
    assert_eq!(report.usage.prompt_tokens, 2 * (1200 + 800) + 400);
    assert!(out.path().join("invoice_5001.xml").exists());
    assert!(out.path().join("invoice_5002.xml").exists());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let out = TempDir::new().unwrap();
    let inputs = docs(&["5001", "no-currency", "service-down"]);

    let orch = orchestrator(Box::new(FileSink::new(out.path())));
    let mut first_ledger = UsageLedger::new(PriceTable::default());
    let first = orch.run(&inputs, &mut first_ledger).await;
    let first_xml = std::fs::read(out.path().join("invoice_5001.xml")).unwrap();

    let mut second_ledger = UsageLedger::new(PriceTable::default());
    let second = orch.run(&inputs, &mut second_ledger).await;
    let second_xml = std::fs::read(out.path().join("invoice_5001.xml")).unwrap();

    assert_eq!(first, second);
    assert_eq!(first_xml, second_xml);
}

#[tokio::test]
async fn test_incomplete_extraction_is_reported() {
    let out = TempDir::new().unwrap();
    let orch = orchestrator(Box::new(FileSink::new(out.path())));
    let mut ledger = UsageLedger::new(PriceTable::default());

    let report = orch.run(&docs(&["no-currency"]), &mut ledger).await;
    match &report.items[0].outcome {
        Outcome::Failure { kind, summary, .. } => {
            assert_eq!(*kind, FailureKind::ExtractionIncomplete);
            assert!(summary.contains("currency"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    // Tokens of the successful call are charged even though the document failed
    assert_eq!(report.usage.calls, 1);
}

#[tokio::test]
async fn test_dispatch_failure_marks_document_failed() {
    let orch = orchestrator(Box::new(BrokenSink));
    let mut ledger = UsageLedger::new(PriceTable::default());

    let report = orch.run(&docs(&["5003"]), &mut ledger).await;
    assert_eq!(report.failed, 1);
    match &report.items[0].outcome {
        Outcome::Failure { kind, summary, .. } => {
            assert_eq!(*kind, FailureKind::DispatchError);
            assert!(summary.contains("mailbox unavailable"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_success_carries_warnings() {
    let out = TempDir::new().unwrap();
    let orch = orchestrator(Box::new(FileSink::new(out.path())));
    let mut ledger = UsageLedger::new(PriceTable::default());

    let report = orch.run(&docs(&["5004"]), &mut ledger).await;
    match &report.items[0].outcome {
        Outcome::Success {
            invoice_number,
            warnings,
            ..
        } => {
            assert_eq!(invoice_number, "5004");
            // Customer was taken from the default record
            assert!(warnings.iter().any(|w| w.field.starts_with("customer")));
        }
        other => panic!("expected success, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rerun_with_same_ledger_counts_one_run() {
    let out = TempDir::new().unwrap();
    let orch = orchestrator(Box::new(FileSink::new(out.path())));
    let mut ledger = UsageLedger::new(PriceTable::default());
    let inputs = docs(&["5001", "service-down"]);

    let first = orch.run(&inputs, &mut ledger).await;
    let second = orch.run(&inputs, &mut ledger).await;

    assert_eq!(first.usage.calls, 3);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_extraction_timeout_charges_finished_calls() {
    let out = TempDir::new().unwrap();
    let normalizer = FieldNormalizer::new(
        DefaultCustomer::default(),
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
    );
    let orch = BatchOrchestrator::new(
        CompanyDirectory::builtin(),
        normalizer,
        Box::new(Utf8Text),
        Box::new(StallingFields),
        Box::new(FileSink::new(out.path())),
    )
    .with_call_timeout(Duration::from_secs(5))
    .with_extraction_timeout(Duration::from_millis(200));
    let mut ledger = UsageLedger::new(PriceTable::default());

    let report = orch.run(&docs(&["5001"]), &mut ledger).await;

    assert_eq!(report.failed, 1);
    match &report.items[0].outcome {
        Outcome::Failure { kind, summary, .. } => {
            assert_eq!(*kind, FailureKind::ExternalServiceError);
            assert!(summary.contains("timed out"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(report.usage.calls, 2);
    assert_eq!(report.usage.total_tokens, 2200);
}

#[tokio::test]
async fn test_duplicate_invoice_numbers_get_distinct_files() {
    let out = TempDir::new().unwrap();
    let orch = orchestrator(Box::new(FileSink::new(out.path())));
    let mut ledger = UsageLedger::new(PriceTable::default());

    let report = orch
        .run(&docs(&["5001", "5001", "12/34", "12_34"]), &mut ledger)
        .await;
    assert_eq!(report.succeeded, 4);

    let outputs: Vec<String> = report
        .items
        .iter()
        .map(|item| match &item.outcome {
            Outcome::Success { output, .. } => output.clone(),
            other => panic!("expected success, got {:?}", other),
        })
        .collect();
    for (output, name) in outputs.iter().zip([
        "invoice_5001.xml",
        "invoice_5001_2.xml",
        "invoice_12_34.xml",
        "invoice_12_34_2.xml",
    ]) {
        assert!(output.ends_with(name), "{} does not end with {}", output, name);
        assert!(out.path().join(name).exists());
    }
}

#[tokio::test]
async fn test_out_of_range_amount_fails_only_its_document() {
    let out = TempDir::new().unwrap();
    let orch = orchestrator(Box::new(FileSink::new(out.path())));
    let mut ledger = UsageLedger::new(PriceTable::default());

    let report = orch.run(&docs(&["huge", "5001"]), &mut ledger).await;

    assert_eq!(report.failed, 1);
    match &report.items[0].outcome {
        Outcome::Failure { kind, summary, .. } => {
            assert_eq!(*kind, FailureKind::ValidationFailed);
            assert!(summary.contains("amount out of range"));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(report.items[1].is_success());
    assert!(out.path().join("invoice_5001.xml").exists());
}
