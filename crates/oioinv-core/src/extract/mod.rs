//! Adapters for the two external extraction steps.
//!
//! Both steps sit behind async traits so the batch orchestrator can run
//! against stubs in tests and against real services in the CLI.

mod openai;
mod pdf;
pub mod response;

pub use openai::{OpenAiFieldExtractor, split_into_chunks};
pub use pdf::PdfTextExtractor;

use async_trait::async_trait;

use crate::error::ServiceError;
use crate::ledger::UsageLog;
use crate::models::raw::RawExtraction;

/// Turns document bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, name: &str, bytes: Vec<u8>) -> Result<String, ServiceError>;
}

/// Turns plain text into a best-effort field set.
///
/// Implementations report absent values as [`crate::models::raw::Field::Absent`].
/// Every billed call is recorded in `usage` as soon as it returns, so the
/// caller can charge it even if the extraction later fails or is cancelled.
/// A successful result also carries the same calls in
/// [`RawExtraction::usage`].
#[async_trait]
pub trait FieldExtractor: Send + Sync {
    async fn extract_fields(
        &self,
        text: &str,
        usage: &UsageLog,
    ) -> Result<RawExtraction, ServiceError>;
}

/// Field extractor that replays a stored extraction, ignoring the text.
#[derive(Debug, Clone)]
pub struct StoredFieldExtractor {
    extraction: RawExtraction,
}

impl StoredFieldExtractor {
    pub fn new(extraction: RawExtraction) -> Self {
        Self { extraction }
    }
}

#[async_trait]
impl FieldExtractor for StoredFieldExtractor {
    async fn extract_fields(
        &self,
        _text: &str,
        usage: &UsageLog,
    ) -> Result<RawExtraction, ServiceError> {
        for call in &self.extraction.usage {
            usage.record(call.clone());
        }
        Ok(self.extraction.clone())
    }
}
