//! PDF text extraction using lopdf and pdf-extract.

use async_trait::async_trait;
use lopdf::Document;
use tracing::debug;

use super::TextExtractor;
use crate::error::{PdfError, ServiceError};

const SERVICE: &str = "pdf text extraction";

/// Minimum characters for a PDF to count as having a text layer.
const MIN_TEXT_CHARS: usize = 20;

/// Extracts the text layer of a PDF. Scanned PDFs without text are rejected.
#[derive(Debug, Clone, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Load, decrypt when protected by an empty password, and extract text.
    pub fn extract_blocking(data: &[u8]) -> Result<String, PdfError> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let raw_data = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            // pdf-extract needs the decrypted bytes
            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        let page_count = doc.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        let text = pdf_extract::extract_text_from_mem(&raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))?;
        let chars = text.chars().filter(|c| !c.is_whitespace()).count();
        debug!("PDF with {} pages yielded {} text characters", page_count, chars);
        if chars < MIN_TEXT_CHARS {
            return Err(PdfError::NoText);
        }
        Ok(text)
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract_text(&self, name: &str, bytes: Vec<u8>) -> Result<String, ServiceError> {
        let result = tokio::task::spawn_blocking(move || Self::extract_blocking(&bytes))
            .await
            .map_err(|e| ServiceError::new(SERVICE, format!("worker failed: {}", e)))?;
        result.map_err(|e| ServiceError::new(SERVICE, format!("{}: {}", name, e)))
    }
}
