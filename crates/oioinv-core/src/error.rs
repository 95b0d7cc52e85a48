//! Error types for the oioinv-core library.
//!
//! Two layers exist: [`Error`] covers setup failures that stop a whole run
//! (configuration, directory loading), while [`DocumentError`] is the
//! per-document taxonomy that the batch orchestrator catches and reports.

use serde::Serialize;
use thiserror::Error;

use crate::validate::ValidationReport;

/// Main error type for the oioinv library.
#[derive(Error, Debug)]
pub enum Error {
    /// The company directory could not be loaded.
    #[error("company directory error: {0}")]
    Directory(String),

    /// The default customer record is unusable.
    #[error("default customer error: {0}")]
    DefaultCustomer(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The PDF carries no text layer (scanned image).
    #[error("PDF has no extractable text")]
    NoText,
}

/// An external call (text extraction, AI extraction, source read) failed.
#[derive(Error, Debug, Clone)]
#[error("{service} failed: {message}")]
pub struct ServiceError {
    pub service: String,
    pub message: String,
    pub timed_out: bool,
}

impl ServiceError {
    pub fn new(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(service: impl Into<String>, after_secs: u64) -> Self {
        Self {
            service: service.into(),
            message: format!("timed out after {}s", after_secs),
            timed_out: true,
        }
    }
}

/// Errors raised by a delivery sink.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Local write failed.
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Remote send failed.
    #[error("send failed: {0}")]
    Http(String),

    /// The sink is not configured for sending.
    #[error("sink not configured: {0}")]
    NotConfigured(String),

    /// Delivery did not finish within the call timeout.
    #[error("delivery timed out after {0}s")]
    Timeout(u64),
}

/// Failure of a single document anywhere in the pipeline.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// Required fields are missing after normalization.
    #[error("extraction incomplete: missing {}", missing.join(", "))]
    ExtractionIncomplete { missing: Vec<String> },

    /// Validation produced at least one error diagnostic.
    #[error("validation failed: {}", .0.error_summary())]
    ValidationFailed(ValidationReport),

    /// An invariant was violated after validation passed.
    #[error("compilation error: {0}")]
    Compilation(String),

    /// The rendered document could not be delivered.
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// An external service call failed or timed out.
    #[error("external service error: {0}")]
    ExternalService(#[from] ServiceError),
}

/// Stable label for a [`DocumentError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    ExtractionIncomplete,
    ValidationFailed,
    CompilationError,
    DispatchError,
    ExternalServiceError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ExtractionIncomplete => "ExtractionIncomplete",
            FailureKind::ValidationFailed => "ValidationFailed",
            FailureKind::CompilationError => "CompilationError",
            FailureKind::DispatchError => "DispatchError",
            FailureKind::ExternalServiceError => "ExternalServiceError",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DocumentError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DocumentError::ExtractionIncomplete { .. } => FailureKind::ExtractionIncomplete,
            DocumentError::ValidationFailed(_) => FailureKind::ValidationFailed,
            DocumentError::Compilation(_) => FailureKind::CompilationError,
            DocumentError::Dispatch(_) => FailureKind::DispatchError,
            DocumentError::ExternalService(_) => FailureKind::ExternalServiceError,
        }
    }
}

/// Result type for the oioinv library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{Diagnostic, ValidationReport};

    #[test]
    fn test_document_error_kind() {
        let err = DocumentError::ExtractionIncomplete {
            missing: vec!["currency".to_string()],
        };
        assert_eq!(err.kind(), FailureKind::ExtractionIncomplete);
        assert_eq!(err.to_string(), "extraction incomplete: missing currency");

        let err: DocumentError = ServiceError::timeout("field extraction", 30).into();
        assert_eq!(err.kind(), FailureKind::ExternalServiceError);
    }

    #[test]
    fn test_validation_failed_message() {
        let mut report = ValidationReport::default();
        report.push(Diagnostic::error("total", "totals mismatch"));
        let err = DocumentError::ValidationFailed(report);
        assert_eq!(err.to_string(), "validation failed: total: totals mismatch");
    }
}
