//! Configuration structures for the invoice pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ledger::PriceTable;
use crate::validate::identifiers::is_valid_cvr_format;

/// Main configuration for the oioinv pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Pipeline behaviour.
    pub pipeline: PipelineConfig,

    /// Customer substituted when the extracted one is unusable.
    pub default_customer: DefaultCustomer,

    /// AI field extraction service.
    pub extraction: ExtractionConfig,

    /// Token prices used by the usage ledger.
    pub pricing: PriceTable,

    /// Where rendered invoices go.
    pub output: OutputConfig,

    /// Mail sink settings.
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Always replace the extracted customer with the default customer.
    pub use_default_customer_only: bool,

    /// Timeout for each external call, in seconds.
    pub call_timeout_secs: u64,

    /// Timeout for field extraction of one document, in seconds. Covers
    /// every chunk and follow-up call made for that document.
    pub extraction_timeout_secs: u64,

    /// Company directory JSON file. The built-in directory is used when unset.
    pub directory_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            use_default_customer_only: false,
            call_timeout_secs: 120,
            extraction_timeout_secs: 600,
            directory_path: None,
        }
    }
}

/// The fixed identity record used as customer fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultCustomer {
    pub name: String,
    pub cvr: String,
    pub vat_number: Option<String>,
    pub gln: Option<String>,
    pub street: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
}

impl Default for DefaultCustomer {
    fn default() -> Self {
        Self {
            name: "Nordsjælland Teknik ApS".to_string(),
            cvr: "29847156".to_string(),
            vat_number: Some("DK29847156".to_string()),
            gln: None,
            street: "Hovedgade 45B".to_string(),
            city: "Hillerød".to_string(),
            postal_code: "3400".to_string(),
            country: "DK".to_string(),
            contact_name: Some("Lars Nielsen".to_string()),
            contact_phone: Some("48262890".to_string()),
            contact_email: None,
        }
    }
}

impl DefaultCustomer {
    /// Reject a record that cannot stand in as an invoice customer.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::DefaultCustomer("name is empty".to_string()));
        }
        if !is_valid_cvr_format(&self.cvr) {
            return Err(Error::DefaultCustomer(format!(
                "CVR '{}' is not 8 digits",
                self.cvr
            )));
        }
        if self.country.len() != 2 {
            return Err(Error::DefaultCustomer(format!(
                "country '{}' is not a 2-letter code",
                self.country
            )));
        }
        Ok(())
    }
}

/// AI extraction service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base_url: String,

    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    pub temperature: f32,

    pub max_tokens: u32,

    /// Approximate chunk size in tokens (4 characters per token).
    pub chunk_size: usize,

    /// Overlap between consecutive chunks, in tokens.
    pub chunk_overlap: usize,

    pub max_retries: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.1,
            max_tokens: 1000,
            chunk_size: 3000,
            chunk_overlap: 500,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    File,
    Mail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sink: SinkKind,

    /// Output directory for the file sink.
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::File,
            directory: PathBuf::from("output"),
        }
    }
}

/// Microsoft Graph mail sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub graph_base_url: String,

    /// Mailbox the invoice is sent from.
    pub sender: Option<String>,

    pub recipient: Option<String>,

    /// Environment variable holding a Graph access token.
    pub token_env: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            graph_base_url: "https://graph.microsoft.com/v1.0".to_string(),
            sender: None,
            recipient: None,
            token_env: "GRAPH_ACCESS_TOKEN".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
