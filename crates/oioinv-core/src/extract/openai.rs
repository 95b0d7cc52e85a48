//! Chat-completions client that extracts invoice fields from document text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::FieldExtractor;
use super::response::{extraction_from_reply, merge_extractions, parse_reply};
use crate::error::ServiceError;
use crate::ledger::UsageLog;
use crate::models::config::ExtractionConfig;
use crate::models::raw::{RawExtraction, TokenUsage};

const SERVICE: &str = "field extraction";

/// Rough characters per token used for chunk sizing.
const CHARS_PER_TOKEN: usize = 4;

const SYSTEM_PROMPT: &str =
    "You are an expert in extracting structured data from Danish invoice text. Always return valid JSON.";

const FIELDS_PROMPT: &str = r#"Extract the invoice information from this text. Return ONLY a JSON object with these keys when present:
- invoice_number: the invoice number only ("Fakturanummer", "FAKTURA NUMMER")
- invoice_date, due_date: YYYY-MM-DD
- currency: ISO code such as DKK or EUR
- customer_reference: "Deres ref."
- order_number: the case/order number ("SAGS. NR."), blank if unclear
- customer_name, customer_cvr, customer_vat, customer_street, customer_city, customer_postal_code, customer_country, customer_contact_name, customer_contact_phone, customer_contact_email (the customer is usually at the TOP)
- supplier_name, supplier_cvr, supplier_vat, supplier_street, supplier_city, supplier_postal_code, supplier_country (the supplier is usually at the BOTTOM or in the header)
- total_amount: total including VAT
- payment_terms
- line_items: array of {item_number, description, quantity (number only), unit (letters only, "m5" means unit "m" and quantity 5), unit_price, discount (percent), amount (line total after discount)}
CVR numbers are exactly 8 digits. VAT (SE) numbers are "DK" followed by 8 digits.
Only include values that appear in the text. Do not guess.

Text:
"#;

const PAYMENT_PROMPT: &str = r#"Extract payment information from this Danish invoice text. Return ONLY a JSON object with these keys when present:
- fik_code: the complete FIK line, formatted +71<15 digits+8 digits< (types 71, 73, 75)
- reg_number: 4-digit bank registration number
- account_number: bank account number
- iban, bic
- payment_terms: e.g. "Netto 30 dage"
- due_date: YYYY-MM-DD
Do not guess values that are not in the text.

Text:
"#;

const CHARGES_PROMPT: &str = r#"Extract additional charges that are NOT regular line items from this Danish invoice text. Return ONLY a JSON object with these keys when present:
- environmental_fee, environmental_fee_description ("Miljøafgift", "Miljøgebyr")
- shipping_fee, shipping_fee_description ("Fragt", "Transport")
- other_charges: array of {description, amount}
Amounts exclude VAT. Return {} when there are none.

Text:
"#;

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Split text on blank lines into chunks of roughly `chunk_tokens` tokens.
///
/// Each new chunk starts with trailing paragraphs of the previous one, at
/// least `overlap_tokens` worth when available.
pub fn split_into_chunks(text: &str, chunk_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    let chunk_chars = chunk_tokens * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    for paragraph in paragraphs {
        if current_len + paragraph.len() > chunk_chars && !current.is_empty() {
            chunks.push(current.join("\n\n"));

            let mut overlap = Vec::new();
            let mut overlap_len = 0;
            for p in current.iter().rev() {
                overlap_len += p.len();
                overlap.push(*p);
                if overlap_len > overlap_chars {
                    break;
                }
            }
            overlap.reverse();
            current = overlap;
            current_len = overlap_len;
        }
        current.push(paragraph);
        current_len += paragraph.len();
    }

    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }
    chunks
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// OpenAI-compatible field extractor.
///
/// Does not derive `Debug`: it holds the API key.
pub struct OpenAiFieldExtractor {
    http: reqwest::Client,
    api_key: Option<String>,
    config: ExtractionConfig,
}

impl OpenAiFieldExtractor {
    /// Build a client; the key is read from the configured environment variable.
    pub fn new(config: ExtractionConfig, timeout: Duration) -> Result<Self, ServiceError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::with_api_key(config, api_key, timeout)
    }

    pub fn with_api_key(
        config: ExtractionConfig,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::new(SERVICE, e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// One chat completion with retries on transport errors, 429 and 5xx.
    ///
    /// Any answered request is billed, so its usage goes to `log` before
    /// the reply is inspected.
    async fn complete(&self, prompt: &str, log: &UsageLog) -> Result<(String, TokenUsage), ServiceError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ServiceError::new(
                SERVICE,
                format!("no API key in environment variable {}", self.config.api_key_env),
            )
        })?;
        let url = format!("{}/chat/completions", self.config.api_base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let max_attempts = self.config.max_retries + 1;
        let mut last_error = ServiceError::new(SERVICE, "no attempt made");
        let mut next_delay = Duration::ZERO;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                debug!(attempt, "retrying extraction request after {:?}", next_delay);
                tokio::time::sleep(next_delay).await;
            }
            next_delay = Duration::from_secs(1 << attempt.min(4));

            let resp = match self.http.post(&url).bearer_auth(api_key).json(&body).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "extraction request failed");
                    last_error = ServiceError {
                        timed_out: e.is_timeout(),
                        ..ServiceError::new(SERVICE, e.to_string())
                    };
                    continue;
                }
            };

            let status = resp.status().as_u16();
            if status == 429 {
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(20);
                warn!(attempt, retry_after, "extraction service rate limited");
                next_delay = Duration::from_secs(retry_after).max(next_delay);
                last_error = ServiceError::new(SERVICE, "rate limited");
                continue;
            }
            if status >= 500 {
                let text = resp.text().await.unwrap_or_default();
                warn!(attempt, status, body = %text, "extraction service error");
                last_error = ServiceError::new(SERVICE, format!("HTTP {}: {}", status, text));
                continue;
            }
            if status != 200 {
                let text = resp.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorResponse>(&text)
                    .ok()
                    .and_then(|r| r.error)
                    .map(|e| e.message)
                    .unwrap_or(text);
                return Err(ServiceError::new(SERVICE, format!("HTTP {}: {}", status, message)));
            }

            let parsed: ChatResponse = resp
                .json()
                .await
                .map_err(|e| ServiceError::new(SERVICE, format!("unreadable response: {}", e)))?;
            let usage = parsed
                .usage
                .map(|u| TokenUsage::new(&self.config.model, u.prompt_tokens, u.completion_tokens))
                .unwrap_or_else(|| TokenUsage::new(&self.config.model, 0, 0));
            log.record(usage.clone());
            let content = parsed
                .choices
                .into_iter()
                .filter_map(|c| c.message.content)
                .collect::<Vec<_>>()
                .join("");
            if content.trim().is_empty() {
                warn!(attempt, "extraction service returned an empty reply");
                return Err(ServiceError::new(SERVICE, "empty reply"));
            }
            return Ok((content, usage));
        }

        Err(last_error)
    }

    /// Run one prompt and map its reply. A malformed reply fails the call;
    /// its tokens are already in `log`.
    async fn extract_with(
        &self,
        instructions: &str,
        text: &str,
        log: &UsageLog,
        spent: &mut Vec<TokenUsage>,
    ) -> Result<RawExtraction, ServiceError> {
        let prompt = format!("{}{}", instructions, text);
        let (content, call_usage) = self.complete(&prompt, log).await?;
        spent.push(call_usage);
        let map = parse_reply(&content).map_err(|m| ServiceError::new(SERVICE, m))?;
        Ok(extraction_from_reply(&map))
    }
}

#[async_trait]
impl FieldExtractor for OpenAiFieldExtractor {
    async fn extract_fields(
        &self,
        text: &str,
        log: &UsageLog,
    ) -> Result<RawExtraction, ServiceError> {
        let chunks = split_into_chunks(text, self.config.chunk_size, self.config.chunk_overlap);
        if chunks.is_empty() {
            return Err(ServiceError::new(SERVICE, "document text is empty"));
        }
        info!("Extracting fields from {} chunk(s)", chunks.len());

        let mut spent = Vec::new();
        let mut merged = RawExtraction::default();
        for (i, chunk) in chunks.iter().enumerate() {
            debug!("Processing chunk {}/{}", i + 1, chunks.len());
            let part = self.extract_with(FIELDS_PROMPT, chunk, log, &mut spent).await?;
            merge_extractions(&mut merged, part);
        }

        // Payment and charges sit near the end; ask once over the whole text
        let limit = self.config.chunk_size * CHARS_PER_TOKEN;
        let whole = truncate_chars(text, limit);

        let payment = self.extract_with(PAYMENT_PROMPT, whole, log, &mut spent).await?;
        merge_extractions(&mut merged, payment);

        let charges = self.extract_with(CHARGES_PROMPT, whole, log, &mut spent).await?;
        merge_extractions(&mut merged, charges);

        merged.usage = spent;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_short_text_single_chunk() {
        let chunks = split_into_chunks("Faktura 1\n\nLinje 1\n\n\n\nTotal", 3000, 500);
        assert_eq!(chunks, vec!["Faktura 1\n\nLinje 1\n\nTotal".to_string()]);
    }

    #[test]
    fn test_split_with_overlap() {
        let paragraph = "x".repeat(30);
        let text = vec![paragraph.as_str(); 5].join("\n\n");
        // 20 tokens = 80 chars per chunk, 5 tokens = 20 chars overlap
        let chunks = split_into_chunks(&text, 20, 5);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().skip(1).all(|c| c.starts_with(&paragraph)));
        assert!(chunks.iter().all(|c| c.len() <= 30 * 3 + 4));
    }

    #[test]
    fn test_split_empty() {
        assert!(split_into_chunks(" \n\n \n", 10, 2).is_empty());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("æøå", 2), "æø");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_missing_api_key_is_service_error() {
        let extractor =
            OpenAiFieldExtractor::with_api_key(ExtractionConfig::default(), None, Duration::from_secs(1))
                .unwrap();
        assert!(!extractor.has_api_key());
        let log = UsageLog::new();
        let err = extractor.extract_fields("Faktura 1", &log).await.unwrap_err();
        assert_eq!(err.service, SERVICE);
        assert!(err.message.contains("OPENAI_API_KEY"));
        assert!(log.is_empty());
    }
}
