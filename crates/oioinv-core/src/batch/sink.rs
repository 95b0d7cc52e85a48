//! Delivery sinks for rendered invoices.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::models::config::MailConfig;

/// Receives a rendered document. Returns an identifier of where it went.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<String, DispatchError>;
}

/// File name for an invoice number, safe on every filesystem.
pub fn output_file_name(invoice_number: &str) -> String {
    let safe: String = invoice_number
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let safe = if safe.is_empty() { "unnumbered".to_string() } else { safe };
    format!("invoice_{}.xml", safe)
}

/// [`output_file_name`], suffixed `_2`, `_3`, ... when `taken` already holds
/// the name. The chosen name is added to `taken`.
pub fn claim_file_name(invoice_number: &str, taken: &mut HashSet<String>) -> String {
    let base = output_file_name(invoice_number);
    if taken.insert(base.clone()) {
        return base;
    }
    let stem = base.trim_end_matches(".xml");
    let mut n = 2;
    loop {
        let candidate = format!("{}_{}.xml", stem, n);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Writes documents into a directory, overwriting same-named files.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl DeliverySink for FileSink {
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<String, DispatchError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(path.display().to_string())
    }
}

/// Sends each document as an e-mail attachment through Microsoft Graph.
///
/// Missing sender, recipient or token make every delivery fail with
/// [`DispatchError::NotConfigured`].
pub struct GraphMailSink {
    http: reqwest::Client,
    base_url: String,
    sender: Option<String>,
    recipient: Option<String>,
    token: Option<String>,
}

impl GraphMailSink {
    pub fn from_config(config: &MailConfig, timeout: Duration) -> Result<Self, DispatchError> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::new(config, token, timeout)
    }

    pub fn new(
        config: &MailConfig,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.graph_base_url.trim_end_matches('/').to_string(),
            sender: config.sender.clone(),
            recipient: config.recipient.clone(),
            token,
        })
    }

    fn message(name: &str, recipient: &str, bytes: &[u8]) -> serde_json::Value {
        json!({
            "message": {
                "subject": format!("OIOUBL invoice {}", name),
                "body": {
                    "contentType": "Text",
                    "content": format!("Attached is the OIOUBL invoice {}.", name),
                },
                "toRecipients": [
                    { "emailAddress": { "address": recipient } }
                ],
                "attachments": [
                    {
                        "@odata.type": "#microsoft.graph.fileAttachment",
                        "name": name,
                        "contentType": "application/xml",
                        "contentBytes": STANDARD.encode(bytes),
                    }
                ],
            },
            "saveToSentItems": true,
        })
    }
}

#[async_trait]
impl DeliverySink for GraphMailSink {
    async fn deliver(&self, name: &str, bytes: &[u8]) -> Result<String, DispatchError> {
        let (Some(sender), Some(recipient), Some(token)) =
            (&self.sender, &self.recipient, &self.token)
        else {
            return Err(DispatchError::NotConfigured(
                "mail sink needs sender, recipient and an access token".to_string(),
            ));
        };

        let url = format!("{}/users/{}/sendMail", self.base_url, sender);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&Self::message(name, recipient, bytes))
            .send()
            .await
            .map_err(|e| DispatchError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Http(format!("HTTP {}: {}", status.as_u16(), body)));
        }
        info!("Sent {} to {}", name, recipient);
        Ok(format!("mail:{}", recipient))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_output_file_name() {
        assert_eq!(output_file_name("112262"), "invoice_112262.xml");
        assert_eq!(output_file_name("INV/2024 7"), "invoice_INV_2024_7.xml");
        assert_eq!(output_file_name("  "), "invoice_unnumbered.xml");
    }

    #[test]
    fn test_claim_file_name_suffixes_collisions() {
        let mut taken = HashSet::new();
        assert_eq!(claim_file_name("12/34", &mut taken), "invoice_12_34.xml");
        assert_eq!(claim_file_name("12_34", &mut taken), "invoice_12_34_2.xml");
        assert_eq!(claim_file_name("12/34", &mut taken), "invoice_12_34_3.xml");
        assert_eq!(claim_file_name("99", &mut taken), "invoice_99.xml");
    }

    #[tokio::test]
    async fn test_file_sink_overwrites() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path().join("out"));
        sink.deliver("invoice_1.xml", b"first").await.unwrap();
        let output = sink.deliver("invoice_1.xml", b"second").await.unwrap();

        let written = std::fs::read(&output).unwrap();
        assert_eq!(written, b"second");
    }

    #[tokio::test]
    async fn test_mail_sink_not_configured() {
        let sink = GraphMailSink::new(&MailConfig::default(), None, Duration::from_secs(1)).unwrap();
        let err = sink.deliver("invoice_1.xml", b"<Invoice/>").await.unwrap_err();
        assert!(matches!(err, DispatchError::NotConfigured(_)));
    }

    #[test]
    fn test_mail_message_attachment() {
        let message = GraphMailSink::message("invoice_1.xml", "ap@example.dk", b"<Invoice/>");
        let attachment = &message["message"]["attachments"][0];
        assert_eq!(attachment["name"], "invoice_1.xml");
        assert_eq!(attachment["contentBytes"], STANDARD.encode(b"<Invoice/>"));
        assert_eq!(
            message["message"]["toRecipients"][0]["emailAddress"]["address"],
            "ap@example.dk"
        );
    }
}
