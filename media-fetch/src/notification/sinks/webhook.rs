//! Webhook diagnostic sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::DiagnosticSink;
use crate::notification::events::DiagnosticEvent;
use crate::utils::http_client::build_client;
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    pub auth: Option<WebhookAuth>,
    /// Request timeout in seconds (default: 10).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WebhookAuth {
    Bearer { token: String },
    Header { name: String, value: String },
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            auth: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// POSTs each diagnostic as JSON.
pub struct WebhookSink {
    config: WebhookConfig,
    client: Client,
}

impl WebhookSink {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(Error::config("webhook url is empty"));
        }
        let client = build_client(Duration::from_secs(config.timeout_secs))?;
        Ok(Self { config, client })
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let mut insert = |name: &str, value: &str| {
            if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
                headers.insert(name, value);
            }
        };

        for (name, value) in &self.config.headers {
            insert(name, value);
        }
        match &self.config.auth {
            Some(WebhookAuth::Bearer { token }) => insert(AUTHORIZATION.as_str(), &format!("Bearer {token}")),
            Some(WebhookAuth::Header { name, value }) => insert(name, value),
            None => {}
        }
        headers
    }

    fn build_payload(event: &DiagnosticEvent, suppressed: u64) -> serde_json::Value {
        json!({
            "source": event.source,
            "error_type": event.error_type,
            "classification": event.classification,
            "locator": event.locator,
            "requester": event.requester,
            "snippet": event.snippet,
            "suppressed": suppressed,
            "timestamp": event.occurred_at.to_rfc3339(),
        })
    }
}

#[async_trait]
impl DiagnosticSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, event: &DiagnosticEvent, suppressed: u64) -> Result<()> {
        let response = self
            .client
            .post(&self.config.url)
            .headers(self.build_headers())
            .json(&Self::build_payload(event, suppressed))
            .send()
            .await
            .map_err(|e| Error::Other(format!("Webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "Diagnostic webhook rejected");
            return Err(Error::Other(format!("Webhook failed: {status}")));
        }

        debug!(source = %event.source, error_type = event.error_type, "Diagnostic webhook sent");
        Ok(())
    }
}
