//! Best-effort forwarding of hydrated messages to the knowledge-base sidecar.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::mail::types::Message;
use crate::retry::{RetryConfig, with_retry};

/// Accepts batches of hydrated messages. Callers ignore failures.
#[async_trait]
pub trait IngestSink: Send + Sync {
    async fn ingest(&self, messages: &[Message]) -> Result<()>;
}

/// Used when no ingest url is configured.
pub struct NoopIngestSink;

#[async_trait]
impl IngestSink for NoopIngestSink {
    async fn ingest(&self, _messages: &[Message]) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct IngestMessage<'a> {
    subject: &'a str,
    text: &'a str,
    snippet: &'a str,
    date: String,
    thread_id: &'a str,
    message_id: &'a str,
    from: &'a [String],
    to: &'a [String],
    cc: &'a [String],
    metadata: serde_json::Value,
}

impl<'a> From<&'a Message> for IngestMessage<'a> {
    fn from(message: &'a Message) -> Self {
        Self {
            subject: &message.subject,
            text: &message.text,
            snippet: &message.snippet,
            date: message.date.to_rfc3339(),
            thread_id: &message.thread_id,
            message_id: &message.id,
            from: &message.from,
            to: &message.to,
            cc: &message.cc,
            metadata: json!({
                "unread": message.unread,
                "labels": message.labels,
                "attachments": message.attachments,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
struct IngestRequest<'a> {
    messages: Vec<IngestMessage<'a>>,
}

/// POSTs to `{url}/ingest/email`.
#[derive(Clone)]
pub struct HttpIngestSink {
    client: Client,
    endpoint: String,
    retry: RetryConfig,
}

impl HttpIngestSink {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/ingest/email", base_url.trim_end_matches('/')),
            retry: RetryConfig::outbound(),
        }
    }

    async fn post(&self, body: &IngestRequest<'_>) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("Failed to reach {}: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Transport(format!("ingest error ({status}): {text}")));
        }
        Ok(())
    }
}

#[async_trait]
impl IngestSink for HttpIngestSink {
    async fn ingest(&self, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }
        let body = IngestRequest {
            messages: messages.iter().map(IngestMessage::from).collect(),
        };
        with_retry(&self.retry, "ingest", || self.post(&body)).await?;
        tracing::debug!("Ingested {} messages", messages.len());
        Ok(())
    }
}
