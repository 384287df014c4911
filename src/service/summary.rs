//! Compute-once thread summaries.

use std::sync::Arc;

use crate::ai::prompts::{THREAD_SUMMARY_SYSTEM, summary_user};
use crate::ai::{ChatMessage, GenerationRequest, Summary, TextGenerator};
use crate::constants::{SUMMARY_BODY_MAX_CHARS, SUMMARY_MESSAGE_COUNT};
use crate::error::{Error, Result};

use super::threads::{ThreadLoad, ThreadService};

const SUMMARY_TEMPERATURE: f32 = 0.2;

pub struct SummaryService {
    threads: Arc<ThreadService>,
    generator: Arc<dyn TextGenerator>,
    max_tokens: u32,
}

impl SummaryService {
    pub fn new(
        threads: Arc<ThreadService>,
        generator: Arc<dyn TextGenerator>,
        max_tokens: u32,
    ) -> Self {
        Self {
            threads,
            generator,
            max_tokens,
        }
    }

    /// The cached summary, or a freshly generated one that is then cached.
    ///
    /// Generation failures and unreadable replies produce a degraded summary,
    /// which is cached like any other.
    pub async fn get_or_create(&self, thread_id: &str) -> Result<Summary> {
        let cache = self.threads.cache();
        if let Some(summary) = cache.get_summary(thread_id).await? {
            return Ok(summary);
        }

        let page = match self
            .threads
            .load_thread(thread_id, SUMMARY_MESSAGE_COUNT)
            .await?
        {
            ThreadLoad::Ready(page) => page,
            ThreadLoad::Empty => return Err(Error::NotFound(format!("thread {thread_id}"))),
        };

        let mut recent = page.messages;
        recent.reverse();

        let request = GenerationRequest {
            messages: vec![
                ChatMessage::system(THREAD_SUMMARY_SYSTEM),
                ChatMessage::user(summary_user(
                    &page.thread.subject,
                    &recent,
                    SUMMARY_BODY_MAX_CHARS,
                )),
            ],
            temperature: Some(SUMMARY_TEMPERATURE),
            max_tokens: self.max_tokens,
        };

        let summary = match self.generator.generate(&request).await {
            Ok(raw) => Summary::coerce(&raw),
            Err(e) => {
                tracing::warn!(thread_id, "Summary generation failed: {}", e);
                Summary::degraded(&format!("Summary unavailable: {e}"))
            }
        };

        cache.save_summary(thread_id, &summary).await?;
        Ok(summary)
    }
}
