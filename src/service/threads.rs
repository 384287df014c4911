//! Listing pipeline and the thread-load state machine.

use std::collections::HashSet;
use std::sync::Arc;

use crate::cache::{Cache, ThreadPage};
use crate::error::Result;
use crate::hydrate::BodyHydrator;
use crate::ingest::IngestSink;
use crate::mail::imap::{MailboxConnector, fetch_candidates};
use crate::mail::thread::ThreadAggregator;
use crate::mail::types::{FetchFilter, Message, Thread};

/// Outcome of [`ThreadService::load_thread`].
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadLoad {
    Ready(ThreadPage),
    /// Not cached and the mailbox had nothing for it either
    Empty,
}

pub struct ThreadService {
    cache: Cache,
    connector: Arc<dyn MailboxConnector>,
    hydrator: BodyHydrator,
    /// Listing depth used to rebuild the cache on a thread miss
    rebuild_limit: u32,
}

impl ThreadService {
    pub fn new(
        cache: Cache,
        connector: Arc<dyn MailboxConnector>,
        ingest: Arc<dyn IngestSink>,
        rebuild_limit: u32,
    ) -> Self {
        let hydrator = BodyHydrator::new(connector.clone(), cache.clone(), ingest);
        Self {
            cache,
            connector,
            hydrator,
            rebuild_limit,
        }
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Fetch candidates for `filter`, merge them into the cache and read the
    /// touched threads back from it, newest first.
    pub async fn list_threads(&self, filter: &FetchFilter) -> Result<Vec<Thread>> {
        let touched = self.sync(filter).await?;
        self.cache
            .list_threads(&touched, filter.limit as usize)
            .await
    }

    /// Returns the ids of every thread that received a fetched message.
    async fn sync(&self, filter: &FetchFilter) -> Result<Vec<String>> {
        let candidates = fetch_candidates(self.connector.as_ref(), filter).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        self.cache.upsert_messages(&candidates).await?;

        let touched = touched_threads(&candidates);
        let rewritten = self.refresh_threads(&touched).await?;

        tracing::info!(
            messages = candidates.len(),
            threads = rewritten,
            "Merged listing into cache"
        );
        Ok(touched)
    }

    /// Rebuild each thread from every cached member, not just this batch:
    /// thread rows are replaced wholesale, so anything left out would be dropped.
    async fn refresh_threads(&self, thread_ids: &[String]) -> Result<usize> {
        let mut aggregator = ThreadAggregator::new();
        for id in thread_ids {
            if let Some(existing) = self.cache.get_thread_record(id).await? {
                aggregator.seed(&existing);
            }
            let members = self.cache.messages_in_thread(id).await?;
            aggregator.extend(&members);
        }
        let threads = aggregator.into_threads();
        self.cache.upsert_threads(&threads).await?;
        Ok(threads.len())
    }

    /// Cache first; hydrate missing bodies on a partial hit; rebuild from the
    /// mailbox on a miss.
    pub async fn load_thread(&self, thread_id: &str, limit: usize) -> Result<ThreadLoad> {
        if let Some(page) = self.load_cached(thread_id, limit).await? {
            return Ok(ThreadLoad::Ready(page));
        }

        tracing::debug!(thread_id, "Thread not cached, rebuilding from mailbox");
        self.sync(&FetchFilter::with_limit(self.rebuild_limit)).await?;

        match self.load_cached(thread_id, limit).await? {
            Some(page) => Ok(ThreadLoad::Ready(page)),
            None => Ok(ThreadLoad::Empty),
        }
    }

    async fn load_cached(&self, thread_id: &str, limit: usize) -> Result<Option<ThreadPage>> {
        let Some(page) = self.cache.get_thread(thread_id, limit).await? else {
            return Ok(None);
        };

        let pending: Vec<Message> = page
            .messages
            .iter()
            .filter(|m| !m.is_hydrated())
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(Some(page));
        }

        tracing::debug!(thread_id, pending = pending.len(), "Hydrating thread");
        let hydrated = self.hydrator.hydrate(pending).await?;
        // Bodies can bring attachments and corrected dates the row does not reflect yet
        if !hydrated.is_empty() {
            self.refresh_threads(&[thread_id.to_string()]).await?;
        }
        self.cache.get_thread(thread_id, limit).await
    }
}

/// Distinct thread ids in first-seen order.
fn touched_threads(messages: &[Message]) -> Vec<String> {
    let mut seen = HashSet::new();
    messages
        .iter()
        .filter(|m| seen.insert(m.thread_id.as_str()))
        .map(|m| m.thread_id.clone())
        .collect()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ingest::fake::RecordingSink;
    use crate::mail::imap::fake::FakeMailbox;
    use crate::mail::parser::envelope;
    use crate::mail::types::MessageFlags;

    /// Header block for a listed message; `day` is in March 2024.
    pub fn raw(id: &str, subject: &str, from: &str, day: u32) -> String {
        format!(
            "From: {from}\r\nTo: bob@example.com\r\nSubject: {subject}\r\n\
             Date: {day:02} Mar 2024 09:00:00 +0000\r\nMessage-ID: <{id}>\r\n\r\n\
             Body of {id}"
        )
    }

    pub fn add(mailbox: &mut FakeMailbox, uid: u32, id: &str, subject: &str, day: u32) {
        let raw = raw(id, subject, "Alice <alice@example.com>", day);
        mailbox
            .envelopes
            .push(envelope(uid, &raw, MessageFlags::empty(), &[]));
        mailbox.sources.insert(uid, raw.into_bytes());
    }

    pub async fn service(mailbox: &FakeMailbox) -> (ThreadService, Cache) {
        let cache = Cache::open_in_memory().await.unwrap();
        let service = ThreadService::new(
            cache.clone(),
            Arc::new(mailbox.clone()),
            Arc::new(RecordingSink::default()),
            20,
        );
        (service, cache)
    }
}
