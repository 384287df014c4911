//! Fills in bodies for cached messages that were only listed.

use std::sync::Arc;

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::ingest::IngestSink;
use crate::mail::imap::{MailboxConnector, MailboxSession};
use crate::mail::parser;
use crate::mail::types::Message;

pub struct BodyHydrator {
    connector: Arc<dyn MailboxConnector>,
    cache: Cache,
    ingest: Arc<dyn IngestSink>,
}

impl BodyHydrator {
    pub fn new(
        connector: Arc<dyn MailboxConnector>,
        cache: Cache,
        ingest: Arc<dyn IngestSink>,
    ) -> Self {
        Self {
            connector,
            cache,
            ingest,
        }
    }

    /// Fetch, parse and persist the full source of every message in `pending`.
    ///
    /// Each message is saved as soon as it is hydrated. Messages that fail to
    /// fetch or parse are logged and left as they were. Returns only the
    /// messages that were hydrated.
    pub async fn hydrate(&self, pending: Vec<Message>) -> Result<Vec<Message>> {
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let mut session = self.connector.open().await?;
        let hydrated = self.hydrate_with(session.as_mut(), pending).await;
        session.close().await;

        tracing::info!("Hydrated {} messages", hydrated.len());
        if let Err(e) = self.ingest.ingest(&hydrated).await {
            tracing::warn!("Ingest of {} messages failed: {}", hydrated.len(), e);
        }
        Ok(hydrated)
    }

    async fn hydrate_with(
        &self,
        session: &mut dyn MailboxSession,
        pending: Vec<Message>,
    ) -> Vec<Message> {
        let mut hydrated = Vec::with_capacity(pending.len());
        for mut message in pending {
            match self.hydrate_one(session, &mut message).await {
                Ok(()) => hydrated.push(message),
                Err(e) => {
                    tracing::warn!(id = %message.id, uid = message.uid, "Skipping hydration: {}", e)
                }
            }
        }
        hydrated
    }

    async fn hydrate_one(
        &self,
        session: &mut dyn MailboxSession,
        message: &mut Message,
    ) -> Result<()> {
        let raw = session
            .fetch_source(message.uid)
            .await?
            .ok_or_else(|| Error::NotFound(format!("uid {} no longer in mailbox", message.uid)))?;

        parser::parse_source(&raw)?.apply_to(message);
        self.cache.upsert_messages(std::slice::from_ref(message)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::fake::RecordingSink;
    use crate::mail::imap::fake::FakeMailbox;
    use crate::mail::types::fixtures::{at, message};

    fn listed(id: &str, uid: u32) -> Message {
        let mut m = message(id, "project x", at(1, uid));
        m.uid = uid;
        m
    }

    fn source(body: &str) -> Vec<u8> {
        format!(
            "From: Alice <alice@example.com>\r\nTo: bob@example.com\r\n\
             Subject: Re: Project X\r\nDate: Fri, 1 Mar 2024 10:00:00 +0000\r\n\
             References: <m0@example.com>\r\n\r\n{body}"
        )
        .into_bytes()
    }

    fn hydrator(mailbox: &FakeMailbox, cache: &Cache, sink: Arc<RecordingSink>) -> BodyHydrator {
        BodyHydrator::new(Arc::new(mailbox.clone()), cache.clone(), sink)
    }

    #[tokio::test]
    async fn test_hydrates_and_persists_each_message() {
        let cache = Cache::open_in_memory().await.unwrap();
        let pending = vec![listed("m1", 1), listed("m2", 2)];
        cache.upsert_messages(&pending).await.unwrap();

        let mut mailbox = FakeMailbox::with_status(2, Some(3));
        mailbox.sources.insert(1, source("First   body\r\nline two"));
        mailbox.sources.insert(2, source("Second body"));
        let sink = Arc::new(RecordingSink::default());

        let hydrated = hydrator(&mailbox, &cache, sink.clone())
            .hydrate(pending)
            .await
            .unwrap();

        assert_eq!(hydrated.len(), 2);
        let stored = cache.get_message("m1").await.unwrap().unwrap();
        assert!(stored.is_hydrated());
        assert_eq!(stored.snippet, "First body line two");
        assert_eq!(stored.subject, "Re: Project X");
        assert_eq!(stored.references, vec!["m0@example.com"]);
        assert_eq!(stored.thread_id, "project x");
        assert_eq!(mailbox.counters.closes(), 1);
        assert_eq!(sink.batches(), vec![vec!["m1".to_string(), "m2".to_string()]]);
    }

    #[tokio::test]
    async fn test_missing_source_is_skipped_and_stays_unhydrated() {
        let cache = Cache::open_in_memory().await.unwrap();
        let pending = vec![listed("m1", 1), listed("m2", 2)];
        cache.upsert_messages(&pending).await.unwrap();

        let mut mailbox = FakeMailbox::with_status(2, Some(3));
        mailbox.sources.insert(2, source("Second body"));

        let hydrated = hydrator(&mailbox, &cache, Arc::new(RecordingSink::default()))
            .hydrate(pending)
            .await
            .unwrap();

        assert_eq!(hydrated.len(), 1);
        assert_eq!(hydrated[0].id, "m2");
        assert!(!cache.get_message("m1").await.unwrap().unwrap().is_hydrated());
        assert!(cache.get_message("m2").await.unwrap().unwrap().is_hydrated());
    }

    #[tokio::test]
    async fn test_ingest_failure_is_not_fatal() {
        let cache = Cache::open_in_memory().await.unwrap();
        let mut mailbox = FakeMailbox::with_status(1, Some(2));
        mailbox.sources.insert(1, source("Body"));
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..Default::default()
        });

        let hydrated = hydrator(&mailbox, &cache, sink.clone())
            .hydrate(vec![listed("m1", 1)])
            .await
            .unwrap();

        assert_eq!(hydrated.len(), 1);
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_propagates() {
        let cache = Cache::open_in_memory().await.unwrap();
        let mailbox = FakeMailbox {
            fail_open: true,
            ..Default::default()
        };

        let err = hydrator(&mailbox, &cache, Arc::new(RecordingSink::default()))
            .hydrate(vec![listed("m1", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_nothing_pending_opens_no_session() {
        let cache = Cache::open_in_memory().await.unwrap();
        let mailbox = FakeMailbox::default();

        let hydrated = hydrator(&mailbox, &cache, Arc::new(RecordingSink::default()))
            .hydrate(Vec::new())
            .await
            .unwrap();
        assert!(hydrated.is_empty());
        assert_eq!(mailbox.counters.opens(), 0);
    }
}
