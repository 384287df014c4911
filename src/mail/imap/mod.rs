//! Remote mailbox access.
//!
//! This module is split into:
//! - `mod.rs` - session traits and shared types
//! - `client.rs` - async-imap implementation over rustls
//! - `fetch.rs` - fetch plan, filtered candidate collection and the sender retry

mod client;
mod fetch;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::types::Envelope;
use crate::error::Result;

pub use client::ImapConnector;
pub use fetch::fetch_candidates;

/// Counters reported when the mailbox is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MailboxStatus {
    pub exists: u32,
    /// Next uid the server will assign; `None` when the server omits UIDNEXT
    pub uid_next: Option<u32>,
}

/// Inclusive uid range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UidRange {
    pub start: u32,
    pub end: u32,
}

impl UidRange {
    pub fn sequence_set(&self) -> String {
        format!("{}:{}", self.start, self.end)
    }
}

/// Opens sessions against the remote mailbox.
///
/// Every listing or hydration opens its own session; nothing is shared
/// between requests.
#[async_trait]
pub trait MailboxConnector: Send + Sync {
    /// Connect, authenticate and take a read-only handle on the configured mailbox.
    async fn open(&self) -> Result<Box<dyn MailboxSession>>;
}

/// An open session holding the mailbox handle.
///
/// Callers must finish with [`MailboxSession::close`] on every path.
#[async_trait]
pub trait MailboxSession: Send {
    async fn status(&mut self) -> Result<MailboxStatus>;

    /// Stream envelopes for `range` in server order. Dropping the stream stops the fetch.
    async fn fetch_envelopes<'a>(
        &'a mut self,
        range: UidRange,
    ) -> Result<BoxStream<'a, Result<Envelope>>>;

    /// Full RFC 822 source of one message, `None` if the uid no longer exists.
    async fn fetch_source(&mut self, uid: u32) -> Result<Option<Vec<u8>>>;

    /// Release the mailbox and log out. Failures are logged, not returned.
    async fn close(self: Box<Self>);
}
