//! Filtered candidate fetching.
//!
//! The server cannot be asked for "the N newest unread messages from Alice",
//! so we guess a uid window from the filter combination, stream it and filter
//! client side until enough matches are collected.

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};

use super::{MailboxConnector, MailboxSession, MailboxStatus, UidRange};
use crate::error::Result;
use crate::mail::parser::parse_envelope;
use crate::mail::types::{Envelope, FetchFilter, Message};

/// The uid window a listing will request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPlan {
    pub window: u32,
    pub range: UidRange,
}

impl FetchPlan {
    /// `None` when there is nothing to fetch.
    pub fn new(filter: &FetchFilter, status: MailboxStatus) -> Option<Self> {
        if status.exists == 0 {
            return None;
        }
        let window = filter.window();
        let uid_next = status
            .uid_next
            .unwrap_or_else(|| status.exists.saturating_add(1));
        if window == 0 || uid_next <= 1 {
            return None;
        }

        let range = UidRange {
            start: uid_next.saturating_sub(window).max(1),
            end: uid_next - 1,
        };
        Some(Self { window, range })
    }
}

/// Open a session, fetch filtered candidates, and release the session on every path.
///
/// With a sender filter, an empty first pass is repeated exactly once.
pub async fn fetch_candidates(
    connector: &dyn MailboxConnector,
    filter: &FetchFilter,
) -> Result<Vec<Message>> {
    let mut session = connector.open().await?;
    let result = run_passes(session.as_mut(), filter).await;
    session.close().await;

    if let Ok(ref messages) = result {
        tracing::info!("Fetched {} candidate messages", messages.len());
    }
    result
}

async fn run_passes(
    session: &mut dyn MailboxSession,
    filter: &FetchFilter,
) -> Result<Vec<Message>> {
    let status = session.status().await?;
    let Some(plan) = FetchPlan::new(filter, status) else {
        tracing::debug!("Mailbox empty, nothing to fetch");
        return Ok(Vec::new());
    };
    tracing::debug!(
        window = plan.window,
        start = plan.range.start,
        end = plan.range.end,
        "Fetch plan"
    );

    let cutoff = filter.cutoff(Utc::now());

    let envelopes = session.fetch_envelopes(plan.range).await?;
    let first = collect_candidates(envelopes, filter, cutoff).await;
    if !first.is_empty() || filter.sender.is_none() {
        return Ok(first);
    }

    tracing::debug!("Sender filter matched nothing, retrying once");
    let envelopes = session.fetch_envelopes(plan.range).await?;
    Ok(collect_candidates(envelopes, filter, cutoff).await)
}

/// Consume envelopes in server order until `filter.limit` matches are collected.
///
/// Envelopes that fail to fetch or parse are logged and skipped.
pub async fn collect_candidates<S>(
    envelopes: S,
    filter: &FetchFilter,
    cutoff: Option<DateTime<Utc>>,
) -> Vec<Message>
where
    S: Stream<Item = Result<Envelope>> + Unpin,
{
    let limit = filter.limit as usize;
    let mut matches = Vec::with_capacity(limit.min(256));
    let mut envelopes = envelopes;

    while matches.len() < limit {
        let Some(item) = envelopes.next().await else {
            break;
        };
        let envelope = match item {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Skipping message: {}", e);
                continue;
            }
        };
        let message = match parse_envelope(&envelope) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Skipping message: {}", e);
                continue;
            }
        };
        if filter.matches(&message, cutoff) {
            matches.push(message);
        }
    }

    matches
}
