use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_DEPTH_MULTIPLIER, IMPORTANT_DEPTH_MULTIPLIER, SENDER_DEPTH_MULTIPLIER,
    UNREAD_DEPTH_MULTIPLIER,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
    pub struct MessageFlags: u32 {
        const SEEN = 0b00000001;
        const ANSWERED = 0b00000010;
        const FLAGGED = 0b00000100;
        const DELETED = 0b00001000;
        const DRAFT = 0b00010000;
    }
}

/// One fetched or hydrated mail item.
///
/// `text` stays empty until the body hydrator has fetched the full source.
/// `hydrated` records that it did, since a parsed body may itself be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    /// Mailbox-scoped sequence number; advisory only
    pub uid: u32,
    pub thread_id: String,
    pub subject: String,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub date: DateTime<Utc>,
    pub snippet: String,
    pub text: String,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub unread: bool,
    pub labels: Vec<String>,
    pub attachments: Vec<String>,
    #[serde(skip)]
    pub hydrated: bool,
}

impl Message {
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// from, to and cc in that order
    pub fn addresses(&self) -> impl Iterator<Item = &String> {
        self.from.iter().chain(&self.to).chain(&self.cc)
    }

    pub fn is_important(&self) -> bool {
        self.labels
            .iter()
            .any(|label| label.to_lowercase().contains("important"))
    }

    /// Case-insensitive substring match against every address.
    pub fn involves(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.addresses()
            .any(|addr| addr.to_lowercase().contains(&needle))
    }
}

/// A conversation grouping keyed by normalized subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    /// Display subject, first seen wins
    pub subject: String,
    pub participants: Vec<String>,
    pub snippet: String,
    /// Always the max date over member messages
    pub date: DateTime<Utc>,
    pub unread: bool,
    pub message_ids: Vec<String>,
    pub has_attachments: bool,
}

/// Metadata streamed by a mailbox session for one candidate message.
///
/// `raw` holds the header block followed by a short prefix of the body text.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub uid: u32,
    pub flags: MessageFlags,
    /// Every flag and keyword as the server reported it, e.g. `\Seen`, `$Important`
    pub labels: Vec<String>,
    pub internal_date: Option<DateTime<Utc>>,
    /// Attachment names read from BODYSTRUCTURE
    pub attachments: Vec<String>,
    pub raw: Vec<u8>,
}

/// Filters for a thread listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchFilter {
    pub limit: u32,
    pub important_only: bool,
    pub unread_only: bool,
    /// Recency cutoff in days
    pub days: Option<u32>,
    /// Substring matched case-insensitively against from/to/cc
    pub sender: Option<String>,
}

impl FetchFilter {
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }

    /// Filters reduce the hit rate per fetched message, so the window grows with them.
    pub fn depth_multiplier(&self) -> u32 {
        if self.sender.is_some() {
            SENDER_DEPTH_MULTIPLIER
        } else if self.important_only {
            IMPORTANT_DEPTH_MULTIPLIER
        } else if self.unread_only {
            UNREAD_DEPTH_MULTIPLIER
        } else {
            DEFAULT_DEPTH_MULTIPLIER
        }
    }

    /// Number of uids requested from the server.
    pub fn window(&self) -> u32 {
        self.limit.saturating_mul(self.depth_multiplier())
    }

    /// Messages older than this are dropped.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.days
            .map(|days| now - chrono::Duration::days(i64::from(days)))
    }

    /// Apply the filters in order: important, unread, recency, sender.
    pub fn matches(&self, message: &Message, cutoff: Option<DateTime<Utc>>) -> bool {
        if self.important_only && !message.is_important() {
            return false;
        }
        if self.unread_only && !message.unread {
            return false;
        }
        if let Some(cutoff) = cutoff
            && message.date < cutoff
        {
            return false;
        }
        if let Some(ref sender) = self.sender
            && !message.involves(sender)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    pub fn message(id: &str, thread_id: &str, date: DateTime<Utc>) -> Message {
        Message {
            id: id.to_string(),
            uid: 0,
            thread_id: thread_id.to_string(),
            subject: "Project X".to_string(),
            from: vec!["Alice <alice@example.com>".to_string()],
            to: vec!["bob@example.com".to_string()],
            cc: Vec::new(),
            date,
            snippet: format!("snippet of {id}"),
            text: String::new(),
            in_reply_to: None,
            references: Vec::new(),
            unread: false,
            labels: Vec::new(),
            attachments: Vec::new(),
            hydrated: false,
        }
    }
}
