use async_imap::imap_proto::types::{BodyContentCommon, BodyParams, BodyStructure};
use async_imap::types::Flag;
use chrono::{DateTime, Utc};
use mail_parser::{Address, HeaderValue, MessageParser, MimeHeaders, PartType};

use super::subject;
use super::types::{Envelope, Message, MessageFlags};
use crate::constants::SNIPPET_MAX_CHARS;
use crate::error::{Error, Result};

/// Build a partial message from an envelope streamed during listing.
///
/// The body is left empty; the snippet comes from the short text prefix
/// fetched alongside the headers, attachments from the body structure.
pub fn parse_envelope(envelope: &Envelope) -> Result<Message> {
    let message = MessageParser::default()
        .parse(&envelope.raw)
        .ok_or_else(|| Error::Parse(format!("uid {}: unreadable headers", envelope.uid)))?;

    let date = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0))
        .or(envelope.internal_date)
        .ok_or_else(|| Error::Parse(format!("uid {}: no usable date", envelope.uid)))?;

    let id = subject::message_id(message.message_id(), envelope.uid);
    let raw_subject = message.subject().unwrap_or_default().to_string();
    let thread_id = subject::thread_key(&subject::normalize(&raw_subject), &id);

    let snippet = extract_text_body(&message)
        .map(|text| snippet(&text))
        .unwrap_or_default();

    Ok(Message {
        id,
        uid: envelope.uid,
        thread_id,
        subject: raw_subject,
        from: format_addresses(message.from()),
        to: format_addresses(message.to()),
        cc: format_addresses(message.cc()),
        date,
        snippet,
        text: String::new(),
        in_reply_to: first_id(message.in_reply_to()),
        references: id_list(message.references()),
        unread: !envelope.flags.contains(MessageFlags::SEEN),
        labels: envelope.labels.clone(),
        attachments: envelope.attachments.clone(),
        hydrated: false,
    })
}

/// Fields recovered from a full message source.
#[derive(Debug, Clone, Default)]
pub struct ParsedSource {
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub in_reply_to: Option<String>,
    pub references: Vec<String>,
    pub text: String,
    pub attachments: Vec<String>,
}

impl ParsedSource {
    /// Fill a cached message with the hydrated body and corrected headers.
    ///
    /// The thread id is left alone: the message stays in the thread it was listed under.
    pub fn apply_to(self, message: &mut Message) {
        if let Some(subject) = self.subject {
            message.subject = subject;
        }
        if let Some(date) = self.date {
            message.date = date;
        }
        if self.in_reply_to.is_some() {
            message.in_reply_to = self.in_reply_to;
        }
        if !self.references.is_empty() {
            message.references = self.references;
        }
        message.snippet = snippet(&self.text);
        message.text = self.text;
        message.attachments = self.attachments;
        message.hydrated = true;
    }
}

pub fn parse_source(raw: &[u8]) -> Result<ParsedSource> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| Error::Parse("unreadable message source".to_string()))?;

    let text = match extract_text_body(&message) {
        Some(text) => text,
        None => match extract_html_body(&message) {
            Some(html) => html_to_text(&html)?,
            None => String::new(),
        },
    };

    let attachments = message
        .attachments()
        .map(|part| match part.attachment_name() {
            Some(name) => name.to_string(),
            None => part
                .content_type()
                .map(|ct| match ct.subtype() {
                    Some(sub) => format!("{}/{}", ct.ctype(), sub),
                    None => ct.ctype().to_string(),
                })
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        })
        .collect();

    Ok(ParsedSource {
        subject: message.subject().map(|s| s.trim().to_string()),
        date: message
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
        in_reply_to: first_id(message.in_reply_to()),
        references: id_list(message.references()),
        text,
        attachments,
    })
}

/// Collapse whitespace and keep the first characters as a preview.
pub fn snippet(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SNIPPET_MAX_CHARS)
        .collect()
}

fn extract_text_body(message: &mail_parser::Message) -> Option<String> {
    for part in message.text_bodies() {
        if let PartType::Text(text) = &part.body {
            return Some(text.to_string());
        }
    }

    // Some senders put the plain part outside the body structure
    for part in message.parts.iter() {
        if let PartType::Text(text) = &part.body {
            let content_type = part.content_type();
            if content_type
                .map(|ct| ct.subtype() == Some("plain"))
                .unwrap_or(true)
            {
                return Some(text.to_string());
            }
        }
    }

    None
}

fn extract_html_body(message: &mail_parser::Message) -> Option<String> {
    for part in message.html_bodies() {
        if let PartType::Html(html) = &part.body {
            return Some(html.to_string());
        }
    }

    None
}

fn html_to_text(html: &str) -> Result<String> {
    html2text::from_read(html.as_bytes(), 100)
        .map_err(|e| Error::Parse(format!("html body: {e}")))
}

fn format_addresses(address: Option<&Address>) -> Vec<String> {
    let Some(address) = address else {
        return Vec::new();
    };
    address
        .iter()
        .filter_map(|addr| {
            let email = addr.address()?;
            Some(match addr.name() {
                Some(name) if !name.trim().is_empty() => format!("{} <{}>", name.trim(), email),
                _ => email.to_string(),
            })
        })
        .collect()
}

fn first_id(value: &HeaderValue) -> Option<String> {
    value
        .as_text_list()
        .and_then(|ids| ids.first().map(|s| s.to_string()))
}

fn id_list(value: &HeaderValue) -> Vec<String> {
    value
        .as_text_list()
        .map(|ids| ids.iter().map(|s| s.to_string()).collect())
        .unwrap_or_default()
}

/// Attachment names from an IMAP BODYSTRUCTURE, in part order.
///
/// Named the way `parse_source` names them: the filename when there is one,
/// the MIME type otherwise. Inline parts with a Content-ID are embedded
/// images and inline parts without a filename are body decoration; neither counts.
pub fn attachments_from_bodystructure(structure: &BodyStructure<'_>) -> Vec<String> {
    let mut names = Vec::new();
    collect_attachments(structure, &mut names);
    names
}

fn collect_attachments(structure: &BodyStructure<'_>, names: &mut Vec<String>) {
    match structure {
        BodyStructure::Multipart { bodies, .. } => {
            for body in bodies {
                collect_attachments(body, names);
            }
        }
        BodyStructure::Message { common, .. } => names.push(part_name(common)),
        BodyStructure::Basic { common, other, .. } | BodyStructure::Text { common, other, .. } => {
            let disposition = common.disposition.as_ref();
            let explicit = disposition.is_some_and(|d| d.ty.eq_ignore_ascii_case("attachment"));
            let inline = disposition.is_some_and(|d| d.ty.eq_ignore_ascii_case("inline"));

            let counts = if explicit {
                true
            } else if common.ty.ty.eq_ignore_ascii_case("text") {
                false
            } else if inline {
                other.id.is_none()
                    && disposition.is_some_and(|d| param(&d.params, "filename").is_some())
            } else {
                true
            };
            if counts {
                names.push(part_name(common));
            }
        }
    }
}

fn part_name(common: &BodyContentCommon<'_>) -> String {
    common
        .disposition
        .as_ref()
        .and_then(|d| param(&d.params, "filename"))
        .or_else(|| param(&common.ty.params, "name"))
        .map(str::to_string)
        .unwrap_or_else(|| {
            format!("{}/{}", common.ty.ty, common.ty.subtype).to_ascii_lowercase()
        })
}

fn param<'a>(params: &'a BodyParams<'_>, key: &str) -> Option<&'a str> {
    params
        .as_ref()?
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_ref())
}

/// Translate IMAP flags into the bitflag set plus the raw label list.
pub fn parse_flags_from_imap(flags: &[Flag<'_>]) -> (MessageFlags, Vec<String>) {
    let mut result = MessageFlags::empty();
    let mut labels = Vec::with_capacity(flags.len());

    for flag in flags {
        let label = match flag {
            Flag::Seen => {
                result |= MessageFlags::SEEN;
                "\\Seen".to_string()
            }
            Flag::Answered => {
                result |= MessageFlags::ANSWERED;
                "\\Answered".to_string()
            }
            Flag::Flagged => {
                result |= MessageFlags::FLAGGED;
                "\\Flagged".to_string()
            }
            Flag::Deleted => {
                result |= MessageFlags::DELETED;
                "\\Deleted".to_string()
            }
            Flag::Draft => {
                result |= MessageFlags::DRAFT;
                "\\Draft".to_string()
            }
            Flag::Recent => "\\Recent".to_string(),
            Flag::Custom(keyword) => keyword.to_string(),
            _ => continue,
        };
        labels.push(label);
    }

    (result, labels)
}

#[cfg(test)]
pub(crate) fn envelope(uid: u32, raw: &str, flags: MessageFlags, labels: &[&str]) -> Envelope {
    Envelope {
        uid,
        flags,
        labels: labels.iter().map(|l| l.to_string()).collect(),
        internal_date: None,
        attachments: Vec::new(),
        raw: raw.as_bytes().to_vec(),
    }
}
