//! Subject normalization and thread-key derivation.

use crate::constants::NO_SUBJECT_KEY;

const REPLY_PREFIXES: [&str; 2] = ["re:", "fwd:"];

/// Normalize a subject for grouping: strip leading `Re:`/`Fwd:` tokens
/// (any case, any number) and lowercase.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
pub fn normalize(subject: &str) -> String {
    let mut s = subject.trim();
    'strip: loop {
        for prefix in REPLY_PREFIXES {
            if let Some(head) = s.get(..prefix.len())
                && head.eq_ignore_ascii_case(prefix)
            {
                s = s[prefix.len()..].trim_start();
                continue 'strip;
            }
        }
        break;
    }

    if s.is_empty() {
        NO_SUBJECT_KEY.to_string()
    } else {
        s.to_lowercase()
    }
}

/// Thread key for a message. Subject-less messages each get their own thread.
pub fn thread_key(normalized: &str, message_id: &str) -> String {
    if normalized == NO_SUBJECT_KEY {
        format!("nosubject:{message_id}")
    } else {
        normalized.to_string()
    }
}

/// Message id for an envelope: the native Message-ID, or `uid-<uid>` when absent.
pub fn message_id(native: Option<&str>, uid: u32) -> String {
    match native.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => format!("uid-{uid}"),
    }
}

/// Display subject for a thread, trimmed.
pub fn display(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.is_empty() {
        NO_SUBJECT_KEY.to_string()
    } else {
        trimmed.to_string()
    }
}
