//! System prompts and prompt assembly for thread summaries and reply drafts

use crate::mail::types::Message;

/// System prompt for thread summaries. The reply must be the JSON object only.
pub const THREAD_SUMMARY_SYSTEM: &str = r#"You are an email thread summarization assistant. Read the messages (most recent first) and reply with a single JSON object and nothing else, using exactly these keys:
{"bullets": [3-5 short strings], "actions": [0-3 short strings], "sentiment": "positive|neutral|negative|mixed", "urgency": "low|medium|high", "whoNeedsToAct": "name or empty string", "oneLiner": "one sentence"}
No prose, no markdown, no code fences."#;

/// System prompt for reply drafts.
pub const DRAFT_SYSTEM: &str = r#"You write email replies on behalf of the user. Align tone to the recipient: if they are direct, be concise; if they are stressed, be empathetic. Never invent facts, dates or commitments that are not in the thread or the goal.
Reply with a single JSON object and nothing else: {"draft": "<the reply body, no subject line>"}"#;

/// Cut to `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn body_or_snippet(message: &Message) -> &str {
    if message.text.trim().is_empty() {
        &message.snippet
    } else {
        &message.text
    }
}

fn render_message(out: &mut String, message: &Message, max_chars: usize) {
    out.push_str(&format!(
        "From: {}\nTo: {}\nDate: {}\nSubject: {}\n\n{}\n",
        message.from.join(", "),
        message.to.join(", "),
        message.date.format("%Y-%m-%d %H:%M UTC"),
        message.subject,
        truncate_chars(body_or_snippet(message), max_chars).trim(),
    ));
}

/// User content for a summary request; `messages` are expected newest first.
pub fn summary_user(subject: &str, messages: &[Message], max_chars: usize) -> String {
    let mut out = format!("Thread: {subject}\n");
    for (i, message) in messages.iter().enumerate() {
        out.push_str(&format!("\n--- Message {} ---\n", i + 1));
        render_message(&mut out, message, max_chars);
    }
    out
}

/// Inputs that shape a draft beyond the thread itself.
#[derive(Debug, Clone, Default)]
pub struct DraftBrief<'a> {
    pub goal: &'a str,
    pub persona_name: Option<&'a str>,
    pub persona_style: Option<&'a str>,
    pub tone: Option<&'a str>,
}

pub fn draft_user(
    brief: &DraftBrief<'_>,
    summary_line: &str,
    latest: &Message,
    max_chars: usize,
) -> String {
    let mut out = String::new();
    if let Some(name) = brief.persona_name {
        out.push_str(&format!("Write as: {name}\n"));
    }
    if let Some(style) = brief.persona_style {
        out.push_str(&format!("Writing style: {style}\n"));
    }
    if let Some(tone) = brief.tone {
        out.push_str(&format!("Tone: {tone}\n"));
    }
    out.push_str(&format!("Goal of the reply: {}\n", brief.goal));
    if !summary_line.is_empty() {
        out.push_str(&format!("Thread so far: {summary_line}\n"));
    }
    out.push_str("\nMost recent message:\n");
    render_message(&mut out, latest, max_chars);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::types::fixtures::{at, message};

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn test_summary_user_truncates_bodies() {
        let mut m = message("m1", "t", at(1, 9));
        m.text = "x".repeat(5000);

        let prompt = summary_user("Budget", &[m], 1200);
        assert!(prompt.starts_with("Thread: Budget"));
        assert!(prompt.contains(&"x".repeat(1200)));
        assert!(!prompt.contains(&"x".repeat(1201)));
    }

    #[test]
    fn test_summary_user_falls_back_to_snippet() {
        let m = message("m1", "t", at(1, 9));
        assert!(summary_user("s", &[m], 100).contains("snippet of m1"));
    }

    #[test]
    fn test_draft_user_includes_brief() {
        let mut latest = message("m1", "t", at(1, 9));
        latest.text = "Can you confirm Friday?".into();
        let brief = DraftBrief {
            goal: "confirm the meeting",
            persona_name: Some("Sam"),
            persona_style: Some("short sentences"),
            tone: Some("friendly"),
        };

        let prompt = draft_user(&brief, "Meeting planning", &latest, 2000);
        assert!(prompt.contains("Write as: Sam"));
        assert!(prompt.contains("Tone: friendly"));
        assert!(prompt.contains("Goal of the reply: confirm the meeting"));
        assert!(prompt.contains("Can you confirm Friday?"));
    }
}
