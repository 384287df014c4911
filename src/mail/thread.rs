use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::subject;
use super::types::{Message, Thread};

/// Thread under construction plus the member ids actually folded into it.
#[derive(Debug)]
struct Record {
    thread: Thread,
    folded: HashSet<String>,
}

impl Record {
    fn empty(id: &str, subject: String) -> Self {
        Self {
            thread: Thread {
                id: id.to_string(),
                subject,
                participants: Vec::new(),
                snippet: String::new(),
                date: DateTime::<Utc>::MIN_UTC,
                unread: false,
                message_ids: Vec::new(),
                has_attachments: false,
            },
            folded: HashSet::new(),
        }
    }

    fn fold(&mut self, message: &Message) {
        let thread = &mut self.thread;

        for addr in message.addresses() {
            if !thread.participants.contains(addr) {
                thread.participants.push(addr.clone());
            }
        }

        let newer = self.folded.is_empty() || message.date >= thread.date;
        if !message.snippet.is_empty() && (thread.snippet.is_empty() || newer) {
            thread.snippet = message.snippet.clone();
        }
        if self.folded.is_empty() || message.date > thread.date {
            thread.date = message.date;
        }

        thread.unread |= message.unread;
        thread.has_attachments |= !message.attachments.is_empty();

        if self.folded.insert(message.id.clone()) && !thread.message_ids.contains(&message.id) {
            thread.message_ids.push(message.id.clone());
        }
    }

    fn finish(mut self) -> Option<Thread> {
        // Seeded ids whose message was never folded cannot contribute a date
        let folded = self.folded;
        self.thread.message_ids.retain(|id| folded.contains(id));
        (!self.thread.message_ids.is_empty()).then_some(self.thread)
    }
}

/// Folds messages into thread records keyed by each message's `thread_id`.
///
/// Running it over overlapping batches never loses state for the messages it
/// is given. Callers rewriting a stored thread must feed it every member they
/// want kept, since the cache replaces thread rows wholesale.
#[derive(Debug, Default)]
pub struct ThreadAggregator {
    records: HashMap<String, Record>,
    order: Vec<String>,
}

impl ThreadAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a stored thread: its display subject and member order are kept,
    /// every derived field is recomputed from the messages folded afterwards.
    pub fn seed(&mut self, existing: &Thread) {
        if self.records.contains_key(&existing.id) {
            return;
        }
        let mut record = Record::empty(&existing.id, existing.subject.clone());
        record.thread.message_ids = existing.message_ids.clone();
        self.order.push(existing.id.clone());
        self.records.insert(existing.id.clone(), record);
    }

    pub fn add(&mut self, message: &Message) {
        if !self.records.contains_key(&message.thread_id) {
            self.order.push(message.thread_id.clone());
            self.records.insert(
                message.thread_id.clone(),
                Record::empty(&message.thread_id, subject::display(&message.subject)),
            );
        }
        if let Some(record) = self.records.get_mut(&message.thread_id) {
            record.fold(message);
        }
    }

    pub fn extend<'a>(&mut self, messages: impl IntoIterator<Item = &'a Message>) {
        for message in messages {
            self.add(message);
        }
    }

    /// Threads in first-seen order.
    pub fn into_threads(mut self) -> Vec<Thread> {
        self.order
            .iter()
            .filter_map(|id| self.records.remove(id))
            .filter_map(Record::finish)
            .collect()
    }
}

/// Aggregate a batch of messages into thread records keyed by thread id.
pub fn aggregate(messages: &[Message]) -> HashMap<String, Thread> {
    let mut aggregator = ThreadAggregator::new();
    aggregator.extend(messages);
    aggregator
        .into_threads()
        .into_iter()
        .map(|thread| (thread.id.clone(), thread))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::subject::normalize;
    use crate::mail::types::fixtures::{at, message};

    fn with_subject(id: &str, subject: &str, date: DateTime<Utc>) -> Message {
        let mut msg = message(id, &normalize(subject), date);
        msg.subject = subject.to_string();
        msg
    }

    #[test]
    fn test_reply_prefixes_share_one_thread() {
        let messages = vec![
            with_subject("m1", "Project X", at(1, 9)),
            with_subject("m2", "Re: Project X", at(1, 10)),
            with_subject("m3", "RE:project x", at(1, 11)),
        ];

        let threads = aggregate(&messages);
        assert_eq!(threads.len(), 1);
        let thread = &threads["project x"];
        assert_eq!(thread.message_ids, vec!["m1", "m2", "m3"]);
        assert_eq!(thread.subject, "Project X");
    }

    #[test]
    fn test_date_is_max_of_members() {
        let messages = vec![
            with_subject("m1", "Budget", at(5, 9)),
            with_subject("m2", "Re: Budget", at(7, 9)),
            with_subject("m3", "Re: Budget", at(6, 9)),
        ];

        let thread = &aggregate(&messages)["budget"];
        let max = messages.iter().map(|m| m.date).max().unwrap();
        assert_eq!(thread.date, max);
    }

    #[test]
    fn test_snippet_tracks_newest_non_empty() {
        let mut newest = with_subject("m3", "Re: Budget", at(7, 9));
        newest.snippet = String::new();
        let messages = vec![
            with_subject("m2", "Re: Budget", at(6, 9)),
            with_subject("m1", "Budget", at(5, 9)),
            newest,
        ];

        let thread = &aggregate(&messages)["budget"];
        assert_eq!(thread.snippet, "snippet of m2");
    }

    #[test]
    fn test_flags_and_participants_are_unions() {
        let mut m1 = with_subject("m1", "Offsite", at(1, 9));
        m1.unread = true;
        let mut m2 = with_subject("m2", "Re: Offsite", at(2, 9));
        m2.from = vec!["bob@example.com".to_string()];
        m2.to = vec!["Alice <alice@example.com>".to_string()];
        m2.cc = vec!["carol@example.com".to_string()];
        m2.attachments = vec!["agenda.pdf".to_string()];

        let thread = &aggregate(&[m1, m2])["offsite"];
        assert!(thread.unread);
        assert!(thread.has_attachments);
        assert_eq!(
            thread.participants,
            vec![
                "Alice <alice@example.com>",
                "bob@example.com",
                "carol@example.com"
            ]
        );
    }

    #[test]
    fn test_identical_subjects_from_unrelated_senders_merge() {
        let mut a = with_subject("a1", "Re: Lunch?", at(3, 12));
        a.from = vec!["alice@one.example".to_string()];
        let mut b = with_subject("b1", "Lunch?", at(3, 13));
        b.from = vec!["zed@two.example".to_string()];

        let threads = aggregate(&[a, b]);
        assert_eq!(threads.len(), 1);
        assert_eq!(threads["lunch?"].message_ids, vec!["a1", "b1"]);
    }

    #[test]
    fn test_subjectless_messages_stay_apart() {
        let mut a = message("a1", "nosubject:a1", at(1, 1));
        a.subject = String::new();
        let mut b = message("b1", "nosubject:b1", at(1, 2));
        b.subject = String::new();

        let threads = aggregate(&[a, b]);
        assert_eq!(threads.len(), 2);
        assert_eq!(threads["nosubject:a1"].subject, "(no subject)");
    }

    #[test]
    fn test_seeded_refold_keeps_order_and_recomputes() {
        let old = with_subject("m1", "Plan", at(1, 9));
        let mid = with_subject("m2", "Re: Plan", at(2, 9));
        let stored = aggregate(&[mid.clone(), old.clone()])["plan"].clone();
        assert_eq!(stored.message_ids, vec!["m2", "m1"]);

        let mut newest = with_subject("m3", "RE: plan", at(3, 9));
        newest.unread = true;

        let mut aggregator = ThreadAggregator::new();
        aggregator.seed(&stored);
        aggregator.extend([&old, &newest, &mid, &newest]);
        let threads = aggregator.into_threads();

        assert_eq!(threads.len(), 1);
        let thread = &threads[0];
        assert_eq!(thread.subject, "Plan");
        assert_eq!(thread.message_ids, vec!["m2", "m1", "m3"]);
        assert_eq!(thread.date, at(3, 9));
        assert!(thread.unread);
    }

    #[test]
    fn test_seeded_ids_without_members_are_dropped() {
        let stored = aggregate(&[with_subject("m1", "Plan", at(1, 9))])["plan"].clone();

        let mut aggregator = ThreadAggregator::new();
        aggregator.seed(&stored);
        assert!(aggregator.into_threads().is_empty());
    }
}
