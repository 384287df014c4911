//! Message upserts and reads.

use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::{Cache, decode_list, encode_list, to_datetime};
use crate::error::Result;
use crate::mail::types::Message;

pub(super) const MESSAGE_COLUMNS: &str = "id, uid, thread_id, subject, from_list, to_list, \
     cc_list, date, snippet, text, in_reply_to, references_list, unread, labels, attachments, hydrated";

pub(super) fn row_to_message(row: SqliteRow) -> Result<Message> {
    Ok(Message {
        id: row.get("id"),
        uid: row.get::<i64, _>("uid") as u32,
        thread_id: row.get("thread_id"),
        subject: row.get("subject"),
        from: decode_list(row.get("from_list"))?,
        to: decode_list(row.get("to_list"))?,
        cc: decode_list(row.get("cc_list"))?,
        date: to_datetime(row.get("date")),
        snippet: row.get("snippet"),
        text: row.get("text"),
        in_reply_to: row.get("in_reply_to"),
        references: decode_list(row.get("references_list"))?,
        unread: row.get("unread"),
        labels: decode_list(row.get("labels"))?,
        attachments: decode_list(row.get("attachments"))?,
        hydrated: row.get("hydrated"),
    })
}

impl Cache {
    /// Insert or replace messages by id in one transaction.
    ///
    /// An envelope-only row never erases a hydrated body: once a row is
    /// hydrated its text, snippet and attachments survive later listings and
    /// every other column takes the new value.
    pub async fn upsert_messages(&self, messages: &[Message]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for message in messages {
            sqlx::query(
                r#"
                INSERT INTO messages
                (id, uid, thread_id, subject, from_list, to_list, cc_list, date, snippet, text, in_reply_to, references_list, unread, labels, attachments, hydrated)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    uid = excluded.uid,
                    thread_id = excluded.thread_id,
                    subject = excluded.subject,
                    from_list = excluded.from_list,
                    to_list = excluded.to_list,
                    cc_list = excluded.cc_list,
                    date = excluded.date,
                    snippet = CASE WHEN messages.hydrated AND NOT excluded.hydrated
                        THEN messages.snippet ELSE excluded.snippet END,
                    attachments = CASE WHEN messages.hydrated AND NOT excluded.hydrated
                        THEN messages.attachments ELSE excluded.attachments END,
                    text = CASE WHEN messages.hydrated AND NOT excluded.hydrated
                        THEN messages.text ELSE excluded.text END,
                    hydrated = messages.hydrated OR excluded.hydrated,
                    in_reply_to = excluded.in_reply_to,
                    references_list = excluded.references_list,
                    unread = excluded.unread,
                    labels = excluded.labels
                "#,
            )
            .bind(&message.id)
            .bind(message.uid as i64)
            .bind(&message.thread_id)
            .bind(&message.subject)
            .bind(encode_list(&message.from)?)
            .bind(encode_list(&message.to)?)
            .bind(encode_list(&message.cc)?)
            .bind(message.date.timestamp())
            .bind(&message.snippet)
            .bind(&message.text)
            .bind(&message.in_reply_to)
            .bind(encode_list(&message.references)?)
            .bind(message.unread)
            .bind(encode_list(&message.labels)?)
            .bind(encode_list(&message.attachments)?)
            .bind(message.hydrated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("Upserted {} messages", messages.len());
        Ok(())
    }

    #[cfg(test)]
    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_message).transpose()
    }

    /// Every cached member of a thread, oldest first.
    pub async fn messages_in_thread(&self, thread_id: &str) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE thread_id = ? ORDER BY date ASC, id ASC"
        ))
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::types::fixtures::{at, message};

    #[tokio::test]
    async fn test_upsert_same_id_keeps_one_row_with_latest_values() {
        let cache = Cache::open_in_memory().await.unwrap();

        let mut first = message("m1", "project x", at(1, 9));
        first.text = "first body".into();
        first.unread = true;
        cache.upsert_messages(&[first]).await.unwrap();

        let mut second = message("m1", "project x", at(1, 10));
        second.text = "second body".into();
        second.subject = "Re: Project X".into();
        second.unread = false;
        second.labels = vec!["\\Seen".into()];
        cache.upsert_messages(&[second.clone()]).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE id = 'm1'")
            .fetch_one(cache.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(cache.get_message("m1").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_envelope_upsert_preserves_hydrated_body() {
        let cache = Cache::open_in_memory().await.unwrap();

        let mut hydrated = message("m1", "project x", at(1, 9));
        hydrated.text = "full body text".into();
        hydrated.snippet = "full body text".into();
        hydrated.attachments = vec!["plan.pdf".into()];
        hydrated.hydrated = true;
        cache.upsert_messages(&[hydrated]).await.unwrap();

        let mut envelope = message("m1", "project x", at(1, 9));
        envelope.snippet = "full bo".into();
        envelope.unread = true;
        cache.upsert_messages(&[envelope]).await.unwrap();

        let stored = cache.get_message("m1").await.unwrap().unwrap();
        assert_eq!(stored.text, "full body text");
        assert_eq!(stored.snippet, "full body text");
        assert_eq!(stored.attachments, vec!["plan.pdf"]);
        assert!(stored.unread);
        assert!(stored.is_hydrated());
    }

    #[tokio::test]
    async fn test_empty_body_stays_hydrated_across_listings() {
        let cache = Cache::open_in_memory().await.unwrap();

        let mut hydrated = message("m1", "ping", at(1, 9));
        hydrated.snippet = String::new();
        hydrated.attachments = vec!["scan.pdf".into()];
        hydrated.hydrated = true;
        cache.upsert_messages(&[hydrated]).await.unwrap();

        cache
            .upsert_messages(&[message("m1", "ping", at(1, 9))])
            .await
            .unwrap();

        let stored = cache.get_message("m1").await.unwrap().unwrap();
        assert!(stored.is_hydrated());
        assert!(stored.text.is_empty());
        assert_eq!(stored.snippet, "");
        assert_eq!(stored.attachments, vec!["scan.pdf"]);
    }

    #[tokio::test]
    async fn test_messages_in_thread_oldest_first() {
        let cache = Cache::open_in_memory().await.unwrap();
        cache
            .upsert_messages(&[
                message("m3", "t", at(3, 0)),
                message("m1", "t", at(1, 0)),
                message("x1", "other", at(2, 0)),
                message("m2", "t", at(2, 0)),
            ])
            .await
            .unwrap();

        let ids: Vec<String> = cache
            .messages_in_thread("t")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn test_batch_is_atomic() {
        let cache = Cache::open_in_memory().await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON messages WHEN NEW.id = 'bad' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(cache.pool())
        .await
        .unwrap();

        let result = cache
            .upsert_messages(&[message("good", "t", at(1, 0)), message("bad", "t", at(1, 1))])
            .await;

        assert!(result.is_err());
        assert_eq!(cache.get_message("good").await.unwrap(), None);
    }
}
