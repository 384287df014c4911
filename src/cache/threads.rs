//! Thread upserts, listing and the paged thread view.

use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::messages::{MESSAGE_COLUMNS, row_to_message};
use super::{Cache, decode_list, encode_list, to_datetime};
use crate::error::Result;
use crate::mail::types::{Message, Thread};

const THREAD_COLUMNS: &str =
    "id, subject, participants, snippet, date, unread, message_ids, has_attachments";

/// A thread with a window of its most recent messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadPage {
    pub thread: Thread,
    /// Oldest to newest
    pub messages: Vec<Message>,
    /// All cached members, may exceed `messages.len()`
    pub total_messages: usize,
}

fn row_to_thread(row: SqliteRow) -> Result<Thread> {
    Ok(Thread {
        id: row.get("id"),
        subject: row.get("subject"),
        participants: decode_list(row.get("participants"))?,
        snippet: row.get("snippet"),
        date: to_datetime(row.get("date")),
        unread: row.get("unread"),
        message_ids: decode_list(row.get("message_ids"))?,
        has_attachments: row.get("has_attachments"),
    })
}

impl Cache {
    /// Insert or replace threads by id in one transaction.
    ///
    /// Replacement is wholesale: `participants` and `message_ids` become
    /// exactly what the caller aggregated.
    pub async fn upsert_threads(&self, threads: &[Thread]) -> Result<()> {
        if threads.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for thread in threads {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO threads
                (id, subject, participants, snippet, date, unread, message_ids, has_attachments)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&thread.id)
            .bind(&thread.subject)
            .bind(encode_list(&thread.participants)?)
            .bind(&thread.snippet)
            .bind(thread.date.timestamp())
            .bind(thread.unread)
            .bind(encode_list(&thread.message_ids)?)
            .bind(thread.has_attachments)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("Upserted {} threads", threads.len());
        Ok(())
    }

    /// Up to `limit` of the threads named in `ids`, newest first.
    pub async fn list_threads(&self, ids: &[String], limit: usize) -> Result<Vec<Thread>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads \
             WHERE id IN (SELECT value FROM json_each(?)) \
             ORDER BY date DESC, id ASC LIMIT ?"
        ))
        .bind(encode_list(ids)?)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_thread).collect()
    }

    pub async fn get_thread_record(&self, thread_id: &str) -> Result<Option<Thread>> {
        let row = sqlx::query(&format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?"))
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_thread).transpose()
    }

    /// The thread, its `limit` most recent messages shown oldest to newest,
    /// and the full member count.
    pub async fn get_thread(&self, thread_id: &str, limit: usize) -> Result<Option<ThreadPage>> {
        let Some(thread) = self.get_thread_record(thread_id).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE thread_id = ? \
             ORDER BY date DESC, id DESC LIMIT ?"
        ))
        .bind(thread_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut messages = rows
            .into_iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();

        let total: i64 = sqlx::query("SELECT COUNT(*) AS total FROM messages WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await?
            .get("total");

        Ok(Some(ThreadPage {
            thread,
            messages,
            total_messages: total as usize,
        }))
    }
}
