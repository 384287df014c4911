//! Database schema initialization.

use sqlx::SqlitePool;

use crate::error::Result;

/// Create tables and indexes. Idempotent.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        -- List-typed columns hold JSON arrays; dates are unix seconds
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            uid INTEGER NOT NULL,
            thread_id TEXT NOT NULL,
            subject TEXT NOT NULL DEFAULT '',
            from_list TEXT NOT NULL DEFAULT '[]',
            to_list TEXT NOT NULL DEFAULT '[]',
            cc_list TEXT NOT NULL DEFAULT '[]',
            date INTEGER NOT NULL,
            snippet TEXT NOT NULL DEFAULT '',
            text TEXT NOT NULL DEFAULT '',
            in_reply_to TEXT,
            references_list TEXT NOT NULL DEFAULT '[]',
            unread INTEGER NOT NULL DEFAULT 0,
            labels TEXT NOT NULL DEFAULT '[]',
            attachments TEXT NOT NULL DEFAULT '[]',
            hydrated INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread_date ON messages(thread_id, date DESC);
        "#,
    )
    .execute(pool)
    .await?;

    // Stores created before hydration was tracked: a stored body counts as hydrated
    let added = sqlx::query("ALTER TABLE messages ADD COLUMN hydrated INTEGER NOT NULL DEFAULT 0")
        .execute(pool)
        .await
        .is_ok(); // Fails if the column already exists
    if added {
        sqlx::query("UPDATE messages SET hydrated = 1 WHERE text <> ''")
            .execute(pool)
            .await?;
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS threads (
            id TEXT PRIMARY KEY,
            subject TEXT NOT NULL DEFAULT '',
            participants TEXT NOT NULL DEFAULT '[]',
            snippet TEXT NOT NULL DEFAULT '',
            date INTEGER NOT NULL,
            unread INTEGER NOT NULL DEFAULT 0,
            message_ids TEXT NOT NULL DEFAULT '[]',
            has_attachments INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_threads_date ON threads(date DESC);
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS summaries (
            thread_id TEXT PRIMARY KEY,
            summary TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
