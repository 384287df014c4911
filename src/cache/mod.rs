//! SQLite store for messages, threads and summaries.
//!
//! This module is split into:
//! - `mod.rs` - Cache struct and connection pool
//! - `schema.rs` - table creation
//! - `messages.rs` - message upserts and per-thread reads
//! - `threads.rs` - thread upserts, listing and the paged thread view
//! - `summaries.rs` - summary rows with a moka hot cache in front

mod messages;
mod schema;
mod summaries;
mod threads;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::ai::Summary;
use crate::constants::{CACHE_POOL_SIZE, SUMMARY_HOT_CACHE_CAPACITY};

pub use threads::ThreadPage;

type SummaryCache = moka::future::Cache<String, Summary>;

/// Exclusive owner of persisted records. Cheap to clone.
#[derive(Clone)]
pub struct Cache {
    pool: SqlitePool,
    /// Summaries never change once written, so no TTL
    summary_cache: SummaryCache,
}

impl Cache {
    fn create_summary_cache() -> SummaryCache {
        moka::future::Cache::builder()
            .max_capacity(SUMMARY_HOT_CACHE_CAPACITY)
            .build()
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let db_url = format!("sqlite:{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(CACHE_POOL_SIZE)
            .connect_with(options)
            .await
            .context("Failed to create connection pool")?;

        schema::init_schema(&pool)
            .await
            .context("Failed to initialize cache schema")?;

        tracing::info!("Cache opened at {}", path.display());
        Ok(Self {
            pool,
            summary_cache: Self::create_summary_cache(),
        })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // One connection, otherwise every connection gets its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to create in-memory connection pool")?;

        schema::init_schema(&pool).await?;

        Ok(Self {
            pool,
            summary_cache: Self::create_summary_cache(),
        })
    }

    #[cfg(test)]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// JSON text for list-typed columns.
fn encode_list(items: &[String]) -> crate::error::Result<String> {
    Ok(serde_json::to_string(items)?)
}

fn decode_list(column: &str) -> crate::error::Result<Vec<String>> {
    if column.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(column)?)
}

fn to_datetime(ts: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(ts, 0).unwrap_or_default()
}
