//! Summary storage: moka in front, SQLite behind. No versioning.

use sqlx::Row;

use super::Cache;
use crate::ai::Summary;
use crate::error::Result;

impl Cache {
    pub async fn get_summary(&self, thread_id: &str) -> Result<Option<Summary>> {
        if let Some(summary) = self.summary_cache.get(thread_id).await {
            return Ok(Some(summary));
        }

        let row = sqlx::query("SELECT summary FROM summaries WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let summary: Summary = serde_json::from_str(row.get("summary"))?;
        self.summary_cache
            .insert(thread_id.to_string(), summary.clone())
            .await;
        Ok(Some(summary))
    }

    pub async fn save_summary(&self, thread_id: &str, summary: &Summary) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO summaries (thread_id, summary, updated_at) VALUES (?, ?, ?)",
        )
        .bind(thread_id)
        .bind(serde_json::to_string(summary)?)
        .bind(summary.updated_at.timestamp())
        .execute(&self.pool)
        .await?;

        self.summary_cache
            .insert(thread_id.to_string(), summary.clone())
            .await;
        Ok(())
    }
}
