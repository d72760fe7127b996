use chrono::Utc;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{DatabaseError, FeedEntry, NewEntry};

const ENTRY_COLUMNS: &str = "id, feed_id, guid, title, link, summary, content, author, \
     published_at, image_url, title_translated, summary_translated, translation_language, \
     is_sent, created_at, updated_at";

impl Database {
    // ========================================================================
    // Entry Operations
    // ========================================================================

    pub async fn get_entry(
        &self,
        feed_id: i64,
        guid: &str,
    ) -> Result<Option<FeedEntry>, DatabaseError> {
        let entry = sqlx::query_as::<_, FeedEntry>(&format!(
            "SELECT {} FROM entries WHERE feed_id = ? AND guid = ?",
            ENTRY_COLUMNS
        ))
        .bind(feed_id)
        .bind(guid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    /// Bulk-inserts entries, silently skipping `(feed_id, guid)` pairs that
    /// already exist. Returns the number of rows actually inserted.
    ///
    /// Uses batched `INSERT OR IGNORE` with `changes()` so duplicates cost
    /// nothing and the count needs no table scan. Batch size of 50 keeps the
    /// bind count well under SQLite's 999 parameter limit.
    pub async fn insert_entries(
        &self,
        feed_id: i64,
        entries: &[NewEntry],
    ) -> Result<usize, DatabaseError> {
        if entries.is_empty() {
            return Ok(0);
        }

        const BATCH_SIZE: usize = 50;
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut total_inserted: usize = 0;

        for chunk in entries.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO entries \
                 (feed_id, guid, title, link, summary, content, author, published_at, \
                  image_url, created_at, updated_at) ",
            );

            builder.push_values(chunk, |mut b, entry| {
                b.push_bind(feed_id)
                    .push_bind(&entry.guid)
                    .push_bind(&entry.title)
                    .push_bind(&entry.link)
                    .push_bind(&entry.summary)
                    .push_bind(&entry.content)
                    .push_bind(&entry.author)
                    .push_bind(entry.published_at)
                    .push_bind(&entry.image_url)
                    .push_bind(now)
                    .push_bind(now);
            });

            builder.build().execute(&mut *tx).await?;

            let changes: (i64,) = sqlx::query_as("SELECT changes()")
                .fetch_one(&mut *tx)
                .await?;
            total_inserted += changes.0 as usize;
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Recent entries for a feed, newest publication first, undated entries
    /// last.
    pub async fn list_recent_entries(
        &self,
        feed_id: i64,
        limit: i64,
    ) -> Result<Vec<FeedEntry>, DatabaseError> {
        let entries = sqlx::query_as::<_, FeedEntry>(&format!(
            "SELECT {} FROM entries WHERE feed_id = ? \
             ORDER BY (published_at IS NULL), published_at DESC, id DESC LIMIT ?",
            ENTRY_COLUMNS
        ))
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Entries never flagged by the legacy per-feed `is_sent` hint.
    ///
    /// Dispatch does not use this (per-subscription receipts are
    /// authoritative) but the hint column is still queryable.
    pub async fn list_unsent_entries(
        &self,
        feed_id: i64,
        limit: i64,
    ) -> Result<Vec<FeedEntry>, DatabaseError> {
        let entries = sqlx::query_as::<_, FeedEntry>(&format!(
            "SELECT {} FROM entries WHERE feed_id = ? AND is_sent = 0 \
             ORDER BY (published_at IS NULL), published_at DESC, id DESC LIMIT ?",
            ENTRY_COLUMNS
        ))
        .bind(feed_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Caches a translation on an entry. The stored language tells future
    /// cycles whether the cache applies to their target.
    pub async fn set_entry_translation(
        &self,
        entry_id: i64,
        title_translated: &str,
        summary_translated: Option<&str>,
        language: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "UPDATE entries SET title_translated = ?, summary_translated = ?, \
             translation_language = ?, updated_at = ? WHERE id = ?",
        )
        .bind(title_translated)
        .bind(summary_translated)
        .bind(language)
        .bind(now)
        .bind(entry_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Janitor: deletes entries created before `cutoff`. Receipts cascade.
    pub async fn delete_entries_older_than(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM entries WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
