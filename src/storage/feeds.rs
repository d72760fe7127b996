use chrono::Utc;

use super::schema::Database;
use super::types::{DatabaseError, Feed};
use crate::feed::parser::FeedMeta;

const FEED_COLUMNS: &str = "id, url, title, description, site_url, is_active, error_count, \
     last_error, etag, last_modified, last_fetched_at, last_successful_fetch_at, \
     created_at, updated_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {} FROM feeds WHERE id = ?",
            FEED_COLUMNS
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    pub async fn get_feed_by_url(&self, url: &str) -> Result<Option<Feed>, DatabaseError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {} FROM feeds WHERE url = ?",
            FEED_COLUMNS
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// All feeds still eligible for fetching.
    pub async fn list_active_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {} FROM feeds WHERE is_active = 1 ORDER BY id",
            FEED_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// Active feeds that were never fetched or whose last fetch is older
    /// than `interval_minutes`.
    pub async fn list_feeds_needing_fetch(
        &self,
        interval_minutes: i64,
    ) -> Result<Vec<Feed>, DatabaseError> {
        let cutoff = Utc::now().timestamp() - interval_minutes * 60;
        let feeds = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {} FROM feeds \
             WHERE is_active = 1 AND (last_fetched_at IS NULL OR last_fetched_at < ?) \
             ORDER BY id",
            FEED_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// Inserts a bare feed row for a URL. Metadata arrives with the first
    /// successful fetch.
    pub async fn insert_feed(&self, url: &str) -> Result<Feed, DatabaseError> {
        let now = Utc::now().timestamp();
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "INSERT INTO feeds (url, created_at, updated_at) VALUES (?, ?, ?) RETURNING {}",
            FEED_COLUMNS
        ))
        .bind(url)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Returns the feed for `url`, creating it when absent.
    ///
    /// The boolean is `true` when a new row was created.
    pub async fn get_or_create_feed(&self, url: &str) -> Result<(Feed, bool), DatabaseError> {
        if let Some(existing) = self.get_feed_by_url(url).await? {
            return Ok((existing, false));
        }
        let feed = self.insert_feed(url).await?;
        Ok((feed, true))
    }

    /// Records a successful fetch: stores fresh metadata and validators,
    /// clears the error state, and stamps both fetch timestamps.
    ///
    /// Metadata and validator columns keep their previous value when the
    /// response did not carry a replacement.
    pub async fn update_feed_success(
        &self,
        feed_id: i64,
        meta: &FeedMeta,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE feeds SET
                title = COALESCE(?, title),
                description = COALESCE(?, description),
                site_url = COALESCE(?, site_url),
                etag = COALESCE(?, etag),
                last_modified = COALESCE(?, last_modified),
                error_count = 0,
                last_error = NULL,
                last_fetched_at = ?,
                last_successful_fetch_at = ?,
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(&meta.title)
        .bind(&meta.description)
        .bind(&meta.site_url)
        .bind(etag)
        .bind(last_modified)
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Stamps a fetch that returned 304: only the fetch timestamps move,
    /// validators and error state are untouched... except that a 304 is a
    /// successful fetch, so the error count resets.
    pub async fn update_feed_not_modified(&self, feed_id: i64) -> Result<(), DatabaseError> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "UPDATE feeds SET error_count = 0, last_error = NULL, \
             last_fetched_at = ?, last_successful_fetch_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(now)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a failed fetch.
    ///
    /// Increments `error_count`, stores the message, and deactivates the
    /// feed once the count reaches
    /// [`Database::ERROR_DEACTIVATION_THRESHOLD`]. Returns the new count
    /// and whether the feed is still active.
    pub async fn mark_feed_error(
        &self,
        feed_id: i64,
        error: &str,
    ) -> Result<(i64, bool), DatabaseError> {
        let now = Utc::now().timestamp();
        let row: (i64, bool) = sqlx::query_as(
            r#"
            UPDATE feeds SET
                error_count = error_count + 1,
                last_error = ?,
                last_fetched_at = ?,
                updated_at = ?,
                is_active = CASE WHEN error_count + 1 >= ? THEN 0 ELSE is_active END
            WHERE id = ?
            RETURNING error_count, is_active
        "#,
        )
        .bind(error)
        .bind(now)
        .bind(now)
        .bind(Self::ERROR_DEACTIVATION_THRESHOLD)
        .bind(feed_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Deletes a feed. Entries, subscriptions, and receipts cascade.
    pub async fn delete_feed(&self, feed_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feeds WHERE id = ?")
            .bind(feed_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_feed_is_idempotent() {
        let db = test_db().await;
        let (feed, created) = db.get_or_create_feed("https://example.org/rss").await.unwrap();
        assert!(created);

        let (again, created) = db.get_or_create_feed("https://example.org/rss").await.unwrap();
        assert!(!created);
        assert_eq!(feed.id, again.id);
    }

    #[tokio::test]
    async fn test_mark_error_deactivates_at_threshold() {
        let db = test_db().await;
        let (feed, _) = db.get_or_create_feed("https://example.org/rss").await.unwrap();

        for i in 1..Database::ERROR_DEACTIVATION_THRESHOLD {
            let (count, active) = db.mark_feed_error(feed.id, "HTTP 500").await.unwrap();
            assert_eq!(count, i);
            assert!(active);
        }

        let (count, active) = db.mark_feed_error(feed.id, "HTTP 500").await.unwrap();
        assert_eq!(count, Database::ERROR_DEACTIVATION_THRESHOLD);
        assert!(!active);

        let active_feeds = db.list_active_feeds().await.unwrap();
        assert!(active_feeds.is_empty());
    }

    #[tokio::test]
    async fn test_success_resets_error_count() {
        let db = test_db().await;
        let (feed, _) = db.get_or_create_feed("https://example.org/rss").await.unwrap();

        for _ in 0..5 {
            db.mark_feed_error(feed.id, "timeout").await.unwrap();
        }

        db.update_feed_success(feed.id, &FeedMeta::default(), Some("\"v2\""), None)
            .await
            .unwrap();

        let feed = db.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(feed.error_count, 0);
        assert_eq!(feed.last_error, None);
        assert_eq!(feed.etag.as_deref(), Some("\"v2\""));
        assert!(feed.last_successful_fetch_at.is_some());
    }

    #[tokio::test]
    async fn test_success_keeps_previous_metadata_when_absent() {
        let db = test_db().await;
        let (feed, _) = db.get_or_create_feed("https://example.org/rss").await.unwrap();

        let meta = FeedMeta {
            title: Some("Title".into()),
            description: None,
            site_url: None,
        };
        db.update_feed_success(feed.id, &meta, Some("\"v1\""), None)
            .await
            .unwrap();

        // Second fetch carries no title and no etag; both must survive
        db.update_feed_success(feed.id, &FeedMeta::default(), None, None)
            .await
            .unwrap();

        let feed = db.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(feed.title.as_deref(), Some("Title"));
        assert_eq!(feed.etag.as_deref(), Some("\"v1\""));
    }

    #[tokio::test]
    async fn test_list_feeds_needing_fetch() {
        let db = test_db().await;
        let (never_fetched, _) = db.get_or_create_feed("https://a.example/rss").await.unwrap();
        let (fresh, _) = db.get_or_create_feed("https://b.example/rss").await.unwrap();

        db.update_feed_success(fresh.id, &FeedMeta::default(), None, None)
            .await
            .unwrap();

        let due = db.list_feeds_needing_fetch(60).await.unwrap();
        let ids: Vec<i64> = due.iter().map(|f| f.id).collect();
        assert!(ids.contains(&never_fetched.id));
        assert!(!ids.contains(&fresh.id));
    }
}
