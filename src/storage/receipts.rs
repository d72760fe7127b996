use chrono::Utc;

use super::schema::Database;
use super::types::{DatabaseError, FeedEntry};

impl Database {
    // ========================================================================
    // Sent Receipt Operations
    // ========================================================================

    /// Whether an entry was already delivered to a subscription.
    pub async fn is_entry_sent(
        &self,
        subscription_id: i64,
        entry_id: i64,
    ) -> Result<bool, DatabaseError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sent_receipts WHERE subscription_id = ? AND entry_id = ?",
        )
        .bind(subscription_id)
        .bind(entry_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0 > 0)
    }

    /// Records a delivery. Written only after the adapter acknowledged the
    /// send. Double inserts are ignored, so `(subscription, entry)` holds at
    /// most one receipt.
    pub async fn insert_sent_receipt(
        &self,
        subscription_id: i64,
        entry_id: i64,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().timestamp();
        sqlx::query(
            "INSERT OR IGNORE INTO sent_receipts (subscription_id, entry_id, sent_at) \
             VALUES (?, ?, ?)",
        )
        .bind(subscription_id)
        .bind(entry_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The core dispatch query: entries of `feed_id` with no receipt for
    /// `subscription_id`, newest publication first, undated entries last,
    /// capped at `limit`.
    pub async fn list_undelivered_entries(
        &self,
        subscription_id: i64,
        feed_id: i64,
        limit: i64,
    ) -> Result<Vec<FeedEntry>, DatabaseError> {
        let entries = sqlx::query_as::<_, FeedEntry>(
            r#"
            SELECT id, feed_id, guid, title, link, summary, content, author,
                   published_at, image_url, title_translated, summary_translated,
                   translation_language, is_sent, created_at, updated_at
            FROM entries
            WHERE feed_id = ?
              AND id NOT IN (SELECT entry_id FROM sent_receipts WHERE subscription_id = ?)
            ORDER BY (published_at IS NULL), published_at DESC, id DESC
            LIMIT ?
        "#,
        )
        .bind(feed_id)
        .bind(subscription_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Janitor: deletes receipts written before `cutoff`.
    pub async fn delete_receipts_older_than(&self, cutoff: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM sent_receipts WHERE sent_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::NewEntry;

    async fn seeded_db() -> (Database, i64, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let (feed, _) = db.get_or_create_feed("https://example.org/rss").await.unwrap();
        let (sub, _) = db
            .get_or_create_subscription("discord", "1", "42", feed.id, None)
            .await
            .unwrap();
        (db, feed.id, sub.id)
    }

    fn entry(guid: &str, published_at: Option<i64>) -> NewEntry {
        NewEntry {
            guid: guid.to_string(),
            title: guid.to_string(),
            link: format!("https://example.org/{}", guid),
            summary: None,
            content: None,
            author: None,
            published_at,
            image_url: None,
        }
    }

    #[tokio::test]
    async fn test_undelivered_excludes_receipted_entries() {
        let (db, feed_id, sub_id) = seeded_db().await;
        db.insert_entries(feed_id, &[entry("a", Some(1)), entry("b", Some(2)), entry("c", Some(3))])
            .await
            .unwrap();

        let pending = db.list_undelivered_entries(sub_id, feed_id, 10).await.unwrap();
        assert_eq!(pending.len(), 3);
        // newest first
        assert_eq!(pending[0].guid, "c");

        db.insert_sent_receipt(sub_id, pending[0].id).await.unwrap();

        let pending = db.list_undelivered_entries(sub_id, feed_id, 10).await.unwrap();
        let guids: Vec<&str> = pending.iter().map(|e| e.guid.as_str()).collect();
        assert_eq!(guids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_receipt_is_unique_per_pair() {
        let (db, feed_id, sub_id) = seeded_db().await;
        db.insert_entries(feed_id, &[entry("a", Some(1))]).await.unwrap();
        let e = db.get_entry(feed_id, "a").await.unwrap().unwrap();

        db.insert_sent_receipt(sub_id, e.id).await.unwrap();
        db.insert_sent_receipt(sub_id, e.id).await.unwrap();

        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sent_receipts WHERE subscription_id = ? AND entry_id = ?",
        )
        .bind(sub_id)
        .bind(e.id)
        .fetch_one(&db.pool)
        .await
        .unwrap();
        assert_eq!(count.0, 1);
        assert!(db.is_entry_sent(sub_id, e.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_receipts_are_per_subscription() {
        let (db, feed_id, sub_id) = seeded_db().await;
        let (other_sub, _) = db
            .get_or_create_subscription("telegram", "1", "chat", feed_id, None)
            .await
            .unwrap();

        db.insert_entries(feed_id, &[entry("a", Some(1))]).await.unwrap();
        let e = db.get_entry(feed_id, "a").await.unwrap().unwrap();
        db.insert_sent_receipt(sub_id, e.id).await.unwrap();

        assert!(db
            .list_undelivered_entries(sub_id, feed_id, 10)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            db.list_undelivered_entries(other_sub.id, feed_id, 10)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_delete_receipts_older_than() {
        let (db, feed_id, sub_id) = seeded_db().await;
        db.insert_entries(feed_id, &[entry("a", Some(1))]).await.unwrap();
        let e = db.get_entry(feed_id, "a").await.unwrap().unwrap();
        db.insert_sent_receipt(sub_id, e.id).await.unwrap();

        let deleted = db
            .delete_receipts_older_than(Utc::now().timestamp() + 10)
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        // With the receipt gone the entry is eligible again
        assert_eq!(
            db.list_undelivered_entries(sub_id, feed_id, 10).await.unwrap().len(),
            1
        );
    }
}
