//! Janitor: periodic retention cleanup.
//!
//! Runs on its own schedule, independent of the dispatch cycle. Entries
//! and receipts past the retention window are deleted; an entry that never
//! managed to send before its purge is simply dropped; that is the
//! implicit retry bound.

use chrono::Utc;

use crate::storage::Database;

/// Statistics for one cleanup run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupResult {
    pub entries_deleted: u64,
    pub receipts_deleted: u64,
}

pub struct Janitor {
    db: Database,
    retention_days: u64,
}

impl Janitor {
    pub fn new(db: Database, retention_days: u64) -> Self {
        Self { db, retention_days }
    }

    /// Deletes entries and receipts older than the retention window.
    /// Failures are logged and leave the rest of the run untouched.
    pub async fn cleanup_once(&self) -> CleanupResult {
        let cutoff = Utc::now().timestamp() - (self.retention_days as i64) * 24 * 3600;
        let mut result = CleanupResult::default();

        match self.db.delete_entries_older_than(cutoff).await {
            Ok(deleted) => result.entries_deleted = deleted,
            Err(e) => tracing::warn!(error = %e, "Entry cleanup failed"),
        }

        match self.db.delete_receipts_older_than(cutoff).await {
            Ok(deleted) => result.receipts_deleted = deleted,
            Err(e) => tracing::warn!(error = %e, "Receipt cleanup failed"),
        }

        tracing::info!(
            entries_deleted = result.entries_deleted,
            receipts_deleted = result.receipts_deleted,
            retention_days = self.retention_days,
            "Cleanup complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NewEntry;

    #[tokio::test]
    async fn test_cleanup_purges_old_rows_only() {
        let db = Database::open(":memory:").await.unwrap();
        let (feed, _) = db.get_or_create_feed("https://example.org/rss").await.unwrap();
        let (sub, _) = db
            .get_or_create_subscription("discord", "1", "42", feed.id, None)
            .await
            .unwrap();

        db.insert_entries(
            feed.id,
            &[NewEntry {
                guid: "g".into(),
                title: "t".into(),
                link: "https://example.org/g".into(),
                summary: None,
                content: None,
                author: None,
                published_at: Some(1),
                image_url: None,
            }],
        )
        .await
        .unwrap();
        let entry = db.get_entry(feed.id, "g").await.unwrap().unwrap();
        db.insert_sent_receipt(sub.id, entry.id).await.unwrap();

        // Everything was created just now, so a 7-day window keeps it all
        let kept = Janitor::new(db.clone(), 7).cleanup_once().await;
        assert_eq!(kept, CleanupResult::default());

        // Backdate the rows, then the same window purges them
        sqlx::query("UPDATE entries SET created_at = 1")
            .execute(&db.pool)
            .await
            .unwrap();
        sqlx::query("UPDATE sent_receipts SET sent_at = 1")
            .execute(&db.pool)
            .await
            .unwrap();

        let purged = Janitor::new(db.clone(), 7).cleanup_once().await;
        assert_eq!(purged.entries_deleted, 1);
        // The receipt row went with the entry cascade
        assert!(db.list_recent_entries(feed.id, 10).await.unwrap().is_empty());
    }
}
