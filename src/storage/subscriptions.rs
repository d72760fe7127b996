use chrono::Utc;

use super::schema::Database;
use super::types::{DatabaseError, Subscription, SubscriptionSettings};

const SUBSCRIPTION_COLUMNS: &str = "id, platform, platform_user_id, platform_channel_id, \
     platform_guild_id, feed_id, is_active, translate, target_language, show_summary, \
     show_image, created_at, updated_at";

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    pub async fn get_subscription(
        &self,
        platform: &str,
        channel_id: &str,
        feed_id: i64,
    ) -> Result<Option<Subscription>, DatabaseError> {
        let sub = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions \
             WHERE platform = ? AND platform_channel_id = ? AND feed_id = ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(platform)
        .bind(channel_id)
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    pub async fn get_subscription_by_id(
        &self,
        subscription_id: i64,
    ) -> Result<Option<Subscription>, DatabaseError> {
        let sub = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE id = ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sub)
    }

    /// All subscriptions on one channel, active or not.
    pub async fn list_channel_subscriptions(
        &self,
        platform: &str,
        channel_id: &str,
    ) -> Result<Vec<Subscription>, DatabaseError> {
        let subs = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions \
             WHERE platform = ? AND platform_channel_id = ? ORDER BY id",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(platform)
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    pub async fn list_feed_subscriptions(
        &self,
        feed_id: i64,
    ) -> Result<Vec<Subscription>, DatabaseError> {
        let subs = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE feed_id = ? ORDER BY id",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    /// Every active subscription, in stable id order: the dispatch
    /// worklist.
    pub async fn list_active_subscriptions(&self) -> Result<Vec<Subscription>, DatabaseError> {
        let subs = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {} FROM subscriptions WHERE is_active = 1 ORDER BY id",
            SUBSCRIPTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(subs)
    }

    /// Returns the `(platform, channel, feed)` binding, creating it when
    /// absent and reactivating it when it exists but was deactivated.
    ///
    /// The boolean is `true` only for a newly created row.
    pub async fn get_or_create_subscription(
        &self,
        platform: &str,
        user_id: &str,
        channel_id: &str,
        feed_id: i64,
        guild_id: Option<&str>,
    ) -> Result<(Subscription, bool), DatabaseError> {
        if let Some(existing) = self.get_subscription(platform, channel_id, feed_id).await? {
            if !existing.is_active {
                let now = Utc::now().timestamp();
                sqlx::query("UPDATE subscriptions SET is_active = 1, updated_at = ? WHERE id = ?")
                    .bind(now)
                    .bind(existing.id)
                    .execute(&self.pool)
                    .await?;
                let reactivated = Subscription {
                    is_active: true,
                    updated_at: now,
                    ..existing
                };
                return Ok((reactivated, false));
            }
            return Ok((existing, false));
        }

        let now = Utc::now().timestamp();
        let sub = sqlx::query_as::<_, Subscription>(&format!(
            "INSERT INTO subscriptions \
             (platform, platform_user_id, platform_channel_id, platform_guild_id, feed_id, \
              created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {}",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(platform)
        .bind(user_id)
        .bind(channel_id)
        .bind(guild_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok((sub, true))
    }

    /// Applies the non-`None` fields of `settings`. Returns whether a row
    /// was updated.
    pub async fn update_subscription_settings(
        &self,
        subscription_id: i64,
        settings: &SubscriptionSettings,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE subscriptions SET
                translate = COALESCE(?, translate),
                target_language = COALESCE(?, target_language),
                show_summary = COALESCE(?, show_summary),
                show_image = COALESCE(?, show_image),
                updated_at = ?
            WHERE id = ?
        "#,
        )
        .bind(settings.translate)
        .bind(&settings.target_language)
        .bind(settings.show_summary)
        .bind(settings.show_image)
        .bind(now)
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn deactivate_subscription(
        &self,
        subscription_id: i64,
    ) -> Result<bool, DatabaseError> {
        let now = Utc::now().timestamp();
        let result =
            sqlx::query("UPDATE subscriptions SET is_active = 0, updated_at = ? WHERE id = ?")
                .bind(now)
                .bind(subscription_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes the binding outright. Receipts cascade.
    pub async fn delete_subscription(
        &self,
        platform: &str,
        channel_id: &str,
        feed_id: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM subscriptions \
             WHERE platform = ? AND platform_channel_id = ? AND feed_id = ?",
        )
        .bind(platform)
        .bind(channel_id)
        .bind(feed_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of active subscriptions on a channel, for quota enforcement.
    pub async fn count_channel_subscriptions(
        &self,
        platform: &str,
        channel_id: &str,
    ) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM subscriptions \
             WHERE platform = ? AND platform_channel_id = ? AND is_active = 1",
        )
        .bind(platform)
        .bind(channel_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db_with_feed() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let (feed, _) = db.get_or_create_feed("https://example.org/rss").await.unwrap();
        (db, feed.id)
    }

    #[tokio::test]
    async fn test_get_or_create_subscription_idempotent() {
        let (db, feed_id) = test_db_with_feed().await;

        let (first, created) = db
            .get_or_create_subscription("discord", "1", "42", feed_id, Some("g1"))
            .await
            .unwrap();
        assert!(created);
        assert!(first.is_active);

        let (second, created) = db
            .get_or_create_subscription("discord", "1", "42", feed_id, Some("g1"))
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let all = db.list_channel_subscriptions("discord", "42").await.unwrap();
        assert_eq!(all.len(), 1);

        let by_feed = db.list_feed_subscriptions(feed_id).await.unwrap();
        assert_eq!(by_feed.len(), 1);
        assert_eq!(by_feed[0].id, first.id);
    }

    #[tokio::test]
    async fn test_reactivation_is_not_a_new_row() {
        let (db, feed_id) = test_db_with_feed().await;
        let (sub, _) = db
            .get_or_create_subscription("telegram", "u", "chat", feed_id, None)
            .await
            .unwrap();

        db.deactivate_subscription(sub.id).await.unwrap();
        assert!(db.list_active_subscriptions().await.unwrap().is_empty());

        let (again, created) = db
            .get_or_create_subscription("telegram", "u", "chat", feed_id, None)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.id, sub.id);
        assert!(again.is_active);
        assert_eq!(db.list_active_subscriptions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_settings_partial() {
        let (db, feed_id) = test_db_with_feed().await;
        let (sub, _) = db
            .get_or_create_subscription("discord", "1", "42", feed_id, None)
            .await
            .unwrap();

        let updated = db
            .update_subscription_settings(
                sub.id,
                &SubscriptionSettings {
                    translate: Some(true),
                    target_language: Some("ja".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let sub = db.get_subscription_by_id(sub.id).await.unwrap().unwrap();
        assert!(sub.translate);
        assert_eq!(sub.target_language, "ja");
        // untouched fields keep their defaults
        assert!(sub.show_summary);
        assert!(sub.show_image);
    }

    #[tokio::test]
    async fn test_delete_subscription() {
        let (db, feed_id) = test_db_with_feed().await;
        db.get_or_create_subscription("discord", "1", "42", feed_id, None)
            .await
            .unwrap();

        assert!(db.delete_subscription("discord", "42", feed_id).await.unwrap());
        assert!(!db.delete_subscription("discord", "42", feed_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_count_ignores_inactive() {
        let (db, feed_id) = test_db_with_feed().await;
        let (feed2, _) = db.get_or_create_feed("https://other.example/rss").await.unwrap();

        let (sub, _) = db
            .get_or_create_subscription("discord", "1", "42", feed_id, None)
            .await
            .unwrap();
        db.get_or_create_subscription("discord", "1", "42", feed2.id, None)
            .await
            .unwrap();

        assert_eq!(db.count_channel_subscriptions("discord", "42").await.unwrap(), 2);

        db.deactivate_subscription(sub.id).await.unwrap();
        assert_eq!(db.count_channel_subscriptions("discord", "42").await.unwrap(), 1);
    }
}
