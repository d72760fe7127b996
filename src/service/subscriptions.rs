//! Subscription service: CRUD over channel ↔ feed bindings.

use std::sync::Arc;

use anyhow::Result;

use crate::storage::{Database, Feed, Subscription, SubscriptionSettings};

use super::feeds::FeedService;

/// Result of a subscribe operation.
#[derive(Debug)]
pub struct SubscribeResult {
    pub success: bool,
    pub subscription: Option<Subscription>,
    pub feed: Option<Feed>,
    pub message: String,
    /// `true` only when a brand-new binding was created
    pub is_new: bool,
}

impl SubscribeResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            subscription: None,
            feed: None,
            message: message.into(),
            is_new: false,
        }
    }
}

/// Result of an unsubscribe operation.
#[derive(Debug)]
pub struct UnsubscribeResult {
    pub success: bool,
    pub message: String,
}

/// A subscription with its feed eager-loaded, for listing commands.
#[derive(Debug)]
pub struct ChannelSubscription {
    pub subscription: Subscription,
    pub feed: Feed,
}

pub struct SubscriptionService {
    db: Database,
    feed_service: Arc<FeedService>,
    /// 0 = unlimited
    max_feeds_per_channel: u64,
}

impl SubscriptionService {
    pub fn new(db: Database, feed_service: Arc<FeedService>, max_feeds_per_channel: u64) -> Self {
        Self {
            db,
            feed_service,
            max_feeds_per_channel,
        }
    }

    /// Subscribes a channel to a feed, creating the feed when needed.
    ///
    /// Enforces the per-channel quota before touching anything. An existing
    /// inactive binding is reactivated rather than duplicated.
    pub async fn subscribe(
        &self,
        platform: &str,
        user_id: &str,
        channel_id: &str,
        feed_url: &str,
        guild_id: Option<&str>,
    ) -> Result<SubscribeResult> {
        if self.max_feeds_per_channel > 0 {
            let count = self
                .db
                .count_channel_subscriptions(platform, channel_id)
                .await?;
            if count >= self.max_feeds_per_channel as i64 {
                return Ok(SubscribeResult::failure(format!(
                    "Maximum feeds ({}) reached",
                    self.max_feeds_per_channel
                )));
            }
        }

        let add_result = self.feed_service.add_feed(feed_url).await?;
        if !add_result.success {
            return Ok(SubscribeResult::failure(add_result.message));
        }
        let feed = add_result
            .feed
            .ok_or_else(|| anyhow::anyhow!("add_feed succeeded without a feed"))?;

        let (subscription, created) = self
            .db
            .get_or_create_subscription(platform, user_id, channel_id, feed.id, guild_id)
            .await?;

        let message = if created {
            tracing::info!(
                platform = %platform,
                channel = %channel_id,
                feed = %feed_url,
                "New subscription"
            );
            format!("Subscribed to {}", feed.title.as_deref().unwrap_or(feed_url))
        } else {
            "Already subscribed to this feed".to_string()
        };

        Ok(SubscribeResult {
            success: true,
            subscription: Some(subscription),
            feed: Some(feed),
            message,
            is_new: created,
        })
    }

    /// Removes a channel's binding to a feed.
    ///
    /// Fails (softly) when either the feed or the binding does not exist.
    pub async fn unsubscribe(
        &self,
        platform: &str,
        channel_id: &str,
        feed_url: &str,
    ) -> Result<UnsubscribeResult> {
        let Some(feed) = self.db.get_feed_by_url(feed_url).await? else {
            return Ok(UnsubscribeResult {
                success: false,
                message: "Feed not found".to_string(),
            });
        };

        let deleted = self
            .db
            .delete_subscription(platform, channel_id, feed.id)
            .await?;
        if !deleted {
            return Ok(UnsubscribeResult {
                success: false,
                message: "Subscription not found".to_string(),
            });
        }

        tracing::info!(
            platform = %platform,
            channel = %channel_id,
            feed = %feed_url,
            "Unsubscribed"
        );
        Ok(UnsubscribeResult {
            success: true,
            message: format!(
                "Unsubscribed from {}",
                feed.title.as_deref().unwrap_or(feed_url)
            ),
        })
    }

    /// Lists a channel's subscriptions with their feeds eager-loaded.
    pub async fn list(
        &self,
        platform: &str,
        channel_id: &str,
    ) -> Result<Vec<ChannelSubscription>> {
        let subscriptions = self
            .db
            .list_channel_subscriptions(platform, channel_id)
            .await?;

        let mut listed = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            if let Some(feed) = self.db.get_feed(subscription.feed_id).await? {
                listed.push(ChannelSubscription { subscription, feed });
            }
        }
        Ok(listed)
    }

    /// Updates delivery settings for one feed's binding on a channel, or
    /// for every binding on the channel when `feed_url` is `None`.
    ///
    /// Returns `false` when nothing matched. A changed `target_language`
    /// invalidates cached entry translations implicitly: the dispatcher
    /// only reuses a cache whose recorded language matches the current
    /// target.
    pub async fn update_settings(
        &self,
        platform: &str,
        channel_id: &str,
        feed_url: Option<&str>,
        settings: &SubscriptionSettings,
    ) -> Result<bool> {
        let subscriptions = self
            .db
            .list_channel_subscriptions(platform, channel_id)
            .await?;
        if subscriptions.is_empty() {
            return Ok(false);
        }

        let feed_filter = match feed_url {
            Some(url) => match self.db.get_feed_by_url(url).await? {
                Some(feed) => Some(feed.id),
                None => return Ok(false),
            },
            None => None,
        };

        let mut updated_any = false;
        for subscription in subscriptions {
            if let Some(feed_id) = feed_filter {
                if subscription.feed_id != feed_id {
                    continue;
                }
            }
            updated_any |= self
                .db
                .update_subscription_settings(subscription.id, settings)
                .await?;
        }
        Ok(updated_any)
    }
}
