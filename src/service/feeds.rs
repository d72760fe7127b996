//! Feed service: orchestrates fetch → normalize → persist for feeds.

use anyhow::Result;
use futures::stream::{self, StreamExt};

use crate::feed::{FeedFetcher, FetchOutcome};
use crate::storage::{Database, Feed, NewEntry};

/// Result of adding a feed by URL.
#[derive(Debug)]
pub struct AddFeedResult {
    pub success: bool,
    pub feed: Option<Feed>,
    pub message: String,
    pub entry_count: usize,
}

impl AddFeedResult {
    fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            feed: None,
            message: message.into(),
            entry_count: 0,
        }
    }
}

/// Result of refreshing one feed during a cycle.
#[derive(Debug)]
pub struct FetchFeedResult {
    pub feed_id: i64,
    pub success: bool,
    pub new_entries: usize,
    pub message: String,
}

pub struct FeedService {
    db: Database,
    fetcher: FeedFetcher,
}

impl FeedService {
    pub fn new(db: Database, fetcher: FeedFetcher) -> Self {
        Self { db, fetcher }
    }

    pub fn fetcher(&self) -> &FeedFetcher {
        &self.fetcher
    }

    /// Adds a feed by URL: validates it upstream, creates the row, stores
    /// the initial entries.
    ///
    /// A URL that is already registered returns the existing feed. A URL
    /// that fetches but parses to zero entries is rejected, since there is
    /// nothing to deliver from it.
    ///
    /// # Errors
    ///
    /// Only database failures surface as `Err`; fetch problems come back as
    /// `success = false` with a user-facing message.
    pub async fn add_feed(&self, url: &str) -> Result<AddFeedResult> {
        if let Some(existing) = self.db.get_feed_by_url(url).await? {
            return Ok(AddFeedResult {
                success: true,
                feed: Some(existing),
                message: "Feed already exists".to_string(),
                entry_count: 0,
            });
        }

        let fetched = match self.fetcher.fetch(url, None, None).await {
            Ok(FetchOutcome::Fetched(fetched)) => fetched,
            // No validators were sent, so a 304 here means a misbehaving server
            Ok(FetchOutcome::NotModified) => {
                return Ok(AddFeedResult::failure("Feed has no entries"));
            }
            Err(e) => {
                return Ok(AddFeedResult::failure(format!("Failed to fetch feed: {}", e)));
            }
        };

        if fetched.entries.is_empty() {
            return Ok(AddFeedResult::failure("Feed has no entries"));
        }

        let (feed, _created) = self.db.get_or_create_feed(url).await?;
        self.db
            .update_feed_success(
                feed.id,
                &fetched.meta,
                fetched.etag.as_deref(),
                fetched.last_modified.as_deref(),
            )
            .await?;

        let new_entries: Vec<NewEntry> =
            fetched.entries.into_iter().map(NewEntry::from).collect();
        let entry_count = self.db.insert_entries(feed.id, &new_entries).await?;

        tracing::info!(feed = %url, entries = entry_count, "Added feed");

        let feed = self.db.get_feed(feed.id).await?.unwrap_or(feed);
        Ok(AddFeedResult {
            success: true,
            feed: Some(feed),
            message: format!("Feed added with {} entries", entry_count),
            entry_count,
        })
    }

    /// Refreshes one feed and stores whatever is new.
    ///
    /// Fetch and storage failures are recorded against the feed and
    /// reported in the result; they never propagate.
    pub async fn fetch_and_store(&self, feed: &Feed) -> FetchFeedResult {
        let outcome = self
            .fetcher
            .fetch(&feed.url, feed.etag.as_deref(), feed.last_modified.as_deref())
            .await;

        match outcome {
            Ok(FetchOutcome::NotModified) => {
                if let Err(e) = self.db.update_feed_not_modified(feed.id).await {
                    tracing::warn!(feed = %feed.url, error = %e, "Failed to stamp 304 fetch");
                }
                FetchFeedResult {
                    feed_id: feed.id,
                    success: true,
                    new_entries: 0,
                    message: "Not modified".to_string(),
                }
            }
            Ok(FetchOutcome::Fetched(fetched)) => {
                if let Err(e) = self
                    .db
                    .update_feed_success(
                        feed.id,
                        &fetched.meta,
                        fetched.etag.as_deref(),
                        fetched.last_modified.as_deref(),
                    )
                    .await
                {
                    tracing::warn!(feed = %feed.url, error = %e, "Failed to update feed metadata");
                }

                let new_entries: Vec<NewEntry> =
                    fetched.entries.into_iter().map(NewEntry::from).collect();
                match self.db.insert_entries(feed.id, &new_entries).await {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!(feed = %feed.url, new_entries = count, "Feed refreshed");
                        }
                        FetchFeedResult {
                            feed_id: feed.id,
                            success: true,
                            new_entries: count,
                            message: format!("{} new entries", count),
                        }
                    }
                    Err(e) => {
                        tracing::warn!(feed = %feed.url, error = %e, "Entry insert batch failed");
                        FetchFeedResult {
                            feed_id: feed.id,
                            success: false,
                            new_entries: 0,
                            message: format!("Storage error: {}", e),
                        }
                    }
                }
            }
            Err(e) => {
                let error = e.to_string();
                match self.db.mark_feed_error(feed.id, &error).await {
                    Ok((count, active)) => {
                        if !active {
                            tracing::warn!(
                                feed = %feed.url,
                                error_count = count,
                                "Feed deactivated after repeated failures"
                            );
                        } else {
                            tracing::warn!(feed = %feed.url, error = %error, error_count = count, "Feed fetch failed");
                        }
                    }
                    Err(db_err) => {
                        tracing::warn!(feed = %feed.url, error = %db_err, "Failed to record fetch error");
                    }
                }
                FetchFeedResult {
                    feed_id: feed.id,
                    success: false,
                    new_entries: 0,
                    message: format!("Fetch error: {}", error),
                }
            }
        }
    }

    /// Refreshes every active feed concurrently.
    ///
    /// The fanout runs through the fetcher's permit, so parallelism never
    /// exceeds its configured limit regardless of feed count. Results are
    /// in completion order.
    pub async fn refresh_all(&self) -> Vec<FetchFeedResult> {
        let feeds = match self.db.list_active_feeds().await {
            Ok(feeds) => feeds,
            Err(e) => {
                tracing::error!(error = %e, "Could not load active feeds");
                return Vec::new();
            }
        };

        if feeds.is_empty() {
            return Vec::new();
        }

        stream::iter(feeds)
            .map(|feed| async move { self.fetch_and_store(&feed).await })
            .buffer_unordered(self.fetcher.max_concurrent())
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <title>Feed Title</title>
    <item><guid>a</guid><title>A</title><link>https://example.org/a</link>
      <pubDate>Mon, 06 Jan 2025 10:00:00 GMT</pubDate></item>
    <item><guid>b</guid><title>B</title><link>https://example.org/b</link>
      <pubDate>Tue, 07 Jan 2025 10:00:00 GMT</pubDate></item>
</channel></rss>"#;

    async fn service() -> FeedService {
        let db = Database::open(":memory:").await.unwrap();
        FeedService::new(db, FeedFetcher::new(4).unwrap())
    }

    #[tokio::test]
    async fn test_add_feed_stores_entries_and_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("ETag", "\"v1\""),
            )
            .mount(&server)
            .await;

        let service = service().await;
        let url = format!("{}/rss", server.uri());
        let result = service.add_feed(&url).await.unwrap();

        assert!(result.success);
        assert_eq!(result.entry_count, 2);
        let feed = result.feed.unwrap();
        assert_eq!(feed.title.as_deref(), Some("Feed Title"));
        assert_eq!(feed.etag.as_deref(), Some("\"v1\""));

        // Adding again is a no-op
        let again = service.add_feed(&url).await.unwrap();
        assert!(again.success);
        assert_eq!(again.message, "Feed already exists");
    }

    #[tokio::test]
    async fn test_add_feed_rejects_empty_feed() {
        let empty = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>E</title></channel></rss>"#;
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(empty))
            .mount(&server)
            .await;

        let service = service().await;
        let result = service.add_feed(&format!("{}/rss", server.uri())).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "Feed has no entries");
    }

    #[tokio::test]
    async fn test_add_feed_reports_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let service = service().await;
        let result = service.add_feed(&format!("{}/rss", server.uri())).await.unwrap();
        assert!(!result.success);
        assert!(result.message.contains("404"));
    }

    #[tokio::test]
    async fn test_fetch_and_store_dedups_across_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rss"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&server)
            .await;

        let service = service().await;
        let url = format!("{}/rss", server.uri());
        service.add_feed(&url).await.unwrap();

        let feed = service.db.get_feed_by_url(&url).await.unwrap().unwrap();
        let result = service.fetch_and_store(&feed).await;
        assert!(result.success);
        assert_eq!(result.new_entries, 0); // same two guids again
    }

    #[tokio::test]
    async fn test_fetch_and_store_counts_errors_and_deactivates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let service = service().await;
        let url = format!("{}/rss", server.uri());
        let (feed, _) = service.db.get_or_create_feed(&url).await.unwrap();

        for _ in 0..Database::ERROR_DEACTIVATION_THRESHOLD {
            let result = service.fetch_and_store(&feed).await;
            assert!(!result.success);
        }

        let feed = service.db.get_feed(feed.id).await.unwrap().unwrap();
        assert!(!feed.is_active);
        assert!(feed.last_error.unwrap().contains("500"));

        // Deactivated feeds drop out of the refresh set
        assert!(service.refresh_all().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_all_uses_conditional_get() {
        let server = MockServer::start().await;
        // First exchange: full body with a validator
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("ETag", "\"v1\""),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        // Replays with the validator get a 304
        Mock::given(method("GET"))
            .and(wiremock::matchers::header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let service = service().await;
        let url = format!("{}/rss", server.uri());
        service.add_feed(&url).await.unwrap();

        let results = service.refresh_all().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].success);
        assert_eq!(results[0].new_entries, 0);
        assert_eq!(results[0].message, "Not modified");

        // Validators survive the 304 untouched
        let feed = service.db.get_feed_by_url(&url).await.unwrap().unwrap();
        assert_eq!(feed.etag.as_deref(), Some("\"v1\""));
    }
}
