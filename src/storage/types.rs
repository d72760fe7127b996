use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::feed::parser::ParsedEntry;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has the database file locked
    #[error("Another instance of feedbridge appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

// ============================================================================
// Row Types
// ============================================================================

/// One upstream syndication feed.
///
/// `url` is the natural key. `etag` / `last_modified` are the opaque
/// validators replayed on the next conditional GET.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub site_url: Option<String>,
    pub is_active: bool,
    pub error_count: i64,
    pub last_error: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub last_fetched_at: Option<i64>,
    pub last_successful_fetch_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One article under a feed. Immutable after insert except for the
/// translation cache columns.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedEntry {
    pub id: i64,
    pub feed_id: i64,
    pub guid: String,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<i64>,
    pub image_url: Option<String>,
    pub title_translated: Option<String>,
    pub summary_translated: Option<String>,
    pub translation_language: Option<String>,
    /// Legacy per-feed hint; the receipt table is authoritative for dedup
    pub is_sent: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FeedEntry {
    /// Whether this entry already carries a cached translation for `lang`.
    pub fn has_translation_for(&self, lang: &str) -> bool {
        self.translation_language.as_deref() == Some(lang) && self.title_translated.is_some()
    }

    pub fn published_datetime(&self) -> Option<DateTime<Utc>> {
        self.published_at.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }
}

/// A channel's binding to one feed, with its delivery preferences.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Subscription {
    pub id: i64,
    pub platform: String,
    pub platform_user_id: String,
    pub platform_channel_id: String,
    pub platform_guild_id: Option<String>,
    pub feed_id: i64,
    pub is_active: bool,
    pub translate: bool,
    pub target_language: String,
    pub show_summary: bool,
    pub show_image: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Insert record for a feed entry, flattened from [`ParsedEntry`].
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub guid: String,
    pub title: String,
    pub link: String,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<i64>,
    pub image_url: Option<String>,
}

impl From<ParsedEntry> for NewEntry {
    fn from(entry: ParsedEntry) -> Self {
        Self {
            guid: entry.guid,
            title: entry.title,
            link: entry.link,
            summary: entry.summary,
            content: entry.content,
            author: entry.author,
            published_at: entry.published_at.map(|dt| dt.timestamp()),
            image_url: entry.image_url,
        }
    }
}

/// Optional fields for a subscription settings update; `None` leaves the
/// current value untouched.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionSettings {
    pub translate: Option<bool>,
    pub target_language: Option<String>,
    pub show_summary: Option<bool>,
    pub show_image: Option<bool>,
}
