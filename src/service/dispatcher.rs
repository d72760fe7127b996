//! The dispatch cycle: refresh feeds, fan new entries out to subscribers,
//! record receipts.
//!
//! Cycle shape per tick:
//!
//! ```text
//! idle → fetching → collating → translating/sending (per subscription) → idle
//! ```
//!
//! All entry inserts land before any send starts. Each subscription is then
//! handled by exactly one worker, sending newest-first and writing a
//! receipt only after the adapter acknowledged the message, so delivery is
//! at-most-once per `(subscription, entry)`.

use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{AdapterRegistry, Message};
use crate::content;
use crate::storage::{Database, FeedEntry, Subscription};
use crate::translate::TranslationService;

use super::feeds::FeedService;

/// Entries considered per subscription per cycle
const DISPATCH_BATCH_LIMIT: i64 = 10;

/// Summaries are capped before being handed to a paid translation API
const TRANSLATE_SUMMARY_LIMIT: usize = 1000;

/// Statistics for one dispatch cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    pub feeds_fetched: usize,
    pub new_entries: usize,
    pub messages_sent: usize,
    pub errors: usize,
}

pub struct Dispatcher {
    db: Database,
    feed_service: Arc<FeedService>,
    translator: Option<Arc<TranslationService>>,
    adapters: Arc<AdapterRegistry>,
    send_delay: Duration,
}

impl Dispatcher {
    pub fn new(
        db: Database,
        feed_service: Arc<FeedService>,
        translator: Option<Arc<TranslationService>>,
        adapters: Arc<AdapterRegistry>,
        send_delay: Duration,
    ) -> Self {
        Self {
            db,
            feed_service,
            translator,
            adapters,
            send_delay,
        }
    }

    /// Runs one full cycle. Never fails: every failure inside is local,
    /// logged, and reflected in the counters.
    pub async fn dispatch_once(&self) -> DispatchResult {
        let mut result = DispatchResult::default();

        // Fetching: refresh every active feed before any send
        let fetch_results = self.feed_service.refresh_all().await;
        result.feeds_fetched = fetch_results.len();
        for fetch in &fetch_results {
            result.new_entries += fetch.new_entries;
            if !fetch.success {
                result.errors += 1;
            }
        }

        // Collating: the delivery worklist
        let subscriptions = match self.db.list_active_subscriptions().await {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(error = %e, "Could not load subscriptions, skipping cycle");
                result.errors += 1;
                return result;
            }
        };

        for subscription in &subscriptions {
            let (sent, errors) = self.dispatch_to_subscription(subscription).await;
            result.messages_sent += sent;
            result.errors += errors;
        }

        tracing::info!(
            feeds_fetched = result.feeds_fetched,
            new_entries = result.new_entries,
            messages_sent = result.messages_sent,
            errors = result.errors,
            "Dispatch cycle complete"
        );
        result
    }

    /// Sends a subscription's pending entries, newest first.
    ///
    /// Returns `(messages_sent, errors)`. A failed send writes no receipt,
    /// so the entry is retried on the next cycle.
    async fn dispatch_to_subscription(&self, subscription: &Subscription) -> (usize, usize) {
        let Some(adapter) = self.adapters.get(&subscription.platform) else {
            tracing::warn!(platform = %subscription.platform, "No adapter for platform");
            return (0, 0);
        };

        let entries = match self
            .db
            .list_undelivered_entries(subscription.id, subscription.feed_id, DISPATCH_BATCH_LIMIT)
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    subscription = subscription.id,
                    error = %e,
                    "Could not query pending entries"
                );
                return (0, 1);
            }
        };

        if entries.is_empty() {
            return (0, 0);
        }

        let mut sent = 0;
        let mut errors = 0;

        for entry in &entries {
            let message = self.compose_message(entry, subscription).await;

            if adapter
                .send_message(&subscription.platform_channel_id, &message)
                .await
            {
                // Receipt strictly after the acknowledged send. A failed
                // write here means a possible duplicate next cycle, never a
                // lost entry.
                match self.db.insert_sent_receipt(subscription.id, entry.id).await {
                    Ok(()) => {
                        sent += 1;
                        tracing::debug!(
                            subscription = subscription.id,
                            entry = entry.id,
                            channel = %subscription.platform_channel_id,
                            "Entry delivered"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            subscription = subscription.id,
                            entry = entry.id,
                            error = %e,
                            "Receipt write failed after send"
                        );
                        errors += 1;
                    }
                }
            } else {
                tracing::warn!(
                    subscription = subscription.id,
                    entry = entry.id,
                    channel = %subscription.platform_channel_id,
                    "Send failed, entry will be retried next cycle"
                );
                errors += 1;
            }

            // Fixed inter-send delay keeps us inside platform rate limits
            tokio::time::sleep(self.send_delay).await;
        }

        (sent, errors)
    }

    /// Builds the platform-agnostic message for one entry, translating when
    /// the subscription asks for it.
    async fn compose_message(&self, entry: &FeedEntry, subscription: &Subscription) -> Message {
        let processed = content::process_content(
            &entry.title,
            entry.summary.as_deref(),
            entry.content.as_deref(),
            &entry.link,
            &subscription.target_language,
        );

        let mut title_translated = None;
        let mut summary_translated = None;
        if subscription.translate {
            if let Some(translator) = &self.translator {
                if translator.supports_language(&subscription.target_language) {
                    (title_translated, summary_translated) = self
                        .translate_entry(entry, &processed, &subscription.target_language, translator)
                        .await;
                }
            }
        }

        let summary = if subscription.show_summary {
            processed.summary
        } else {
            String::new()
        };
        let summary_translated = if subscription.show_summary {
            summary_translated
        } else {
            None
        };

        let image_url = if subscription.show_image {
            entry
                .image_url
                .clone()
                .or_else(|| processed.images.first().cloned())
                .filter(|url| content::is_valid_image_url(url))
        } else {
            None
        };

        Message {
            title: processed.title,
            summary,
            link: entry.link.clone(),
            source: processed.source_name,
            published_at: entry.published_datetime(),
            image_url,
            title_translated,
            summary_translated,
        }
    }

    /// Resolves the entry's translation, reusing the persisted cache when
    /// its language matches and writing a fresh one back otherwise.
    ///
    /// Any translation failure falls back to `None`; the original text is
    /// always good enough to send.
    async fn translate_entry(
        &self,
        entry: &FeedEntry,
        processed: &content::ProcessedContent,
        target_lang: &str,
        translator: &TranslationService,
    ) -> (Option<String>, Option<String>) {
        if entry.has_translation_for(target_lang) {
            return (
                entry.title_translated.clone(),
                entry.summary_translated.clone(),
            );
        }

        let title_result = translator.translate(&processed.title, target_lang, None).await;
        let title_translated = if title_result.success && !title_result.translated_text.is_empty() {
            Some(title_result.translated_text)
        } else {
            None
        };

        let summary_source = content::truncate_text(&processed.plain_text, TRANSLATE_SUMMARY_LIMIT);
        let summary_translated = if summary_source.trim().is_empty() {
            None
        } else {
            let result = translator.translate(&summary_source, target_lang, None).await;
            if result.success && !result.translated_text.is_empty() {
                Some(result.translated_text)
            } else {
                None
            }
        };

        // Persist only complete-enough results: a cached row must at least
        // carry the title, or has_translation_for() would lie
        if let Some(title) = &title_translated {
            if let Err(e) = self
                .db
                .set_entry_translation(entry.id, title, summary_translated.as_deref(), target_lang)
                .await
            {
                tracing::warn!(entry = entry.id, error = %e, "Failed to cache entry translation");
            }
        }

        (title_translated, summary_translated)
    }
}
