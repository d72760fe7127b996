//! Delivery adapters: the seam between the engine and chat platforms.
//!
//! The dispatcher only ever sees [`DeliveryAdapter`]; the registry maps a
//! subscription's platform name to whichever adapter was wired at startup.
//! The bundled adapters are send-only REST clients: no gateway connection,
//! no command handling.

pub mod discord;
pub mod telegram;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use discord::DiscordAdapter;
pub use telegram::TelegramAdapter;

/// Platform-agnostic message payload.
///
/// Adapters render this into platform-native form (embed card, HTML text).
#[derive(Debug, Clone)]
pub struct Message {
    pub title: String,
    pub summary: String,
    pub link: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub title_translated: Option<String>,
    pub summary_translated: Option<String>,
}

impl Message {
    /// Title to display, preferring the translated variant.
    pub fn display_title(&self) -> &str {
        self.title_translated.as_deref().unwrap_or(&self.title)
    }

    /// Summary to display, preferring the translated variant.
    pub fn display_summary(&self) -> &str {
        self.summary_translated.as_deref().unwrap_or(&self.summary)
    }
}

/// A chat-platform sink.
///
/// `send_message` / `send_text` return `true` only when the platform
/// acknowledged acceptance; the dispatcher writes a delivery receipt on
/// nothing less.
#[async_trait]
pub trait DeliveryAdapter: Send + Sync {
    fn platform_name(&self) -> &str;

    /// Connects / validates credentials. Called once at startup.
    async fn start(&self) -> anyhow::Result<()>;

    /// Releases platform resources. Called once at shutdown.
    async fn stop(&self);

    async fn send_message(&self, channel_id: &str, message: &Message) -> bool;

    async fn send_text(&self, channel_id: &str, text: &str) -> bool;
}

/// Adapter registry keyed by platform name.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn DeliveryAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn DeliveryAdapter>) {
        let platform = adapter.platform_name().to_string();
        tracing::info!(platform = %platform, "Registered delivery adapter");
        self.adapters.insert(platform, adapter);
    }

    pub fn get(&self, platform: &str) -> Option<&Arc<dyn DeliveryAdapter>> {
        self.adapters.get(platform)
    }

    pub fn platforms(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Starts every adapter; any failure aborts startup.
    pub async fn start_all(&self) -> anyhow::Result<()> {
        for adapter in self.adapters.values() {
            adapter.start().await?;
        }
        Ok(())
    }

    pub async fn stop_all(&self) {
        for adapter in self.adapters.values() {
            adapter.stop().await;
        }
    }
}
