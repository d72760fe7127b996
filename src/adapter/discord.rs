//! Send-only Discord adapter over the REST API.
//!
//! Posts entries as embeds via `POST /channels/{id}/messages` with bot
//! authentication. Interactive features (gateway, slash commands) are out
//! of this crate's scope.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::{DeliveryAdapter, Message};

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Embed sidebar color (Discord blurple)
const EMBED_COLOR: u32 = 0x5865F2;

pub struct DiscordAdapter {
    client: reqwest::Client,
    token: SecretString,
    api_base: String,
}

impl DiscordAdapter {
    pub fn new(client: reqwest::Client, token: SecretString) -> Self {
        Self {
            client,
            token,
            api_base: DISCORD_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    fn build_embed(message: &Message) -> serde_json::Value {
        let mut embed = serde_json::json!({
            "title": message.display_title(),
            "url": message.link,
            "color": EMBED_COLOR,
            "footer": { "text": message.source },
        });

        let summary = message.display_summary();
        if !summary.is_empty() {
            embed["description"] = serde_json::Value::String(summary.to_string());
        }
        if let Some(published_at) = message.published_at {
            embed["timestamp"] = serde_json::Value::String(published_at.to_rfc3339());
        }
        if let Some(image_url) = &message.image_url {
            embed["image"] = serde_json::json!({ "url": image_url });
        }

        embed
    }

    async fn post_payload(&self, channel_id: &str, payload: serde_json::Value) -> bool {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        match self
            .client
            .post(&url)
            .header(
                "Authorization",
                format!("Bot {}", self.token.expose_secret()),
            )
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(
                    channel = %channel_id,
                    status = response.status().as_u16(),
                    "Discord rejected the message"
                );
                false
            }
            Err(e) => {
                tracing::warn!(channel = %channel_id, error = %e, "Discord send failed");
                false
            }
        }
    }
}

#[async_trait]
impl DeliveryAdapter for DiscordAdapter {
    fn platform_name(&self) -> &str {
        "discord"
    }

    /// Validates the bot token against `/users/@me`.
    async fn start(&self) -> anyhow::Result<()> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.api_base))
            .header(
                "Authorization",
                format!("Bot {}", self.token.expose_secret()),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!(
                "Discord token validation failed (HTTP {})",
                response.status().as_u16()
            );
        }
        tracing::info!("Discord adapter started");
        Ok(())
    }

    async fn stop(&self) {
        // REST-only adapter holds no connection state
    }

    async fn send_message(&self, channel_id: &str, message: &Message) -> bool {
        let payload = serde_json::json!({ "embeds": [Self::build_embed(message)] });
        self.post_payload(channel_id, payload).await
    }

    async fn send_text(&self, channel_id: &str, text: &str) -> bool {
        let payload = serde_json::json!({ "content": text });
        self.post_payload(channel_id, payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message() -> Message {
        Message {
            title: "Title".to_string(),
            summary: "Summary".to_string(),
            link: "https://example.org/a".to_string(),
            source: "Example".to_string(),
            published_at: Some(chrono::Utc.with_ymd_and_hms(2025, 1, 6, 10, 0, 0).unwrap()),
            image_url: Some("https://example.org/a.jpg".to_string()),
            title_translated: None,
            summary_translated: None,
        }
    }

    #[test]
    fn test_embed_shape() {
        let embed = DiscordAdapter::build_embed(&message());
        assert_eq!(embed["title"], "Title");
        assert_eq!(embed["description"], "Summary");
        assert_eq!(embed["footer"]["text"], "Example");
        assert_eq!(embed["image"]["url"], "https://example.org/a.jpg");
        assert!(embed["timestamp"].as_str().unwrap().starts_with("2025-01-06"));
    }

    #[tokio::test]
    async fn test_send_message_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/42/messages"))
            .and(header("Authorization", "Bot token"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let adapter = DiscordAdapter::new(reqwest::Client::new(), SecretString::from("token"))
            .with_api_base(&server.uri());
        assert!(adapter.send_message("42", &message()).await);
    }

    #[tokio::test]
    async fn test_send_message_failure_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403)) // missing channel permission
            .mount(&server)
            .await;

        let adapter = DiscordAdapter::new(reqwest::Client::new(), SecretString::from("token"))
            .with_api_base(&server.uri());
        assert!(!adapter.send_message("42", &message()).await);
    }
}
