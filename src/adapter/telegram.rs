//! Send-only Telegram adapter over the Bot API.
//!
//! Renders entries as HTML-formatted text (`sendMessage`) or, when the
//! entry carries an image, as a captioned photo (`sendPhoto`). All
//! user-controlled text is entity-escaped before interpolation.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{DeliveryAdapter, Message};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Telegram caps photo captions at 1024 chars
const MAX_CAPTION_LENGTH: usize = 1024;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramAdapter {
    client: reqwest::Client,
    token: SecretString,
    api_base: String,
}

impl TelegramAdapter {
    pub fn new(client: reqwest::Client, token: SecretString) -> Self {
        Self {
            client,
            token,
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }

    fn method_url(&self, api_method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_base,
            self.token.expose_secret(),
            api_method
        )
    }

    /// `<b>title</b>\n\nsummary\n\n<a href>source</a>` with entities escaped.
    fn render_html(message: &Message) -> String {
        let mut html = format!("<b>{}</b>", escape_html(message.display_title()));

        let summary = message.display_summary();
        if !summary.is_empty() {
            html.push_str("\n\n");
            html.push_str(&escape_html(summary));
        }

        html.push_str(&format!(
            "\n\n<a href=\"{}\">{}</a>",
            escape_html(&message.link),
            escape_html(&message.source)
        ));

        html
    }

    async fn call_api(&self, api_method: &str, payload: serde_json::Value) -> bool {
        match self
            .client
            .post(self.method_url(api_method))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_u16();
                match response.json::<ApiResponse>().await {
                    Ok(body) if body.ok => true,
                    Ok(body) => {
                        tracing::warn!(
                            method = %api_method,
                            status = status,
                            description = body.description.as_deref().unwrap_or("unknown"),
                            "Telegram rejected the request"
                        );
                        false
                    }
                    Err(e) => {
                        tracing::warn!(method = %api_method, error = %e, "Telegram response decode failed");
                        false
                    }
                }
            }
            Err(e) => {
                tracing::warn!(method = %api_method, error = %e, "Telegram request failed");
                false
            }
        }
    }
}

#[async_trait]
impl DeliveryAdapter for TelegramAdapter {
    fn platform_name(&self) -> &str {
        "telegram"
    }

    /// Validates the bot token against `getMe`.
    async fn start(&self) -> anyhow::Result<()> {
        let response = self.client.get(self.method_url("getMe")).send().await?;
        let body: ApiResponse = response.json().await?;
        if !body.ok {
            anyhow::bail!(
                "Telegram token validation failed: {}",
                body.description.as_deref().unwrap_or("unknown")
            );
        }
        tracing::info!("Telegram adapter started");
        Ok(())
    }

    async fn stop(&self) {
        // REST-only adapter holds no connection state
    }

    async fn send_message(&self, channel_id: &str, message: &Message) -> bool {
        let html = Self::render_html(message);

        if let Some(image_url) = &message.image_url {
            // Captions are limited; oversized text falls back to plain sendMessage
            if html.chars().count() <= MAX_CAPTION_LENGTH {
                let payload = serde_json::json!({
                    "chat_id": channel_id,
                    "photo": image_url,
                    "caption": html,
                    "parse_mode": "HTML",
                });
                return self.call_api("sendPhoto", payload).await;
            }
        }

        let payload = serde_json::json!({
            "chat_id": channel_id,
            "text": html,
            "parse_mode": "HTML",
        });
        self.call_api("sendMessage", payload).await
    }

    async fn send_text(&self, channel_id: &str, text: &str) -> bool {
        let payload = serde_json::json!({
            "chat_id": channel_id,
            "text": text,
        });
        self.call_api("sendMessage", payload).await
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn message(image: Option<&str>) -> Message {
        Message {
            title: "News <script>".to_string(),
            summary: "A & B".to_string(),
            link: "https://example.org/a".to_string(),
            source: "Example".to_string(),
            published_at: None,
            image_url: image.map(String::from),
            title_translated: None,
            summary_translated: None,
        }
    }

    #[test]
    fn test_render_escapes_entities() {
        let html = TelegramAdapter::render_html(&message(None));
        assert!(html.contains("<b>News &lt;script&gt;</b>"));
        assert!(html.contains("A &amp; B"));
        assert!(html.contains("<a href=\"https://example.org/a\">Example</a>"));
    }

    #[tokio::test]
    async fn test_send_message_without_image_uses_send_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottok/sendMessage"))
            .and(body_partial_json(serde_json::json!({"chat_id": "42", "parse_mode": "HTML"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let adapter = TelegramAdapter::new(reqwest::Client::new(), SecretString::from("tok"))
            .with_api_base(&server.uri());
        assert!(adapter.send_message("42", &message(None)).await);
    }

    #[tokio::test]
    async fn test_send_message_with_image_uses_send_photo() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottok/sendPhoto"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let adapter = TelegramAdapter::new(reqwest::Client::new(), SecretString::from("tok"))
            .with_api_base(&server.uri());
        assert!(
            adapter
                .send_message("42", &message(Some("https://example.org/a.jpg")))
                .await
        );
    }

    #[tokio::test]
    async fn test_api_level_rejection_returns_false() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"ok": false, "description": "Bad Request: chat not found"}),
            ))
            .mount(&server)
            .await;

        let adapter = TelegramAdapter::new(reqwest::Client::new(), SecretString::from("tok"))
            .with_api_base(&server.uri());
        assert!(!adapter.send_message("42", &message(None)).await);
    }
}
