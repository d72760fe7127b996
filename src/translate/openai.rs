//! OpenAI-compatible translation backend.
//!
//! Uses chat completions with a system prompt that pins the model to a
//! translator role; low temperature and a "translated text only" rule keep
//! the output usable verbatim.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::TranslationResult;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Human-readable language names for the prompt. Prompting with "Simplified
/// Chinese" works far better than "zh-CN".
const LANGUAGE_NAMES: &[(&str, &str)] = &[
    ("zh", "Simplified Chinese"),
    ("zh-cn", "Simplified Chinese"),
    ("zh-hans", "Simplified Chinese"),
    ("zh-tw", "Traditional Chinese"),
    ("zh-hant", "Traditional Chinese"),
    ("en", "English"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("fr", "French"),
    ("de", "German"),
    ("es", "Spanish"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("ar", "Arabic"),
    ("hi", "Hindi"),
    ("it", "Italian"),
    ("nl", "Dutch"),
    ("pl", "Polish"),
    ("tr", "Turkish"),
    ("vi", "Vietnamese"),
    ("th", "Thai"),
    ("id", "Indonesian"),
    ("ms", "Malay"),
];

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct OpenAiTranslator {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiTranslator {
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        model: String,
        base_url: Option<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }

    pub fn supports_language(&self, lang: &str) -> bool {
        language_name(lang).is_some()
    }

    pub fn normalize_language(&self, lang: &str) -> String {
        lang.to_lowercase()
    }

    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> TranslationResult {
        let Some(target_name) = language_name(target_lang) else {
            return TranslationResult::failed(format!("Unsupported language: {}", target_lang));
        };

        let source_clause = source_lang
            .and_then(language_name)
            .map(|name| format!(" from {}", name))
            .unwrap_or_default();

        let system_prompt = format!(
            "You are a professional news translator. Translate the user's text{} into {}. \
             Preserve the meaning and tone. Output only the translated text, with no \
             explanations, quotes, or additional formatting.",
            source_clause, target_name
        );

        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.3,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": text},
            ],
        });

        let response = match self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "OpenAI request failed");
                return TranslationResult::failed(format!("OpenAI request failed: {}", e));
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!(status = status, "OpenAI returned an error status");
            return TranslationResult::failed(format!("OpenAI HTTP {}", status));
        }

        match response.json::<ChatResponse>().await {
            Ok(parsed) => match parsed.choices.into_iter().next() {
                Some(choice) => {
                    TranslationResult::ok(choice.message.content.trim().to_string(), None)
                }
                None => TranslationResult::failed("OpenAI returned no choices"),
            },
            Err(e) => TranslationResult::failed(format!("OpenAI response decode failed: {}", e)),
        }
    }
}

/// Resolves a prompt-friendly language name; region subtags fall back to
/// the primary subtag ("fr-CA" → "French").
fn language_name(lang: &str) -> Option<&'static str> {
    let lower = lang.to_lowercase();
    LANGUAGE_NAMES
        .iter()
        .find(|(code, _)| *code == lower)
        .or_else(|| {
            let primary = lower.split('-').next().unwrap_or(&lower).to_string();
            LANGUAGE_NAMES.iter().find(|(code, _)| *code == primary)
        })
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_language_names() {
        assert_eq!(language_name("zh-CN"), Some("Simplified Chinese"));
        assert_eq!(language_name("fr-CA"), Some("French"));
        assert_eq!(language_name("tlh"), None);
    }

    #[tokio::test]
    async fn test_translate_through_compatible_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "  你好世界  "}}]
            })))
            .mount(&server)
            .await;

        let translator = OpenAiTranslator::new(
            reqwest::Client::new(),
            SecretString::from("sk-test"),
            "gpt-4o-mini".to_string(),
            Some(server.uri()),
        );

        let result = translator.translate("Hello World", "zh-CN", None).await;
        assert!(result.success);
        // Surrounding whitespace from the model is trimmed
        assert_eq!(result.translated_text, "你好世界");
    }

    #[tokio::test]
    async fn test_unsupported_language_fails_without_network() {
        let translator = OpenAiTranslator::new(
            reqwest::Client::new(),
            SecretString::from("sk-test"),
            "gpt-4o-mini".to_string(),
            Some("http://127.0.0.1:1".to_string()),
        );
        let result = translator.translate("Hello", "tlh", None).await;
        assert!(!result.success);
    }
}
