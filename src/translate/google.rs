//! Google Cloud Translation backend (v2 REST, API-key auth).

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::TranslationResult;

const GOOGLE_API_URL: &str = "https://translation.googleapis.com/language/translate/v2";

/// Common target codes the v2 API accepts. Google's own set is much larger;
/// this covers what subscriptions realistically request.
const GOOGLE_LANGUAGES: &[&str] = &[
    "af", "ar", "bg", "bn", "cs", "da", "de", "el", "en", "es", "et", "fa", "fi", "fr", "he",
    "hi", "hu", "id", "it", "ja", "ko", "lt", "lv", "ms", "nl", "no", "pl", "pt", "ro", "ru",
    "sk", "sl", "sv", "th", "tr", "uk", "vi", "zh", "zh-cn", "zh-tw",
];

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    data: GoogleData,
}

#[derive(Debug, Deserialize)]
struct GoogleData {
    translations: Vec<GoogleTranslation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleTranslation {
    translated_text: String,
    #[serde(default)]
    detected_source_language: Option<String>,
}

pub struct GoogleTranslator {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
}

impl GoogleTranslator {
    pub fn new(client: reqwest::Client, api_key: SecretString) -> Self {
        Self {
            client,
            api_key,
            endpoint: GOOGLE_API_URL.to_string(),
        }
    }

    pub fn supports_language(&self, lang: &str) -> bool {
        let lower = lang.to_lowercase();
        GOOGLE_LANGUAGES.contains(&lower.as_str())
            || GOOGLE_LANGUAGES.contains(&primary_subtag(&lower))
    }

    /// Google keeps region subtags for Chinese only ("zh-CN", "zh-TW");
    /// everything else collapses to the primary subtag.
    pub fn normalize_language(&self, lang: &str) -> String {
        let lower = lang.to_lowercase();
        match lower.as_str() {
            "zh-cn" | "zh-hans" => "zh-CN".to_string(),
            "zh-tw" | "zh-hant" => "zh-TW".to_string(),
            _ => primary_subtag(&lower).to_string(),
        }
    }

    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> TranslationResult {
        let mut body = serde_json::json!({
            "q": text,
            "target": self.normalize_language(target_lang),
            "format": "text",
        });
        if let Some(source) = source_lang {
            body["source"] = serde_json::Value::String(self.normalize_language(source));
        }

        let response = match self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.expose_secret())])
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Google Translate request failed");
                return TranslationResult::failed(format!("Google request failed: {}", e));
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!(status = status, "Google Translate returned an error status");
            return TranslationResult::failed(format!("Google HTTP {}", status));
        }

        match response.json::<GoogleResponse>().await {
            Ok(parsed) => match parsed.data.translations.into_iter().next() {
                Some(t) => TranslationResult::ok(t.translated_text, t.detected_source_language),
                None => TranslationResult::failed("Google returned no translations"),
            },
            Err(e) => TranslationResult::failed(format!("Google response decode failed: {}", e)),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

fn primary_subtag(lang: &str) -> &str {
    lang.split('-').next().unwrap_or(lang)
}
