//! DeepL translation backend.
//!
//! Drives the DeepL REST API directly. Free-tier keys (suffix `:fx`) are
//! routed to the `api-free` host, paid keys to the main host.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::TranslationResult;

const DEEPL_API_URL: &str = "https://api.deepl.com/v2/translate";
const DEEPL_FREE_API_URL: &str = "https://api-free.deepl.com/v2/translate";

/// Language codes DeepL accepts as targets, keyed by lowercase BCP-47-ish
/// input.
const DEEPL_LANGUAGES: &[(&str, &str)] = &[
    ("bg", "BG"),
    ("cs", "CS"),
    ("da", "DA"),
    ("de", "DE"),
    ("el", "EL"),
    ("en", "EN"),
    ("en-gb", "EN-GB"),
    ("en-us", "EN-US"),
    ("es", "ES"),
    ("et", "ET"),
    ("fi", "FI"),
    ("fr", "FR"),
    ("hu", "HU"),
    ("id", "ID"),
    ("it", "IT"),
    ("ja", "JA"),
    ("ko", "KO"),
    ("lt", "LT"),
    ("lv", "LV"),
    ("nb", "NB"),
    ("nl", "NL"),
    ("pl", "PL"),
    ("pt", "PT"),
    ("pt-br", "PT-BR"),
    ("pt-pt", "PT-PT"),
    ("ro", "RO"),
    ("ru", "RU"),
    ("sk", "SK"),
    ("sl", "SL"),
    ("sv", "SV"),
    ("tr", "TR"),
    ("uk", "UK"),
    ("zh", "ZH"),
    ("zh-cn", "ZH"),
    ("zh-hans", "ZH"),
];

#[derive(Debug, Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Debug, Deserialize)]
struct DeepLTranslation {
    #[serde(default)]
    detected_source_language: Option<String>,
    text: String,
}

pub struct DeepLTranslator {
    client: reqwest::Client,
    api_key: SecretString,
    endpoint: String,
}

impl DeepLTranslator {
    pub fn new(client: reqwest::Client, api_key: SecretString) -> Self {
        let endpoint = if api_key.expose_secret().ends_with(":fx") {
            DEEPL_FREE_API_URL
        } else {
            DEEPL_API_URL
        };
        Self {
            client,
            api_key,
            endpoint: endpoint.to_string(),
        }
    }

    pub fn supports_language(&self, lang: &str) -> bool {
        let lang = lang.to_lowercase();
        DEEPL_LANGUAGES.iter().any(|(code, _)| *code == lang)
    }

    /// Maps a BCP-47-ish code to DeepL's uppercase form ("zh-CN" → "ZH").
    pub fn normalize_language(&self, lang: &str) -> String {
        let lower = lang.to_lowercase();
        DEEPL_LANGUAGES
            .iter()
            .find(|(code, _)| *code == lower)
            .map(|(_, deepl)| (*deepl).to_string())
            .unwrap_or_else(|| lower.to_uppercase())
    }

    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> TranslationResult {
        let mut body = serde_json::json!({
            "text": [text],
            "target_lang": self.normalize_language(target_lang),
        });
        if let Some(source) = source_lang {
            body["source_lang"] = serde_json::Value::String(self.normalize_language(source));
        }

        let response = match self
            .client
            .post(&self.endpoint)
            .header(
                "Authorization",
                format!("DeepL-Auth-Key {}", self.api_key.expose_secret()),
            )
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "DeepL request failed");
                return TranslationResult::failed(format!("DeepL request failed: {}", e));
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::warn!(status = status, "DeepL returned an error status");
            return TranslationResult::failed(format!("DeepL HTTP {}", status));
        }

        match response.json::<DeepLResponse>().await {
            Ok(parsed) => match parsed.translations.into_iter().next() {
                Some(t) => TranslationResult::ok(t.text, t.detected_source_language),
                None => TranslationResult::failed("DeepL returned no translations"),
            },
            Err(e) => TranslationResult::failed(format!("DeepL response decode failed: {}", e)),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn translator(endpoint: &str) -> DeepLTranslator {
        DeepLTranslator::new(reqwest::Client::new(), SecretString::from("key:fx"))
            .with_endpoint(endpoint)
    }

    #[test]
    fn test_language_normalization() {
        let t = DeepLTranslator::new(reqwest::Client::new(), SecretString::from("k"));
        assert_eq!(t.normalize_language("zh-CN"), "ZH");
        assert_eq!(t.normalize_language("en-us"), "EN-US");
        assert_eq!(t.normalize_language("xx"), "XX");
        assert!(t.supports_language("ja"));
        assert!(!t.supports_language("tlh"));
    }

    #[test]
    fn test_free_key_routes_to_free_host() {
        let free = DeepLTranslator::new(reqwest::Client::new(), SecretString::from("abc:fx"));
        assert_eq!(free.endpoint, DEEPL_FREE_API_URL);
        let paid = DeepLTranslator::new(reqwest::Client::new(), SecretString::from("abc"));
        assert_eq!(paid.endpoint, DEEPL_API_URL);
    }

    #[tokio::test]
    async fn test_translate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/translate"))
            .and(header("Authorization", "DeepL-Auth-Key key:fx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "translations": [{"detected_source_language": "EN", "text": "你好世界"}]
            })))
            .mount(&server)
            .await;

        let result = translator(&format!("{}/v2/translate", server.uri()))
            .translate("Hello World", "zh-CN", None)
            .await;

        assert!(result.success);
        assert_eq!(result.translated_text, "你好世界");
        assert_eq!(result.source_language.as_deref(), Some("EN"));
    }

    #[tokio::test]
    async fn test_translate_http_error_is_soft() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(456)) // DeepL quota-exceeded status
            .mount(&server)
            .await;

        let result = translator(&format!("{}/v2/translate", server.uri()))
            .translate("Hello", "ja", None)
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("456"));
    }
}
