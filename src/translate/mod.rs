//! Translation layer: pluggable providers behind one caching service.
//!
//! Providers form a closed set ([`Provider`]); the [`TranslationService`]
//! wraps whichever one is configured with a text-keyed cache so identical
//! titles across feeds cost one API call. Translation failures never
//! propagate; callers fall back to the untranslated text.

pub mod deepl;
pub mod google;
pub mod openai;

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use secrecy::SecretString;
use sha2::{Digest, Sha256};

use crate::cache::Cache;
use crate::config::{Config, TranslationProviderKind};

pub use deepl::DeepLTranslator;
pub use google::GoogleTranslator;
pub use openai::OpenAiTranslator;

/// Concurrent provider calls allowed during a batch translation
pub const DEFAULT_BATCH_CONCURRENCY: usize = 3;

/// Outcome of one translation request.
///
/// Always a value, never an error: a failed translation is a
/// `success = false` result with the reason in `error`.
#[derive(Debug, Clone, Default)]
pub struct TranslationResult {
    pub success: bool,
    pub translated_text: String,
    pub source_language: Option<String>,
    pub error: Option<String>,
    pub from_cache: bool,
}

impl TranslationResult {
    pub fn ok(translated_text: String, source_language: Option<String>) -> Self {
        Self {
            success: true,
            translated_text,
            source_language,
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    fn cached(translated_text: String) -> Self {
        Self {
            success: true,
            translated_text,
            from_cache: true,
            ..Default::default()
        }
    }
}

/// The closed set of translation backends.
pub enum Provider {
    DeepL(DeepLTranslator),
    Google(GoogleTranslator),
    OpenAi(OpenAiTranslator),
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::DeepL(_) => "deepl",
            Provider::Google(_) => "google",
            Provider::OpenAi(_) => "openai",
        }
    }

    pub fn supports_language(&self, lang: &str) -> bool {
        match self {
            Provider::DeepL(t) => t.supports_language(lang),
            Provider::Google(t) => t.supports_language(lang),
            Provider::OpenAi(t) => t.supports_language(lang),
        }
    }

    pub fn normalize_language(&self, lang: &str) -> String {
        match self {
            Provider::DeepL(t) => t.normalize_language(lang),
            Provider::Google(t) => t.normalize_language(lang),
            Provider::OpenAi(t) => t.normalize_language(lang),
        }
    }

    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> TranslationResult {
        match self {
            Provider::DeepL(t) => t.translate(text, target_lang, source_lang).await,
            Provider::Google(t) => t.translate(text, target_lang, source_lang).await,
            Provider::OpenAi(t) => t.translate(text, target_lang, source_lang).await,
        }
    }
}

/// Caching wrapper around a [`Provider`].
pub struct TranslationService {
    provider: Provider,
    cache: Option<Arc<Cache>>,
    cache_ttl: Duration,
}

impl TranslationService {
    pub fn new(provider: Provider, cache: Option<Arc<Cache>>, cache_ttl: Duration) -> Self {
        Self {
            provider,
            cache,
            cache_ttl,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn supports_language(&self, lang: &str) -> bool {
        self.provider.supports_language(lang)
    }

    /// `trans:{provider}:{target}:{sha256(text)[..16]}`
    fn cache_key(&self, text: &str, target_lang: &str) -> String {
        let digest = Sha256::digest(text.as_bytes());
        let hex = format!("{:x}", digest);
        format!("trans:{}:{}:{}", self.provider.name(), target_lang, &hex[..16])
    }

    /// Translates one text, consulting the cache first.
    ///
    /// Empty or whitespace-only input short-circuits to an empty success.
    /// Provider results are cached only on success.
    pub async fn translate(
        &self,
        text: &str,
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> TranslationResult {
        if text.trim().is_empty() {
            return TranslationResult::ok(String::new(), None);
        }

        let key = self.cache_key(text, target_lang);
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&key).await {
                tracing::debug!(key = %key, "Translation cache hit");
                return TranslationResult::cached(cached);
            }
        }

        let result = self.provider.translate(text, target_lang, source_lang).await;

        if result.success && !result.translated_text.is_empty() {
            if let Some(cache) = &self.cache {
                cache
                    .set(&key, &result.translated_text, Some(self.cache_ttl))
                    .await;
            }
        }

        result
    }

    /// Translates a batch under a bounded permit, preserving input order.
    pub async fn translate_batch(
        &self,
        texts: &[String],
        target_lang: &str,
        source_lang: Option<&str>,
    ) -> Vec<TranslationResult> {
        stream::iter(texts)
            .map(|text| self.translate(text, target_lang, source_lang))
            .buffered(DEFAULT_BATCH_CONCURRENCY)
            .collect()
            .await
    }
}

/// Builds the configured translation service, or `None` when translation is
/// disabled or the provider's credentials are missing.
pub fn from_config(
    config: &Config,
    client: &reqwest::Client,
    cache: Option<Arc<Cache>>,
) -> Option<TranslationService> {
    if !config.translation_enabled {
        tracing::debug!("Translation is disabled");
        return None;
    }

    let cache_ttl = Duration::from_secs(config.translation_cache_ttl_days * 24 * 3600);

    let provider = match config.translation_provider {
        TranslationProviderKind::Deepl => config.deepl_api_key.as_deref().map(|key| {
            Provider::DeepL(DeepLTranslator::new(client.clone(), SecretString::from(key)))
        }),
        TranslationProviderKind::Google => config.google_api_key.as_deref().map(|key| {
            Provider::Google(GoogleTranslator::new(client.clone(), SecretString::from(key)))
        }),
        TranslationProviderKind::Openai => config.openai_api_key.as_deref().map(|key| {
            Provider::OpenAi(OpenAiTranslator::new(
                client.clone(),
                SecretString::from(key),
                config.openai_model.clone(),
                config.openai_base_url.clone(),
            ))
        }),
    };

    match provider {
        Some(provider) => {
            tracing::info!(provider = provider.name(), "Translation service ready");
            Some(TranslationService::new(provider, cache, cache_ttl))
        }
        None => {
            tracing::warn!(
                provider = ?config.translation_provider,
                "Translation enabled but provider credentials are missing"
            );
            None
        }
    }
}
