//! Configuration for the résumé extraction pipeline.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. The config is constructed once at process start
//! and handed to [`crate::ProfilePipeline::new`]; no stage reads environment
//! variables or global state on its own.
//!
//! # Design choice: builder over constructor
//! Most deployments only change the two endpoints, the API key and the model.
//! The builder lets callers set those and rely on documented defaults for the
//! remaining sampling and retry parameters.

use crate::error::Cv2ProfileError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default chat-completion endpoint (OpenAI-compatible).
pub const DEFAULT_CHAT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Default model identifier recorded in `aiMetadata.model`.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Configuration for a [`crate::ProfilePipeline`].
///
/// # Example
/// ```rust
/// use edgequake_cv2profile::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .document_store_url("http://documents.internal/api/documents")
///     .model("gpt-4.1-mini")
///     .default_language("fr")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Base URL of the document store. Documents are downloaded from
    /// `{document_store_url}/{documentId}/download`.
    pub document_store_url: String,

    /// Download timeout in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Full URL of the chat-completion endpoint.
    pub chat_endpoint: String,

    /// Bearer token for the chat-completion endpoint. `None` sends no
    /// `Authorization` header (local gateways, tests).
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Model identifier sent in the request and recorded in the metadata.
    pub model: String,

    /// Sampling temperature. Default: 0.3.
    ///
    /// Low enough that repeated runs on the same résumé give comparable
    /// scores, high enough that the free-text assessment does not read as
    /// boilerplate.
    pub temperature: f32,

    /// Response budget in tokens. Default: 4096.
    pub max_tokens: usize,

    /// Maximum characters of résumé text sent to the model. Default: 15 000.
    pub max_input_chars: usize,

    /// Retries after the first model call. Default: 2, so a document gets
    /// at most 3 calls.
    pub max_retries: u32,

    /// Initial backoff in milliseconds, doubled after each retry. Default: 3000.
    ///
    /// 3 s → 6 s. Rate-limit windows of hosted LLM APIs are typically
    /// measured in seconds, so sub-second backoff just burns attempts.
    pub retry_backoff_ms: u64,

    /// Per-request timeout for the model call in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Language code used whenever detection cannot give a confident answer.
    /// Default: "en".
    pub default_language: String,

    /// Two-letter codes the language detector may answer with.
    pub detector_languages: Vec<String>,

    /// Minimum detector confidence (0.0–1.0) for a detected language to be
    /// used instead of the default. Default: 0.5.
    pub min_language_confidence: f64,

    /// Characters of extracted text sampled for detection. Default: 1000.
    pub detection_sample_chars: usize,

    /// Concurrent CPU-bound jobs (parsing, language scoring). Default: 4.
    pub cpu_workers: usize,

    /// Deadline for a whole pipeline run in seconds. `None` disables it.
    pub run_timeout_secs: Option<u64>,

    /// Logical name of the outbound channel. Default: "cv.profile.parsed".
    pub output_channel: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            document_store_url: "http://localhost:8080/api/documents".to_string(),
            download_timeout_secs: 60,
            chat_endpoint: DEFAULT_CHAT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            max_tokens: 4096,
            max_input_chars: 15_000,
            max_retries: 2,
            retry_backoff_ms: 3_000,
            api_timeout_secs: 120,
            default_language: "en".to_string(),
            detector_languages: ["en", "fr", "de", "es", "it", "pt", "nl"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_language_confidence: 0.5,
            detection_sample_chars: 1000,
            cpu_workers: 4,
            run_timeout_secs: None,
            output_channel: "cv.profile.parsed".to_string(),
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("document_store_url", &self.document_store_url)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("chat_endpoint", &self.chat_endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_input_chars", &self.max_input_chars)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("default_language", &self.default_language)
            .field("detector_languages", &self.detector_languages)
            .field("cpu_workers", &self.cpu_workers)
            .field("run_timeout_secs", &self.run_timeout_secs)
            .field("output_channel", &self.output_channel)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn document_store_url(mut self, url: impl Into<String>) -> Self {
        self.config.document_store_url = url.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn chat_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.chat_endpoint = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.config.api_key = if key.trim().is_empty() { None } else { Some(key) };
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_input_chars(mut self, n: usize) -> Self {
        self.config.max_input_chars = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn default_language(mut self, code: impl Into<String>) -> Self {
        self.config.default_language = code.into().to_ascii_lowercase();
        self
    }

    pub fn detector_languages<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.detector_languages = codes
            .into_iter()
            .map(|c| c.into().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn min_language_confidence(mut self, c: f64) -> Self {
        self.config.min_language_confidence = c.clamp(0.0, 1.0);
        self
    }

    pub fn detection_sample_chars(mut self, n: usize) -> Self {
        self.config.detection_sample_chars = n.max(1);
        self
    }

    pub fn cpu_workers(mut self, n: usize) -> Self {
        self.config.cpu_workers = n.max(1);
        self
    }

    pub fn run_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.run_timeout_secs = secs;
        self
    }

    pub fn output_channel(mut self, name: impl Into<String>) -> Self {
        self.config.output_channel = name.into();
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, Cv2ProfileError> {
        let c = &self.config;
        for (name, url) in [
            ("document store URL", &c.document_store_url),
            ("chat endpoint", &c.chat_endpoint),
        ] {
            if reqwest::Url::parse(url).is_err() {
                return Err(Cv2ProfileError::InvalidConfig(format!(
                    "{name} is not a valid URL: '{url}'"
                )));
            }
        }
        if c.model.trim().is_empty() {
            return Err(Cv2ProfileError::InvalidConfig("Model must not be empty".into()));
        }
        if c.default_language.len() != 2 {
            return Err(Cv2ProfileError::InvalidConfig(format!(
                "Default language must be a two-letter code, got '{}'",
                c.default_language
            )));
        }
        if c.max_input_chars == 0 {
            return Err(Cv2ProfileError::InvalidConfig(
                "max_input_chars must be ≥ 1".into(),
            ));
        }
        if c.output_channel.trim().is_empty() {
            return Err(Cv2ProfileError::InvalidConfig(
                "Output channel name must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.temperature, 0.3);
        assert_eq!(c.max_tokens, 4096);
        assert_eq!(c.max_input_chars, 15_000);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.retry_backoff_ms, 3_000);
        assert_eq!(c.detection_sample_chars, 1000);
        assert_eq!(c.default_language, "en");
    }

    #[test]
    fn rejects_invalid_urls() {
        let err = PipelineConfig::builder()
            .chat_endpoint("not a url")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("chat endpoint"), "got: {err}");
    }

    #[test]
    fn rejects_bad_default_language() {
        assert!(PipelineConfig::builder()
            .default_language("french")
            .build()
            .is_err());
    }

    #[test]
    fn blank_api_key_means_none() {
        let c = PipelineConfig::builder().api_key("   ").build().unwrap();
        assert!(c.api_key.is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = PipelineConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
