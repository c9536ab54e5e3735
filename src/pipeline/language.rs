//! Language detection for extracted résumé text.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──spawn_load() ok──▶ Ready
//!       │
//!       └── load failure: logged, stays Uninitialized for the process lifetime
//! ```
//!
//! The model is built in the background at process start. [`LanguageDetector::detect`]
//! checks readiness synchronously and answers with the configured default
//! while the model is not there, so no pipeline run ever waits on the load.
//!
//! ## Fallback rules
//!
//! `detect` never fails. It returns the default code when the detector is
//! not ready, when the sample is blank, when the confidence is below the
//! configured threshold, when the detected language has no two-letter code,
//! or when the scoring job itself fails.

use crate::config::PipelineConfig;
use crate::pipeline::workers::WorkerPool;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use whatlang::{Detector, Lang};

/// Observable state of the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Uninitialized,
    Ready,
}

/// Trigram language identifier restricted to an allowlist.
pub struct LanguageDetector {
    model: OnceLock<Arc<Detector>>,
    languages: Vec<String>,
    default_language: String,
    min_confidence: f64,
    sample_chars: usize,
    pool: WorkerPool,
}

impl std::fmt::Debug for LanguageDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageDetector")
            .field("state", &self.state())
            .field("languages", &self.languages)
            .field("default_language", &self.default_language)
            .field("min_confidence", &self.min_confidence)
            .finish()
    }
}

impl LanguageDetector {
    /// Create an uninitialised detector. Call [`spawn_load`](Self::spawn_load)
    /// to build the model.
    pub fn new(config: &PipelineConfig, pool: WorkerPool) -> Self {
        Self {
            model: OnceLock::new(),
            languages: config.detector_languages.clone(),
            default_language: config.default_language.clone(),
            min_confidence: config.min_language_confidence,
            sample_chars: config.detection_sample_chars,
            pool,
        }
    }

    pub fn state(&self) -> DetectorState {
        if self.model.get().is_some() {
            DetectorState::Ready
        } else {
            DetectorState::Uninitialized
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Build the model on the worker pool in the background.
    ///
    /// The returned handle resolves to `true` once the detector is `Ready`.
    /// Awaiting it is optional.
    pub fn spawn_load(self: &Arc<Self>) -> JoinHandle<bool> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let codes = this.languages.clone();
            match this.pool.run(move || build_model(&codes)).await {
                Ok(Ok(detector)) => {
                    // A second load racing the first keeps the first model.
                    let _ = this.model.set(Arc::new(detector));
                    info!("Language detector ready ({} languages)", this.languages.len());
                    true
                }
                Ok(Err(reason)) => {
                    error!(
                        "Language detector failed to load: {reason}; using '{}' for every document",
                        this.default_language
                    );
                    false
                }
                Err(e) => {
                    error!("Language detector load task failed: {e}");
                    false
                }
            }
        })
    }

    /// Best-guess two-letter language code of `sample`.
    pub async fn detect(&self, sample: &str) -> String {
        let Some(model) = self.model.get() else {
            debug!("Language detector not ready, using default '{}'", self.default_language);
            return self.default_language.clone();
        };
        if sample.trim().is_empty() {
            return self.default_language.clone();
        }

        let head: String = sample.chars().take(self.sample_chars).collect();
        let model = Arc::clone(model);
        let min_confidence = self.min_confidence;

        let detected = self
            .pool
            .run(move || score(&model, &head, min_confidence))
            .await
            .unwrap_or_else(|e| {
                error!("Language scoring task failed: {e}");
                None
            });

        match detected {
            Some(code) => code.to_string(),
            None => self.default_language.clone(),
        }
    }
}

fn build_model(codes: &[String]) -> Result<Detector, String> {
    if codes.is_empty() {
        return Err("no languages configured".to_string());
    }
    let langs = codes
        .iter()
        .map(|c| lang_from_iso639_1(c).ok_or_else(|| format!("unsupported language code '{c}'")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Detector::with_allowlist(langs))
}

fn score(detector: &Detector, text: &str, min_confidence: f64) -> Option<&'static str> {
    let info = detector.detect(text)?;
    debug!(
        "Detected {:?} with confidence {:.2}",
        info.lang(),
        info.confidence()
    );
    if info.confidence() < min_confidence {
        return None;
    }
    iso639_1(info.lang())
}

/// Two-letter codes supported in the allowlist.
const LANGUAGES: &[(&str, Lang)] = &[
    ("en", Lang::Eng),
    ("fr", Lang::Fra),
    ("de", Lang::Deu),
    ("es", Lang::Spa),
    ("it", Lang::Ita),
    ("pt", Lang::Por),
    ("nl", Lang::Nld),
    ("pl", Lang::Pol),
    ("ru", Lang::Rus),
    ("uk", Lang::Ukr),
    ("sv", Lang::Swe),
    ("da", Lang::Dan),
    ("fi", Lang::Fin),
    ("cs", Lang::Ces),
    ("ro", Lang::Ron),
    ("tr", Lang::Tur),
    ("ar", Lang::Ara),
    ("zh", Lang::Cmn),
    ("ja", Lang::Jpn),
];

fn lang_from_iso639_1(code: &str) -> Option<Lang> {
    LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, l)| *l)
}

fn iso639_1(lang: Lang) -> Option<&'static str> {
    LANGUAGES.iter().find(|(_, l)| *l == lang).map(|(c, _)| *c)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRENCH: &str = "Ingénieur logiciel passionné avec plus de dix ans d'expérience dans \
        le développement d'applications web et mobiles. J'ai dirigé une équipe de six \
        développeurs et mis en place une architecture de microservices pour une grande \
        entreprise de la distribution. Je maîtrise la conception de bases de données et \
        l'intégration continue.";

    const ENGLISH: &str = "Experienced software engineer with a strong background in distributed \
        systems and cloud infrastructure. I led a team of six developers and designed a \
        microservice architecture for a large retail company. Skilled in database design, \
        continuous integration and mentoring junior engineers.";

    fn detector(config: PipelineConfig) -> Arc<LanguageDetector> {
        Arc::new(LanguageDetector::new(&config, WorkerPool::new(2)))
    }

    async fn ready(config: PipelineConfig) -> Arc<LanguageDetector> {
        let d = detector(config);
        assert!(d.spawn_load().await.unwrap());
        assert_eq!(d.state(), DetectorState::Ready);
        d
    }

    #[tokio::test]
    async fn uninitialized_returns_default() {
        let d = detector(PipelineConfig::builder().default_language("de").build().unwrap());
        assert_eq!(d.state(), DetectorState::Uninitialized);
        assert_eq!(d.detect(FRENCH).await, "de");
    }

    #[tokio::test]
    async fn detects_french_and_english() {
        let d = ready(PipelineConfig::default()).await;
        assert_eq!(d.detect(FRENCH).await, "fr");
        assert_eq!(d.detect(ENGLISH).await, "en");
    }

    #[tokio::test]
    async fn blank_sample_returns_default() {
        let d = ready(PipelineConfig::builder().default_language("fr").build().unwrap()).await;
        assert_eq!(d.detect("").await, "fr");
        assert_eq!(d.detect("   \n\t ").await, "fr");
    }

    #[tokio::test]
    async fn low_confidence_returns_default() {
        // Above any confidence the detector can report.
        let config = PipelineConfig {
            default_language: "es".into(),
            min_language_confidence: 1.01,
            ..PipelineConfig::default()
        };
        let d = ready(config).await;
        assert_eq!(d.detect(FRENCH).await, "es");
    }

    #[tokio::test]
    async fn load_failure_stays_uninitialized() {
        let config = PipelineConfig::builder()
            .detector_languages(["en", "xx"])
            .default_language("en")
            .build()
            .unwrap();
        let d = detector(config);
        assert!(!d.spawn_load().await.unwrap());
        assert_eq!(d.state(), DetectorState::Uninitialized);
        assert_eq!(d.detect(FRENCH).await, "en");
    }

    #[tokio::test]
    async fn only_the_sample_head_is_scored() {
        // French head, long English tail: a 300-char sample sees only French.
        let text = format!("{FRENCH} {}", ENGLISH.repeat(20));
        let config = PipelineConfig::builder()
            .detection_sample_chars(300)
            .build()
            .unwrap();
        let d = ready(config).await;
        assert_eq!(d.detect(&text).await, "fr");
    }

    #[test]
    fn iso_codes_map_both_ways() {
        assert_eq!(lang_from_iso639_1("FR"), Some(Lang::Fra));
        assert_eq!(iso639_1(Lang::Deu), Some("de"));
        assert_eq!(lang_from_iso639_1("xx"), None);
    }
}
