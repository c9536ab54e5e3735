//! One pipeline run per uploaded résumé.
//!
//! ```text
//! DocumentReference
//!  │
//!  ├─ 1. Fetch    download bytes from the document store
//!  ├─ 2. Extract  bytes → text (worker pool)
//!  ├─ 3. Detect   dominant language, default on doubt (worker pool)
//!  ├─ 4. Model    chat completion with retry/backoff
//!  ├─ 5. Parse    lenient JSON → ParsedProfile
//!  ├─ 6. Enrich   identity, detected language, metadata
//!  └─ 7. Publish  outbound channel, accept signal required
//! ```
//!
//! Stages run strictly in order and the first error ends the run. Nothing is
//! published unless every earlier stage succeeded, and every failure reaches
//! the caller as a [`PipelineError`] naming the stage it came from.

use crate::config::PipelineConfig;
use crate::document::DocumentReference;
use crate::error::{Cv2ProfileError, PipelineError, PublishError, Stage, StageError};
use crate::output::StructuredProfile;
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::fetch::ContentFetcher;
use crate::pipeline::language::LanguageDetector;
use crate::pipeline::llm::{ChatTransport, HttpChatTransport, StructuredExtractionClient};
use crate::pipeline::parse::ResultParser;
use crate::pipeline::workers::WorkerPool;
use crate::publish::ProfilePublisher;
use chrono::Utc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The document-to-profile pipeline.
///
/// Construct once per process and share it (`Arc`) across concurrent runs;
/// runs only share the read-only detector and the HTTP clients.
pub struct ProfilePipeline {
    config: PipelineConfig,
    fetcher: ContentFetcher,
    extractor: TextExtractor,
    detector: Arc<LanguageDetector>,
    detector_load: Mutex<Option<JoinHandle<bool>>>,
    model: StructuredExtractionClient,
    parser: ResultParser,
    publisher: Arc<dyn ProfilePublisher>,
}

impl std::fmt::Debug for ProfilePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilePipeline")
            .field("config", &self.config)
            .field("detector", &self.detector)
            .field("model", &self.model)
            .field("channel", &self.publisher.channel())
            .finish()
    }
}

impl ProfilePipeline {
    /// Build a pipeline talking HTTP to the configured chat endpoint.
    ///
    /// Must be called inside a Tokio runtime: the language model starts
    /// loading in the background immediately.
    pub fn new(
        config: PipelineConfig,
        publisher: Arc<dyn ProfilePublisher>,
    ) -> Result<Self, Cv2ProfileError> {
        let transport = Arc::new(HttpChatTransport::new(&config)?);
        Self::with_transport(config, transport, publisher)
    }

    /// Build a pipeline with a custom model transport.
    pub fn with_transport(
        config: PipelineConfig,
        transport: Arc<dyn ChatTransport>,
        publisher: Arc<dyn ProfilePublisher>,
    ) -> Result<Self, Cv2ProfileError> {
        let pool = WorkerPool::new(config.cpu_workers);
        let fetcher = ContentFetcher::new(&config)?;
        let detector = Arc::new(LanguageDetector::new(&config, pool.clone()));
        let detector_load = detector.spawn_load();
        let model = StructuredExtractionClient::new(transport, &config);

        Ok(Self {
            extractor: TextExtractor::new(pool),
            fetcher,
            detector,
            detector_load: Mutex::new(Some(detector_load)),
            model,
            parser: ResultParser::new(),
            publisher,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn detector(&self) -> &LanguageDetector {
        &self.detector
    }

    /// Wait for the background detector load to finish.
    ///
    /// Runs never need this; it exists for callers that want deterministic
    /// language detection from the very first document.
    pub async fn wait_for_detector(&self) -> bool {
        let handle = self.detector_load.lock().await.take();
        match handle {
            Some(handle) => handle.await.unwrap_or(false),
            None => self.detector.state() == crate::pipeline::language::DetectorState::Ready,
        }
    }

    /// Process one document end to end and publish the result.
    ///
    /// Returns the published profile. On error nothing was published.
    pub async fn run(&self, event: &DocumentReference) -> Result<StructuredProfile, PipelineError> {
        let stage = AtomicU8::new(Stage::Fetch as u8);
        let work = self.run_stages(event, &stage);

        match self.config.run_timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), work).await {
                Ok(result) => result,
                Err(_) => {
                    let at = Stage::from_u8(stage.load(Ordering::Acquire));
                    warn!(
                        "Document {}: run timed out after {}s during {} stage",
                        event.document_id, secs, at
                    );
                    Err(PipelineError::new(at, event.document_id, StageError::Timeout { secs }))
                }
            },
            None => work.await,
        }
    }

    async fn run_stages(
        &self,
        event: &DocumentReference,
        stage: &AtomicU8,
    ) -> Result<StructuredProfile, PipelineError> {
        let id = event.document_id;
        let enter = |s: Stage| stage.store(s as u8, Ordering::Release);
        let start = Instant::now();
        info!("Processing document {} for subject {}", id, event.subject_id);

        // ── Step 1: Fetch ────────────────────────────────────────────────
        enter(Stage::Fetch);
        let raw = self
            .fetcher
            .fetch(id)
            .await
            .map_err(|e| PipelineError::new(Stage::Fetch, id, e))?;

        // ── Step 2: Extract ──────────────────────────────────────────────
        enter(Stage::Extract);
        let text = self
            .extractor
            .extract(raw)
            .await
            .map_err(|e| PipelineError::new(Stage::Extract, id, e))?;

        // ── Step 3: Detect (never fails) ─────────────────────────────────
        enter(Stage::Detect);
        let language = self.detector.detect(text.as_str()).await;
        debug!("Document {}: language '{}'", id, language);

        // ── Step 4: Model ────────────────────────────────────────────────
        enter(Stage::Model);
        let reply = self
            .model
            .extract_profile(text.as_str(), &language)
            .await
            .map_err(|e| PipelineError::new(Stage::Model, id, e))?;

        // ── Step 5: Parse ────────────────────────────────────────────────
        enter(Stage::Parse);
        let parsed = self
            .parser
            .parse(&reply.content)
            .map_err(|e| PipelineError::new(Stage::Parse, id, e))?;

        // ── Step 6: Enrich ───────────────────────────────────────────────
        let profile =
            StructuredProfile::enrich(parsed, event, &language, self.model.model(), Utc::now());

        // ── Step 7: Publish ──────────────────────────────────────────────
        enter(Stage::Publish);
        let accepted = self
            .publisher
            .publish(&profile)
            .await
            .map_err(|e| PipelineError::new(Stage::Publish, id, e))?;
        if !accepted {
            return Err(PipelineError::new(
                Stage::Publish,
                id,
                PublishError::Rejected {
                    channel: self.publisher.channel().to_string(),
                    document_id: id,
                },
            ));
        }

        info!(
            "Document {} published to '{}' in {:?} (language {}, score {})",
            id,
            self.publisher.channel(),
            start.elapsed(),
            language,
            profile.profile.ats_analysis.overall_score
        );
        Ok(profile)
    }
}
