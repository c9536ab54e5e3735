//! # edgequake-cv2profile
//!
//! Turn uploaded résumés into structured candidate profiles with an
//! applicant-tracking-system (ATS) assessment, using a chat-completion LLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! {documentId, subjectId}
//!  │
//!  ├─ 1. Fetch    download the document from the document store
//!  ├─ 2. Extract  PDF / DOCX / plain text → text (CPU-bound, worker pool)
//!  ├─ 3. Detect   dominant language, default when unsure
//!  ├─ 4. Model    system + user prompt → chat completion, 3 calls max
//!  ├─ 5. Parse    lenient JSON → profile, missing fields defaulted
//!  ├─ 6. Enrich   subject/document ids, language, model, timestamp
//!  └─ 7. Publish  outbound channel; refused = failed run
//! ```
//!
//! A run either publishes exactly one [`StructuredProfile`] or returns a
//! [`PipelineError`] naming the failed stage. Redelivery of failed events is
//! left to the caller; [`PipelineError::is_transient`] helps it decide.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_cv2profile::{ChannelPublisher, DocumentReference, PipelineConfig, ProfilePipeline};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .document_store_url("http://documents.internal/api/documents")
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .build()?;
//!     let (publisher, mut profiles) = ChannelPublisher::new("cv.profile.parsed", 16);
//!     let pipeline = ProfilePipeline::new(config, Arc::new(publisher))?;
//!
//!     pipeline.run(&DocumentReference::new(42, "candidate-7")).await?;
//!     let profile = profiles.recv().await.expect("published");
//!     println!("{}", serde_json::to_string_pretty(&profile)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cv2profile` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-cv2profile = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod prompts;
pub mod publish;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use document::{DocumentFormat, DocumentReference, ExtractedText, RawDocument};
pub use error::{
    Cv2ProfileError, ExtractionError, FetchError, ModelError, ParseError, PipelineError,
    PublishError, Stage, StageError,
};
pub use output::{ParsedProfile, ProcessingMetadata, StructuredProfile};
pub use pipeline::language::{DetectorState, LanguageDetector};
pub use pipeline::llm::{ChatTransport, HttpChatTransport, ModelReply, StructuredExtractionClient};
pub use pipeline::parse::ResultParser;
pub use process::ProfilePipeline;
pub use publish::{ChannelPublisher, ProfilePublisher, WebhookPublisher};
