//! Error types for the edgequake-cv2profile library.
//!
//! Each pipeline stage owns a small error enum describing exactly how that
//! stage can fail:
//!
//! * [`FetchError`]: downloading the document from the store
//! * [`ExtractionError`]: turning the document bytes into text
//! * [`ModelError`]: the chat-completion call, including retry exhaustion
//! * [`ParseError`]: the model answer is not a JSON object at all
//! * [`PublishError`]: the outbound channel refused or could not take the result
//!
//! At the orchestrator boundary every stage error is wrapped into a single
//! [`PipelineError`] that records the stage, the document and the cause. That
//! is the only error type a caller of [`crate::ProfilePipeline::run`] sees,
//! so the redelivery layer can make one decision for every failure mode.

use std::fmt;
use thiserror::Error;

/// Boxed error used where the cause comes from a third-party parser.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Fatal configuration errors raised by [`crate::PipelineConfigBuilder::build`].
#[derive(Debug, Error)]
pub enum Cv2ProfileError {
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

// ── Stage errors ─────────────────────────────────────────────────────────

/// Failure to retrieve a document from the document store.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The store answered 404 for this document id.
    #[error("Document {document_id} not found in document store: {body}")]
    NotFound { document_id: i64, body: String },

    /// Any other 4xx answer.
    #[error("Document store refused request for document {document_id} (HTTP {status}): {body}")]
    ClientError {
        document_id: i64,
        status: u16,
        body: String,
    },

    /// Any 5xx answer.
    #[error("Document store failed for document {document_id} (HTTP {status}): {body}")]
    ServerError {
        document_id: i64,
        status: u16,
        body: String,
    },

    /// 2xx with a zero-length body.
    #[error("Document {document_id} downloaded with an empty body")]
    EmptyContent { document_id: i64 },

    /// Timeout, connection reset, DNS or mid-stream read failure.
    #[error("Network error downloading document {document_id}: {source}")]
    Network {
        document_id: i64,
        #[source]
        source: reqwest::Error,
    },
}

/// Failure to turn document bytes into plain text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The buffer was empty; no parse was attempted.
    #[error("Cannot extract text from an empty document")]
    EmptyInput,

    /// The parser rejected the document.
    #[error("Failed to parse {format} document: {source}")]
    ParseFailure {
        format: &'static str,
        #[source]
        source: BoxError,
    },
}

/// Failure of the chat-completion stage.
#[derive(Debug, Error)]
pub enum ModelError {
    /// HTTP error status, or a 2xx answer with no usable content.
    #[error("LLM API error{}: {body}", status_suffix(.status))]
    ApiError { status: Option<u16>, body: String },

    /// Network-level I/O failure talking to the LLM endpoint.
    #[error("Network error calling LLM endpoint: {0}")]
    Network(#[source] reqwest::Error),

    /// The request could not be built; retrying would fail the same way.
    #[error("Invalid LLM request: {0}")]
    InvalidRequest(String),

    /// Every attempt failed with a transient error.
    #[error("LLM call failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ModelError>,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ModelError {
    /// Whether a retry may succeed without changing the input.
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::ApiError { .. } | ModelError::Network(_))
    }
}

/// The model answer could not be read as a JSON object.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Not syntactically valid JSON.
    #[error("Model answer is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Valid JSON, but the top-level value is not an object.
    #[error("Model answer is a JSON {found}, expected an object")]
    NotAnObject { found: &'static str },
}

/// The outbound channel did not take the enriched profile.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The channel explicitly refused the message.
    #[error("Channel '{channel}' rejected the profile for document {document_id}")]
    Rejected { channel: String, document_id: i64 },

    /// The channel could not be reached.
    #[error("Failed to deliver to channel '{channel}': {detail}")]
    Transport { channel: String, detail: String },

    /// The profile could not be serialised.
    #[error("Failed to serialise profile: {0}")]
    Serialize(#[source] serde_json::Error),
}

// ── Pipeline boundary ────────────────────────────────────────────────────

/// The stage a pipeline run was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Stage {
    Fetch = 0,
    Extract = 1,
    Detect = 2,
    Model = 3,
    Parse = 4,
    Publish = 5,
}

impl Stage {
    pub(crate) fn from_u8(v: u8) -> Stage {
        match v {
            0 => Stage::Fetch,
            1 => Stage::Extract,
            2 => Stage::Detect,
            3 => Stage::Model,
            4 => Stage::Parse,
            _ => Stage::Publish,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Detect => "detect",
            Stage::Model => "model",
            Stage::Parse => "parse",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Cause of a [`PipelineError`].
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The whole run exceeded the configured deadline.
    #[error("Pipeline run timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// The single failure type returned by a pipeline run.
#[derive(Debug, Error)]
#[error("Pipeline failed at {stage} stage for document {document_id}: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    pub document_id: i64,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(stage: Stage, document_id: i64, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            document_id,
            source: source.into(),
        }
    }

    /// Hint for the redelivery layer: `true` when redelivering the same event
    /// could plausibly succeed.
    ///
    /// Missing documents, unparseable files and model answers that are not
    /// JSON are deterministic and reported as permanent.
    pub fn is_transient(&self) -> bool {
        match &self.source {
            StageError::Fetch(FetchError::NotFound { .. })
            | StageError::Fetch(FetchError::ClientError { .. })
            | StageError::Fetch(FetchError::EmptyContent { .. }) => false,
            StageError::Fetch(_) => true,
            StageError::Extraction(_) => false,
            StageError::Model(ModelError::InvalidRequest(_)) => false,
            StageError::Model(_) => true,
            StageError::Parse(_) => false,
            StageError::Publish(PublishError::Serialize(_)) => false,
            StageError::Publish(_) => true,
            StageError::Timeout { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_with_status() {
        let e = ModelError::ApiError {
            status: Some(503),
            body: "overloaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("HTTP 503"), "got: {msg}");
        assert!(msg.contains("overloaded"));
    }

    #[test]
    fn api_error_display_without_status() {
        let e = ModelError::ApiError {
            status: None,
            body: "no choices".into(),
        };
        assert_eq!(e.to_string(), "LLM API error: no choices");
    }

    #[test]
    fn retries_exhausted_keeps_last_cause() {
        let e = ModelError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ModelError::ApiError {
                status: Some(500),
                body: "boom".into(),
            }),
        };
        assert!(e.to_string().contains("3 attempts"));
        let source = std::error::Error::source(&e).expect("has source");
        assert!(source.to_string().contains("boom"));
    }

    #[test]
    fn transient_classification() {
        assert!(ModelError::ApiError {
            status: Some(429),
            body: String::new()
        }
        .is_transient());
        assert!(!ModelError::InvalidRequest("bad url".into()).is_transient());
    }

    #[test]
    fn pipeline_error_names_stage_and_document() {
        let e = PipelineError::new(
            Stage::Fetch,
            42,
            FetchError::NotFound {
                document_id: 42,
                body: "missing".into(),
            },
        );
        let msg = e.to_string();
        assert!(msg.contains("fetch stage"), "got: {msg}");
        assert!(msg.contains("document 42"), "got: {msg}");
        assert!(!e.is_transient());
    }

    #[test]
    fn timeout_is_transient() {
        let e = PipelineError::new(Stage::Model, 7, StageError::Timeout { secs: 30 });
        assert!(e.is_transient());
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn stage_round_trips_through_u8() {
        for stage in [
            Stage::Fetch,
            Stage::Extract,
            Stage::Detect,
            Stage::Model,
            Stage::Parse,
            Stage::Publish,
        ] {
            assert_eq!(Stage::from_u8(stage as u8), stage);
        }
    }
}
