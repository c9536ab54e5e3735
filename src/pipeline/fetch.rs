//! Document download from the document store.
//!
//! The body is consumed as a chunk stream and assembled into one buffer.
//! Status codes are classified here so later stages never see an HTTP
//! response: 404 is a missing document, other 4xx a refused request, 5xx a
//! store failure. This stage does not retry; redelivery of the whole event is
//! the caller's decision.

use crate::config::PipelineConfig;
use crate::document::RawDocument;
use crate::error::{Cv2ProfileError, FetchError};
use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, info};

/// Upper bound for the pre-allocation hinted by `Content-Length`.
const MAX_PREALLOC: usize = 32 * 1024 * 1024;

/// Downloads documents by id.
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl ContentFetcher {
    pub fn new(config: &PipelineConfig) -> Result<Self, Cv2ProfileError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()
            .map_err(Cv2ProfileError::HttpClient)?;
        Ok(Self::with_client(client, &config.document_store_url))
    }

    /// Use an existing client (shared connection pool).
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn download_url(&self, document_id: i64) -> String {
        format!("{}/{}/download", self.base_url, document_id)
    }

    /// Download the document with the given id.
    pub async fn fetch(&self, document_id: i64) -> Result<RawDocument, FetchError> {
        let url = self.download_url(document_id);
        info!("Downloading document {} from {}", document_id, url);

        let network = |source| FetchError::Network {
            document_id,
            source,
        };

        let response = self.client.get(&url).send().await.map_err(network)?;
        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_status(document_id, status, body));
        }

        let capacity = response
            .content_length()
            .map(|n| (n as usize).min(MAX_PREALLOC))
            .unwrap_or(0);
        let mut buffer = Vec::with_capacity(capacity);
        let mut chunks = 0usize;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(network)?;
            buffer.extend_from_slice(&chunk);
            chunks += 1;
        }

        if buffer.is_empty() {
            return Err(FetchError::EmptyContent { document_id });
        }

        debug!(
            "Document {}: {} bytes in {} chunks",
            document_id,
            buffer.len(),
            chunks
        );
        Ok(RawDocument::new(buffer))
    }
}

/// Map a non-2xx status to the matching [`FetchError`].
fn classify_status(document_id: i64, status: StatusCode, body: String) -> FetchError {
    if status == StatusCode::NOT_FOUND {
        FetchError::NotFound { document_id, body }
    } else if status.is_server_error() {
        FetchError::ServerError {
            document_id,
            status: status.as_u16(),
            body,
        }
    } else {
        // 4xx, and the odd 1xx/3xx that reqwest did not follow.
        FetchError::ClientError {
            document_id,
            status: status.as_u16(),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_url_template() {
        let f = ContentFetcher::with_client(reqwest::Client::new(), "http://store/api/docs/");
        assert_eq!(f.download_url(314), "http://store/api/docs/314/download");
    }

    #[test]
    fn classify_not_found() {
        let e = classify_status(1, StatusCode::NOT_FOUND, "nope".into());
        assert!(matches!(e, FetchError::NotFound { document_id: 1, ref body } if body == "nope"));
    }

    #[test]
    fn classify_client_error() {
        let e = classify_status(1, StatusCode::FORBIDDEN, "denied".into());
        assert!(matches!(e, FetchError::ClientError { status: 403, .. }));
    }

    #[test]
    fn classify_server_error() {
        let e = classify_status(1, StatusCode::BAD_GATEWAY, "upstream".into());
        assert!(matches!(e, FetchError::ServerError { status: 502, .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        // Port 9 (discard) on localhost is closed in CI sandboxes.
        let f = ContentFetcher::with_client(reqwest::Client::new(), "http://127.0.0.1:9");
        let err = f.fetch(1).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { document_id: 1, .. }), "got: {err:?}");
    }
}
