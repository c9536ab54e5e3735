//! Outbound delivery of enriched profiles.
//!
//! A [`ProfilePublisher`] answers with an accept signal: `Ok(true)` when the
//! channel took the profile, `Ok(false)` when it explicitly refused it, and
//! `Err` when it could not be reached at all. The pipeline turns `Ok(false)`
//! into [`PublishError::Rejected`].

use crate::error::PublishError;
use crate::output::StructuredProfile;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A named outbound channel for structured profiles.
#[async_trait]
pub trait ProfilePublisher: Send + Sync {
    /// Logical channel name, e.g. `cv.profile.parsed`.
    fn channel(&self) -> &str;

    /// Hand `profile` to the channel. Returns whether it was accepted.
    async fn publish(&self, profile: &StructuredProfile) -> Result<bool, PublishError>;
}

// ── In-process channel ───────────────────────────────────────────────────

/// Publishes into a bounded `tokio` mpsc queue.
///
/// A dropped receiver refuses every further profile.
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    name: String,
    sender: mpsc::Sender<StructuredProfile>,
}

impl ChannelPublisher {
    /// Create a publisher and the receiving end of its queue.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<StructuredProfile>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                name: name.into(),
                sender,
            },
            receiver,
        )
    }
}

#[async_trait]
impl ProfilePublisher for ChannelPublisher {
    fn channel(&self) -> &str {
        &self.name
    }

    async fn publish(&self, profile: &StructuredProfile) -> Result<bool, PublishError> {
        match self.sender.send(profile.clone()).await {
            Ok(()) => {
                debug!("Profile for document {} queued on '{}'", profile.document_id, self.name);
                Ok(true)
            }
            Err(_) => {
                warn!("Channel '{}' is closed", self.name);
                Ok(false)
            }
        }
    }
}

// ── Webhook ──────────────────────────────────────────────────────────────

/// Header carrying the logical channel name on webhook deliveries.
pub const CHANNEL_HEADER: &str = "X-Channel";

/// POSTs each profile as JSON to a fixed URL.
///
/// | Response            | Result                       |
/// |---------------------|------------------------------|
/// | 2xx                 | `Ok(true)`                   |
/// | 4xx                 | `Ok(false)`                  |
/// | 5xx, network error  | `Err(PublishError::Transport)` |
#[derive(Debug, Clone)]
pub struct WebhookPublisher {
    client: reqwest::Client,
    url: String,
    name: String,
}

impl WebhookPublisher {
    pub fn new(
        url: impl Into<String>,
        channel: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, crate::error::Cv2ProfileError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(crate::error::Cv2ProfileError::HttpClient)?;
        Ok(Self::with_client(client, url, channel))
    }

    pub fn with_client(
        client: reqwest::Client,
        url: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            name: channel.into(),
        }
    }
}

#[async_trait]
impl ProfilePublisher for WebhookPublisher {
    fn channel(&self) -> &str {
        &self.name
    }

    async fn publish(&self, profile: &StructuredProfile) -> Result<bool, PublishError> {
        let payload = serde_json::to_vec(profile).map_err(PublishError::Serialize)?;
        let transport = |detail: String| PublishError::Transport {
            channel: self.name.clone(),
            detail,
        };

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(CHANNEL_HEADER, &self.name)
            .body(payload)
            .send()
            .await
            .map_err(|e| transport(format!("network error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            debug!("Profile for document {} delivered to {}", profile.document_id, self.url);
            Ok(true)
        } else if status.is_server_error() {
            Err(transport(format!("server error: {status}")))
        } else {
            let body = response.text().await.unwrap_or_default();
            warn!("Webhook refused document {} ({}): {}", profile.document_id, status, body);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentReference;
    use crate::output::ParsedProfile;
    use chrono::Utc;

    fn profile() -> StructuredProfile {
        StructuredProfile::enrich(
            ParsedProfile::default(),
            &DocumentReference::new(3, "subject-3"),
            "en",
            "test-model",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn channel_delivers_to_receiver() {
        let (publisher, mut rx) = ChannelPublisher::new("cv.profile.parsed", 4);
        assert_eq!(publisher.channel(), "cv.profile.parsed");
        assert!(publisher.publish(&profile()).await.unwrap());
        let got = rx.recv().await.unwrap();
        assert_eq!(got.subject_id, "subject-3");
    }

    #[tokio::test]
    async fn closed_channel_refuses() {
        let (publisher, rx) = ChannelPublisher::new("out", 1);
        drop(rx);
        assert!(!publisher.publish(&profile()).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_webhook_is_transport_error() {
        let publisher =
            WebhookPublisher::with_client(reqwest::Client::new(), "http://127.0.0.1:9/hook", "out");
        let err = publisher.publish(&profile()).await.unwrap_err();
        assert!(matches!(err, PublishError::Transport { ref channel, .. } if channel == "out"));
    }
}
