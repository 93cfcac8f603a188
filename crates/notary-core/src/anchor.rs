//! Anchor client
//!
//! Submits a Merkle root to the configured timestamping backend. One call
//! is one attempt under one timeout; the orchestrator decides whether to
//! try again.

use crate::backend::{anchor_backend, AnchorBackend};
use crate::config::AnchorConfig;
use crate::error::{AnchorError, ConfigError};
use chrono::{DateTime, Utc};
use notary_artifact::ContentDigest;
use std::sync::Arc;
use std::time::Duration;

/// Default per-attempt timeout when none is configured
pub const DEFAULT_ANCHOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Attestation returned for a root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorProof {
    /// Root the attestation was issued for
    pub root: ContentDigest,
    /// Backend that issued it
    pub backend: String,
    /// When the attestation was received
    pub anchored_at: DateTime<Utc>,
    /// Response body, verbatim JSON
    pub attestation: String,
}

/// Anchors roots through an [`AnchorBackend`]
#[derive(Clone)]
pub struct AnchorClient {
    backend: Arc<dyn AnchorBackend>,
    timeout: Duration,
}

impl std::fmt::Debug for AnchorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnchorClient")
            .field("backend", &self.backend.kind())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AnchorClient {
    /// Create a client over a backend
    #[must_use]
    pub fn new(backend: Arc<dyn AnchorBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Create a client from an optional `[anchor]` table
    ///
    /// # Errors
    /// Returns error if the backend cannot be constructed
    pub fn from_config(config: Option<&AnchorConfig>) -> Result<Self, ConfigError> {
        let timeout = config.map_or(DEFAULT_ANCHOR_TIMEOUT, AnchorConfig::timeout);
        Ok(Self::new(anchor_backend(config)?, timeout))
    }

    /// Backend label
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Per-attempt timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Submit `root` once
    ///
    /// # Errors
    /// Returns error if the backend fails, does not answer within the
    /// timeout, or answers with a body that is not JSON
    pub async fn anchor(&self, root: ContentDigest) -> Result<AnchorProof, AnchorError> {
        let body = tokio::time::timeout(self.timeout, self.backend.submit(root))
            .await
            .map_err(|_| AnchorError::Timeout(self.timeout))??;

        serde_json::from_str::<serde::de::IgnoredAny>(&body)
            .map_err(|e| AnchorError::MalformedResponse(e.to_string()))?;

        tracing::debug!("anchor backend {} attested root {}", self.kind(), root.short());
        Ok(AnchorProof {
            root,
            backend: self.kind().to_string(),
            anchored_at: Utc::now(),
            attestation: body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockAnchorBackend;
    use async_trait::async_trait;

    fn mock_returning(result: Result<String, AnchorError>) -> Arc<dyn AnchorBackend> {
        let mut mock = MockAnchorBackend::new();
        mock.expect_kind().return_const("mock");
        mock.expect_submit().times(1).returning(move |_| result.clone());
        Arc::new(mock)
    }

    struct Stalled;

    #[async_trait]
    impl AnchorBackend for Stalled {
        fn kind(&self) -> &'static str {
            "stalled"
        }

        async fn submit(&self, _root: ContentDigest) -> Result<String, AnchorError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("{}".into())
        }
    }

    #[tokio::test]
    async fn returns_body_verbatim() {
        let body = r#"{ "receipt": "abc",  "ts": 1 }"#.to_string();
        let client = AnchorClient::new(mock_returning(Ok(body.clone())), Duration::from_secs(1));
        let root = ContentDigest::compute(b"root");

        let proof = client.anchor(root).await.unwrap();
        assert_eq!(proof.root, root);
        assert_eq!(proof.attestation, body);
        assert_eq!(proof.backend, "mock");
    }

    #[tokio::test]
    async fn non_json_body_is_malformed() {
        let client = AnchorClient::new(mock_returning(Ok("OK".into())), Duration::from_secs(1));
        let err = client.anchor(ContentDigest::compute(b"r")).await.unwrap_err();
        assert!(matches!(err, AnchorError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn backend_error_passes_through() {
        let status = AnchorError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        let client = AnchorClient::new(mock_returning(Err(status.clone())), Duration::from_secs(1));
        assert_eq!(client.anchor(ContentDigest::compute(b"r")).await, Err(status));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let client = AnchorClient::new(Arc::new(Stalled), Duration::from_millis(50));
        let err = client.anchor(ContentDigest::compute(b"r")).await.unwrap_err();
        assert_eq!(err, AnchorError::Timeout(Duration::from_millis(50)));
    }

    #[test]
    fn disabled_without_config() {
        let client = AnchorClient::from_config(None).unwrap();
        assert_eq!(client.kind(), "disabled");
        assert_eq!(client.timeout(), DEFAULT_ANCHOR_TIMEOUT);
    }
}
