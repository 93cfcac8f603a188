use super::{http_client, AnchorBackend};
use crate::error::{AnchorError, ConfigError};
use async_trait::async_trait;
use notary_artifact::ContentDigest;
use serde::Serialize;

/// Request body: `{"hashes": ["<hex-root>"]}`
#[derive(Debug, Serialize)]
struct AnchorRequest<'a> {
    hashes: [&'a str; 1],
}

/// Anchors roots by POSTing them to a JSON timestamping endpoint
#[derive(Debug, Clone)]
pub struct HttpAnchorBackend {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpAnchorBackend {
    /// Create a backend for `endpoint`
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be constructed
    pub fn new(endpoint: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            endpoint: endpoint.trim().to_string(),
            client: http_client()?,
        })
    }
}

#[async_trait]
impl AnchorBackend for HttpAnchorBackend {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn submit(&self, root: ContentDigest) -> Result<String, AnchorError> {
        let hex = root.to_hex();
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&AnchorRequest { hashes: [&hex] })
            .send()
            .await
            .map_err(|e| AnchorError::Unreachable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AnchorError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            return Err(AnchorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}
