//! Anchor and pin backends
//!
//! Each external service is a capability trait. [`anchor_backend`] and
//! [`pin_backend`] pick an implementation from configuration; a missing
//! config table yields a disabled backend so the pipeline never branches on
//! what is configured.

mod http;
mod ipfs;
mod local;

pub use http::HttpAnchorBackend;
pub use ipfs::IpfsPinBackend;
pub use local::LocalPinBackend;

use crate::config::{AnchorConfig, AnchorKind, PinBackendConfig, PinConfig};
use crate::error::{AnchorError, ConfigError, PinError};
use async_trait::async_trait;
use notary_artifact::{ArtifactName, ContentDigest};
use std::sync::Arc;

/// User agent sent by HTTP backends
pub(crate) const USER_AGENT: &str = concat!("evidence-notary/", env!("CARGO_PKG_VERSION"));

/// Timestamping service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnchorBackend: Send + Sync {
    /// Short backend label for logs and the status file
    fn kind(&self) -> &'static str;

    /// Submit a root digest, returning the raw attestation body
    async fn submit(&self, root: ContentDigest) -> Result<String, AnchorError>;
}

/// Content-addressed storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PinBackend: Send + Sync {
    /// Short backend label for logs and the status file
    fn kind(&self) -> &'static str;

    /// Store one file, returning its content identifier
    async fn pin(&self, name: &ArtifactName, content: Arc<[u8]>) -> Result<String, PinError>;
}

/// Anchor backend used when no `[anchor]` table is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAnchor;

#[async_trait]
impl AnchorBackend for DisabledAnchor {
    fn kind(&self) -> &'static str {
        "disabled"
    }

    async fn submit(&self, _root: ContentDigest) -> Result<String, AnchorError> {
        Err(AnchorError::Disabled)
    }
}

/// Pin backend used when no `[pin]` table is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPin;

#[async_trait]
impl PinBackend for DisabledPin {
    fn kind(&self) -> &'static str {
        "disabled"
    }

    async fn pin(&self, _name: &ArtifactName, _content: Arc<[u8]>) -> Result<String, PinError> {
        Err(PinError::Disabled)
    }
}

/// Build the anchor backend for a configuration
///
/// # Errors
/// Returns error if the HTTP client cannot be constructed
pub fn anchor_backend(config: Option<&AnchorConfig>) -> Result<Arc<dyn AnchorBackend>, ConfigError> {
    let Some(config) = config else {
        return Ok(Arc::new(DisabledAnchor));
    };
    match config.kind {
        AnchorKind::Http => Ok(Arc::new(HttpAnchorBackend::new(&config.endpoint)?)),
    }
}

/// Build the pin backend for a configuration
///
/// # Errors
/// Returns error if the HTTP client cannot be constructed
pub fn pin_backend(config: Option<&PinConfig>) -> Result<Arc<dyn PinBackend>, ConfigError> {
    let Some(config) = config else {
        return Ok(Arc::new(DisabledPin));
    };
    match &config.backend {
        PinBackendConfig::Ipfs { endpoint } => Ok(Arc::new(IpfsPinBackend::new(endpoint)?)),
        PinBackendConfig::Local { dir } => Ok(Arc::new(LocalPinBackend::new(dir.clone()))),
    }
}

/// Build a shared HTTP client
pub(crate) fn http_client() -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_tables_give_disabled_backends() {
        let anchor = anchor_backend(None).unwrap();
        assert_eq!(anchor.kind(), "disabled");
        assert_eq!(
            anchor.submit(ContentDigest::compute(b"x")).await,
            Err(AnchorError::Disabled)
        );

        let pin = pin_backend(None).unwrap();
        let name = ArtifactName::new("a.csv").unwrap();
        assert_eq!(pin.pin(&name, Arc::from(&b"a"[..])).await, Err(PinError::Disabled));
    }

    #[test]
    fn factory_selects_by_kind() {
        let anchor = anchor_backend(Some(&AnchorConfig::http("http://127.0.0.1:1/anchor"))).unwrap();
        assert_eq!(anchor.kind(), "http");

        let ipfs = pin_backend(Some(&PinConfig::ipfs("http://127.0.0.1:5001"))).unwrap();
        assert_eq!(ipfs.kind(), "ipfs");

        let local = pin_backend(Some(&PinConfig::local("/tmp/cas"))).unwrap();
        assert_eq!(local.kind(), "local");
    }
}
