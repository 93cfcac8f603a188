//! Pinning client
//!
//! Submits every file of a run to content-addressed storage with bounded
//! concurrency. Each file succeeds or fails on its own; the outcome of every
//! file ends up in the [`PinRecord`].

use crate::backend::{pin_backend, PinBackend};
use crate::config::PinConfig;
use crate::error::{ConfigError, PinError};
use futures::stream::{self, StreamExt};
use notary_artifact::{Artifact, ArtifactName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Default per-file timeout when none is configured
pub const DEFAULT_PIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of files in flight
pub const DEFAULT_PIN_CONCURRENCY: usize = 4;

/// Outcome of pinning a set of files
///
/// Serialized as `pins.json`. A name is in exactly one of the two maps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinRecord {
    /// Name to content identifier
    pub pinned: BTreeMap<ArtifactName, String>,
    /// Name to failure cause
    pub failed: BTreeMap<ArtifactName, String>,
}

impl PinRecord {
    /// Empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful pin, clearing any earlier failure
    pub fn record_pinned(&mut self, name: ArtifactName, cid: String) {
        self.failed.remove(&name);
        self.pinned.insert(name, cid);
    }

    /// Record a failed pin unless the file is already pinned
    pub fn record_failed(&mut self, name: ArtifactName, cause: &PinError) {
        if !self.pinned.contains_key(&name) {
            self.failed.insert(name, cause.to_string());
        }
    }

    /// Fold a later round into this record
    pub fn merge(&mut self, later: Self) {
        for (name, cid) in later.pinned {
            self.record_pinned(name, cid);
        }
        for (name, cause) in later.failed {
            if !self.pinned.contains_key(&name) {
                self.failed.insert(name, cause);
            }
        }
    }

    /// Content identifier of a pinned file
    #[must_use]
    pub fn cid(&self, name: &ArtifactName) -> Option<&str> {
        self.pinned.get(name).map(String::as_str)
    }

    /// Check if every submitted file was pinned
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of files accounted for
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.pinned.len() + self.failed.len()
    }

    /// Check if no file was submitted
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of one submission of a set of files
#[derive(Debug, Default)]
pub struct PinRound {
    /// Per-file outcome of this round
    pub record: PinRecord,
    /// Failed files that another attempt might pin
    pub retryable: Vec<Artifact>,
}

/// Pins files through a [`PinBackend`]
#[derive(Clone)]
pub struct PinClient {
    backend: Arc<dyn PinBackend>,
    timeout: Duration,
    concurrency: usize,
}

impl std::fmt::Debug for PinClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinClient")
            .field("backend", &self.backend.kind())
            .field("timeout", &self.timeout)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl PinClient {
    /// Create a client over a backend
    #[must_use]
    pub fn new(backend: Arc<dyn PinBackend>, timeout: Duration, concurrency: usize) -> Self {
        Self {
            backend,
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Create a client from an optional `[pin]` table
    ///
    /// # Errors
    /// Returns error if the backend cannot be constructed
    pub fn from_config(config: Option<&PinConfig>) -> Result<Self, ConfigError> {
        let (timeout, concurrency) = config.map_or(
            (DEFAULT_PIN_TIMEOUT, DEFAULT_PIN_CONCURRENCY),
            |c| (c.timeout(), c.concurrency),
        );
        Ok(Self::new(pin_backend(config)?, timeout, concurrency))
    }

    /// Backend label
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Pin one file under the per-file timeout
    ///
    /// # Errors
    /// Returns error if the backend fails or does not answer in time
    pub async fn pin_one(&self, artifact: &Artifact) -> Result<String, PinError> {
        tokio::time::timeout(
            self.timeout,
            self.backend.pin(artifact.name(), artifact.shared_content()),
        )
        .await
        .map_err(|_| PinError::Timeout(self.timeout))?
    }

    /// Submit every file once, returning each file with its outcome
    ///
    /// Outcomes arrive in completion order.
    pub async fn submit(&self, files: &[Artifact]) -> Vec<(Artifact, Result<String, PinError>)> {
        stream::iter(files)
            .map(|artifact| async move { (artifact.clone(), self.pin_one(artifact).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }

    /// Submit every file once
    ///
    /// Never fails as a whole: each file lands in `pinned` or `failed`, and
    /// failures worth another attempt are handed back in `retryable`.
    pub async fn pin(&self, files: &[Artifact]) -> PinRound {
        let mut round = PinRound::default();
        for (artifact, outcome) in self.submit(files).await {
            let name = artifact.name().clone();
            match outcome {
                Ok(cid) => {
                    tracing::debug!("pinned {} as {}", name, cid);
                    round.record.record_pinned(name, cid);
                }
                Err(e) => {
                    tracing::warn!("pin failed for {}: {}", name, e);
                    round.record.record_failed(name, &e);
                    if e.is_retryable() {
                        round.retryable.push(artifact);
                    }
                }
            }
        }
        round
    }
}
