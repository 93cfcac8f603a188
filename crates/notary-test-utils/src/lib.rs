//! Testing utilities for the evidence notary workspace
//!
//! Fake anchor and pin backends with scripted behaviour, plus temporary
//! artifact directories.

#![allow(missing_docs)]

use async_trait::async_trait;
use notary_artifact::{ArtifactName, ArtifactSet, ContentDigest};
use notary_core::{
    AnchorBackend, AnchorClient, AnchorError, EvidenceStore, Notary, PinBackend, PinClient, PinError,
    RetryPolicy,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Timeout used by [`notary_with`]; fakes that stall sleep far longer
pub const TEST_TIMEOUT: Duration = Duration::from_millis(200);

const STALL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
enum AnchorScript {
    Respond(String),
    Fail(AnchorError),
    Stall,
}

/// Anchor backend that answers from a script and records submitted roots
#[derive(Debug)]
pub struct FakeAnchor {
    script: AnchorScript,
    calls: Mutex<Vec<ContentDigest>>,
}

impl FakeAnchor {
    fn with_script(script: AnchorScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers every submission with `body`
    pub fn responding(body: &str) -> Arc<Self> {
        Self::with_script(AnchorScript::Respond(body.to_string()))
    }

    /// Answers with a small receipt naming the root
    pub fn ok() -> Arc<Self> {
        Self::responding(r#"{"status":"accepted"}"#)
    }

    /// Fails every submission with `err`
    pub fn failing(err: AnchorError) -> Arc<Self> {
        Self::with_script(AnchorScript::Fail(err))
    }

    /// Never answers within any test timeout
    pub fn stalled() -> Arc<Self> {
        Self::with_script(AnchorScript::Stall)
    }

    /// Roots submitted so far
    pub fn calls(&self) -> Vec<ContentDigest> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AnchorBackend for FakeAnchor {
    fn kind(&self) -> &'static str {
        "fake"
    }

    async fn submit(&self, root: ContentDigest) -> Result<String, AnchorError> {
        self.calls.lock().push(root);
        match &self.script {
            AnchorScript::Respond(body) => Ok(body.clone()),
            AnchorScript::Fail(err) => Err(err.clone()),
            AnchorScript::Stall => {
                tokio::time::sleep(STALL).await;
                Ok("{}".to_string())
            }
        }
    }
}

/// Pin backend that pins everything except scripted failures
///
/// Identifiers are `fake:<sha256-hex>` of the content.
#[derive(Debug, Default)]
pub struct FakePin {
    fail: BTreeSet<String>,
    stall: BTreeSet<String>,
    calls: AtomicUsize,
}

impl FakePin {
    /// Pins every file
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects `name` with a server error on every attempt
    #[must_use]
    pub fn failing_on(mut self, name: &str) -> Self {
        self.fail.insert(name.to_string());
        self
    }

    /// Never answers for `name`
    #[must_use]
    pub fn stalling_on(mut self, name: &str) -> Self {
        self.stall.insert(name.to_string());
        self
    }

    /// Share as a trait object
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Total pin calls received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Identifier this backend assigns to `content`
    pub fn cid_for(content: &[u8]) -> String {
        format!("fake:{}", ContentDigest::compute(content))
    }
}

#[async_trait]
impl PinBackend for FakePin {
    fn kind(&self) -> &'static str {
        "fake"
    }

    async fn pin(&self, name: &ArtifactName, content: Arc<[u8]>) -> Result<String, PinError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.stall.contains(name.as_str()) {
            tokio::time::sleep(STALL).await;
        }
        if self.fail.contains(name.as_str()) {
            return Err(PinError::Status {
                status: 500,
                body: format!("cannot pin {name}"),
            });
        }
        Ok(Self::cid_for(&content))
    }
}

/// Notary over the given backends with short timeouts and no retry delay
pub fn notary_with(
    store: &Path,
    anchor: Arc<dyn AnchorBackend>,
    pin: Arc<dyn PinBackend>,
) -> Notary {
    let manifest_name = ArtifactName::new(notary_core::config::DEFAULT_MANIFEST_NAME)
        .unwrap_or_else(|e| panic!("default manifest name is invalid: {e}"));
    Notary::new(
        AnchorClient::new(anchor, TEST_TIMEOUT),
        PinClient::new(pin, TEST_TIMEOUT, 4),
        EvidenceStore::open(store).unwrap_or_else(|e| panic!("cannot open store: {e}")),
        manifest_name,
    )
    .with_anchor_retry(RetryPolicy::new(2, Duration::ZERO))
    .with_pin_retry(RetryPolicy::new(2, Duration::ZERO))
}

/// In-memory artifact set from `(name, bytes)` pairs
pub fn artifact_set(pairs: &[(&str, &[u8])]) -> ArtifactSet {
    ArtifactSet::from_pairs(pairs.iter().map(|(name, bytes)| (*name, bytes.to_vec())))
        .unwrap_or_else(|e| panic!("invalid test artifacts: {e}"))
}

/// Temporary workspace with an artifact directory and a store directory
pub struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    /// Create an empty workspace
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("cannot create tempdir: {e}"));
        std::fs::create_dir_all(dir.path().join("artifacts"))
            .unwrap_or_else(|e| panic!("cannot create artifacts dir: {e}"));
        Self { dir }
    }

    /// Workspace root
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Artifact directory
    pub fn artifacts(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    /// Evidence store directory
    pub fn store(&self) -> PathBuf {
        self.dir.path().join("evidence")
    }

    /// Write an artifact at a `/`-separated relative path
    pub fn write(&self, rel: &str, content: &[u8]) -> &Self {
        let path = rel
            .split('/')
            .fold(self.artifacts(), |path, segment| path.join(segment));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("cannot create {rel}: {e}"));
        }
        std::fs::write(&path, content).unwrap_or_else(|e| panic!("cannot write {rel}: {e}"));
        self
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}
