use super::PinBackend;
use crate::error::PinError;
use async_trait::async_trait;
use notary_artifact::{ArtifactName, ContentDigest};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Identifier prefix for locally pinned content
pub const LOCAL_CID_PREFIX: &str = "sha256:";

/// Content-addressed directory
///
/// Each file is stored once under its SHA-256 hex digest. Pinning identical
/// content again is a no-op.
#[derive(Debug, Clone)]
pub struct LocalPinBackend {
    dir: PathBuf,
}

impl LocalPinBackend {
    /// Create a backend rooted at `dir` (created on first pin)
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Root directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path content with this identifier is stored at, if the identifier is local
    #[must_use]
    pub fn path_for(&self, cid: &str) -> Option<PathBuf> {
        let hex = cid.strip_prefix(LOCAL_CID_PREFIX)?;
        hex.parse::<ContentDigest>().ok()?;
        Some(self.dir.join(hex))
    }
}

fn storage(path: &Path, err: &std::io::Error) -> PinError {
    PinError::Storage(format!("{}: {err}", path.display()))
}

#[async_trait]
impl PinBackend for LocalPinBackend {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn pin(&self, name: &ArtifactName, content: Arc<[u8]>) -> Result<String, PinError> {
        let dir = self.dir.clone();
        let digest = tokio::task::spawn_blocking(move || -> Result<ContentDigest, PinError> {
            let digest = ContentDigest::compute(&content);
            std::fs::create_dir_all(&dir).map_err(|e| storage(&dir, &e))?;
            let target = dir.join(digest.to_hex());
            if target.is_file() {
                return Ok(digest);
            }
            let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| storage(&dir, &e))?;
            std::io::Write::write_all(&mut tmp, &content).map_err(|e| storage(tmp.path(), &e))?;
            tmp.as_file().sync_all().map_err(|e| storage(tmp.path(), &e))?;
            tmp.persist(&target).map_err(|e| storage(&target, &e.error))?;
            Ok(digest)
        })
        .await
        .map_err(|e| PinError::Storage(format!("pin task failed: {e}")))??;

        tracing::debug!("pinned {} locally as {}", name, digest.short());
        Ok(format!("{LOCAL_CID_PREFIX}{digest}"))
    }
}
