//! Evidence store
//!
//! ```text
//! <store>/CURRENT                      name of the latest bundle
//! <store>/bundles/000001-<root12>/
//!     MANIFEST
//!     anchor_proof.json                only when anchoring succeeded
//!     pins.json
//!     status.json
//! ```
//!
//! A bundle is written into a staging directory, synced, then renamed into
//! place; `CURRENT` is replaced last via write-temp + rename. A crash at any
//! point leaves the previous `CURRENT` and its bundle untouched.

use crate::bundle::{EvidenceStatus, ProofBundle};
use crate::error::PersistError;
use notary_artifact::Manifest;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Pointer file naming the latest bundle
pub const CURRENT_FILE: &str = "CURRENT";
/// Directory holding every bundle generation
pub const BUNDLES_DIR: &str = "bundles";
/// Manifest file inside a bundle
pub const MANIFEST_FILE: &str = "MANIFEST";
/// Anchor attestation inside a bundle
pub const ANCHOR_PROOF_FILE: &str = "anchor_proof.json";
/// Pin record inside a bundle
pub const PINS_FILE: &str = "pins.json";
/// Status summary inside a bundle
pub const STATUS_FILE: &str = "status.json";

const STAGING_PREFIX: &str = ".staging-";
const ROOT_PREFIX_LEN: usize = 12;

/// A bundle that exists on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBundle {
    /// Monotonic generation number, starting at 1
    pub generation: u64,
    /// Directory name under `bundles/`
    pub name: String,
    /// Full path
    pub path: PathBuf,
}

impl StoredBundle {
    /// Read this bundle's manifest text
    ///
    /// # Errors
    /// Returns error if the file cannot be read
    pub fn manifest_text(&self) -> Result<String, PersistError> {
        let path = self.path.join(MANIFEST_FILE);
        fs::read_to_string(&path).map_err(|e| PersistError::io(path, e))
    }

    /// Read and parse this bundle's manifest
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a valid manifest
    pub fn manifest(&self) -> Result<Manifest, PersistError> {
        let text = self.manifest_text()?;
        Manifest::parse(&text).map_err(|source| PersistError::CorruptManifest {
            path: self.path.join(MANIFEST_FILE),
            source,
        })
    }

    /// Read this bundle's status
    ///
    /// # Errors
    /// Returns error if the file cannot be read or decoded
    pub fn status(&self) -> Result<EvidenceStatus, PersistError> {
        let path = self.path.join(STATUS_FILE);
        let bytes = fs::read(&path).map_err(|e| PersistError::io(&path, e))?;
        serde_json::from_slice(&bytes).map_err(|source| PersistError::Encoding { path, source })
    }
}

/// Durable home for proof bundles
#[derive(Debug, Clone)]
pub struct EvidenceStore {
    root: PathBuf,
}

impl EvidenceStore {
    /// Open or create a store at `root`
    ///
    /// Leftover staging directories from interrupted writes are removed.
    ///
    /// # Errors
    /// Returns error if the directories cannot be created or listed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let root = root.into();
        let bundles = root.join(BUNDLES_DIR);
        fs::create_dir_all(&bundles).map_err(|e| PersistError::io(&bundles, e))?;

        let store = Self { root };
        store.remove_stale_staging()?;
        Ok(store)
    }

    /// Store root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bundles_dir(&self) -> PathBuf {
        self.root.join(BUNDLES_DIR)
    }

    fn remove_stale_staging(&self) -> Result<(), PersistError> {
        let dir = self.bundles_dir();
        for entry in fs::read_dir(&dir).map_err(|e| PersistError::io(&dir, e))? {
            let entry = entry.map_err(|e| PersistError::io(&dir, e))?;
            if entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
                tracing::warn!("removing interrupted bundle write {}", entry.path().display());
                fs::remove_dir_all(entry.path()).map_err(|e| PersistError::io(entry.path(), e))?;
            }
        }
        Ok(())
    }

    /// Every complete bundle, oldest first
    ///
    /// # Errors
    /// Returns error if the bundles directory cannot be listed
    pub fn bundles(&self) -> Result<Vec<StoredBundle>, PersistError> {
        let dir = self.bundles_dir();
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| PersistError::io(&dir, e))? {
            let entry = entry.map_err(|e| PersistError::io(&dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(generation) = parse_generation(&name) {
                out.push(StoredBundle {
                    generation,
                    name,
                    path: entry.path(),
                });
            }
        }
        out.sort_by_key(|b| b.generation);
        Ok(out)
    }

    /// Bundle named by `CURRENT`, if any run has persisted
    ///
    /// # Errors
    /// Returns error if `CURRENT` is unreadable or names a missing bundle
    pub fn latest(&self) -> Result<Option<StoredBundle>, PersistError> {
        let pointer = self.root.join(CURRENT_FILE);
        let name = match fs::read_to_string(&pointer) {
            Ok(text) => text.trim().to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PersistError::io(pointer, e)),
        };
        let generation =
            parse_generation(&name).ok_or_else(|| PersistError::DanglingPointer(name.clone()))?;
        let path = self.bundles_dir().join(&name);
        if !path.is_dir() {
            return Err(PersistError::DanglingPointer(name));
        }
        Ok(Some(StoredBundle {
            generation,
            name,
            path,
        }))
    }

    /// Manifest text of the latest bundle
    ///
    /// # Errors
    /// Returns error if the store pointer or manifest cannot be read
    pub fn latest_manifest(&self) -> Result<Option<String>, PersistError> {
        self.latest()?.map(|b| b.manifest_text()).transpose()
    }

    /// Write `bundle` as the next generation and point `CURRENT` at it
    ///
    /// # Errors
    /// Returns error on any filesystem or encoding failure; the previous
    /// `CURRENT` stays in effect
    pub fn persist(&self, bundle: &ProofBundle) -> Result<StoredBundle, PersistError> {
        let generation = self
            .bundles()?
            .last()
            .map_or(1, |b| b.generation + 1);
        let name = format!(
            "{generation:06}-{}",
            &bundle.root().to_hex()[..ROOT_PREFIX_LEN]
        );

        let bundles_dir = self.bundles_dir();
        let staging = bundles_dir.join(format!("{STAGING_PREFIX}{}", uuid::Uuid::new_v4()));
        fs::create_dir(&staging).map_err(|e| PersistError::io(&staging, e))?;

        if let Err(e) = write_bundle_files(&staging, bundle) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let target = bundles_dir.join(&name);
        if let Err(e) = fs::rename(&staging, &target) {
            let _ = fs::remove_dir_all(&staging);
            return Err(PersistError::io(&target, e));
        }
        sync_dir(&bundles_dir)?;

        write_atomic(&self.root.join(CURRENT_FILE), format!("{name}\n").as_bytes())?;
        tracing::info!("persisted bundle {} (generation {})", name, generation);

        Ok(StoredBundle {
            generation,
            name,
            path: target,
        })
    }
}

fn parse_generation(name: &str) -> Option<u64> {
    if name.starts_with('.') {
        return None;
    }
    let (generation, _) = name.split_once('-')?;
    generation.parse().ok()
}

fn write_bundle_files(dir: &Path, bundle: &ProofBundle) -> Result<(), PersistError> {
    write_synced(&dir.join(MANIFEST_FILE), bundle.manifest().to_text().as_bytes())?;

    if let Some(proof) = bundle.anchor() {
        write_synced(&dir.join(ANCHOR_PROOF_FILE), proof.attestation.as_bytes())?;
    }

    let pins_path = dir.join(PINS_FILE);
    let pins = serde_json::to_vec_pretty(bundle.pins()).map_err(|source| PersistError::Encoding {
        path: pins_path.clone(),
        source,
    })?;
    write_synced(&pins_path, &pins)?;

    let status_path = dir.join(STATUS_FILE);
    let status =
        serde_json::to_vec_pretty(bundle.status()).map_err(|source| PersistError::Encoding {
            path: status_path.clone(),
            source,
        })?;
    write_synced(&status_path, &status)?;

    sync_dir(dir)
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let mut file = File::create(path).map_err(|e| PersistError::io(path, e))?;
    file.write_all(bytes).map_err(|e| PersistError::io(path, e))?;
    file.sync_all().map_err(|e| PersistError::io(path, e))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), PersistError> {
    File::open(dir)
        .and_then(|f| f.sync_all())
        .map_err(|e| PersistError::io(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), PersistError> {
    Ok(())
}

/// Replace `path` with `bytes` atomically
///
/// Written to a temporary file in the same directory, synced, then renamed
/// over the target. Readers see either the old or the new content.
///
/// # Errors
/// Returns error if the temporary file cannot be written or renamed
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| PersistError::io(&dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| PersistError::io(&dir, e))?;
    tmp.write_all(bytes).map_err(|e| PersistError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| PersistError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| PersistError::io(path, e.error))?;
    sync_dir(&dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::AnchorProof;
    use crate::bundle::AnchorOutcome;
    use crate::error::AnchorError;
    use crate::pin::PinRecord;
    use notary_artifact::{Artifact, ArtifactName, Manifest};

    fn bundle(content: &[u8], anchored: bool) -> ProofBundle {
        let artifact = Artifact::new(ArtifactName::new("a.csv").unwrap(), content.to_vec());
        let manifest = Manifest::from_hashed(&[artifact.hashed()]).unwrap();
        let result = if anchored {
            Ok(AnchorProof {
                root: manifest.root(),
                backend: "http".into(),
                anchored_at: chrono::Utc::now(),
                attestation: r#"{"receipt":"r"}"#.into(),
            })
        } else {
            Err(AnchorError::Disabled)
        };
        let anchor = AnchorOutcome {
            backend: "http".into(),
            attempts: 1,
            result,
        };
        ProofBundle::assemble(manifest, anchor, PinRecord::new(), "disabled")
    }

    #[test]
    fn empty_store_has_no_latest() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(tmp.path()).unwrap();
        assert!(store.latest().unwrap().is_none());
        assert!(store.latest_manifest().unwrap().is_none());
        assert!(store.bundles().unwrap().is_empty());
    }

    #[test]
    fn persist_writes_layout_and_pointer() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(tmp.path()).unwrap();
        let bundle = bundle(b"v1", true);

        let stored = store.persist(&bundle).unwrap();
        assert_eq!(stored.generation, 1);
        assert!(stored.name.starts_with("000001-"));
        assert_eq!(stored.name.len(), 7 + ROOT_PREFIX_LEN);

        for file in [MANIFEST_FILE, ANCHOR_PROOF_FILE, PINS_FILE, STATUS_FILE] {
            assert!(stored.path.join(file).is_file(), "{file}");
        }
        assert_eq!(
            fs::read_to_string(stored.path.join(ANCHOR_PROOF_FILE)).unwrap(),
            r#"{"receipt":"r"}"#
        );
        assert_eq!(store.latest().unwrap().unwrap(), stored);
        assert_eq!(
            store.latest_manifest().unwrap().unwrap(),
            bundle.manifest().to_text()
        );
        assert_eq!(stored.status().unwrap(), *bundle.status());
        assert_eq!(stored.manifest().unwrap(), *bundle.manifest());
    }

    #[test]
    fn corrupt_manifest_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(tmp.path()).unwrap();
        let stored = store.persist(&bundle(b"v1", false)).unwrap();
        fs::write(stored.path.join(MANIFEST_FILE), "not a manifest\n").unwrap();
        assert!(matches!(
            stored.manifest(),
            Err(PersistError::CorruptManifest { .. })
        ));
    }

    #[test]
    fn unanchored_bundle_has_no_proof_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(tmp.path()).unwrap();
        let stored = store.persist(&bundle(b"v1", false)).unwrap();
        assert!(!stored.path.join(ANCHOR_PROOF_FILE).exists());
        assert!(stored.path.join(STATUS_FILE).exists());
    }

    #[test]
    fn generations_increase_and_old_bundles_remain() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(tmp.path()).unwrap();
        let first = store.persist(&bundle(b"v1", true)).unwrap();
        let second = store.persist(&bundle(b"v2", true)).unwrap();

        assert_eq!(second.generation, 2);
        assert!(first.path.is_dir());
        assert_eq!(store.bundles().unwrap().len(), 2);
        assert_eq!(store.latest().unwrap().unwrap().name, second.name);
    }

    #[test]
    fn interrupted_write_keeps_previous_pointer() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(tmp.path()).unwrap();
        let first = store.persist(&bundle(b"v1", true)).unwrap();

        let stale = tmp.path().join(BUNDLES_DIR).join(".staging-crashed");
        fs::create_dir(&stale).unwrap();
        fs::write(stale.join(MANIFEST_FILE), b"partial").unwrap();

        assert_eq!(store.latest().unwrap().unwrap(), first);
        let reopened = EvidenceStore::open(tmp.path()).unwrap();
        assert!(!stale.exists());
        assert_eq!(reopened.bundles().unwrap().len(), 1);
    }

    #[test]
    fn dangling_pointer_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let store = EvidenceStore::open(tmp.path()).unwrap();
        fs::write(tmp.path().join(CURRENT_FILE), "000007-deadbeef0000\n").unwrap();
        assert!(matches!(store.latest(), Err(PersistError::DanglingPointer(_))));
    }

    #[test]
    fn write_atomic_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/checksums.sha256");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
