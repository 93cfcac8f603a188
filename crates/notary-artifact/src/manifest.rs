//! Manifest generation and parsing
//!
//! A manifest lists every artifact of a run with its leaf digest, in
//! canonical name order, followed by the Merkle root:
//!
//! ```text
//! <hex-digest>  <artifact-name>
//! ...
//! <hex-root>  MERKLE_ROOT
//! ```
//!
//! The text form has no timestamps or other run-dependent content, so two
//! runs over the same artifacts produce byte-identical manifests.

use crate::artifact::HashedArtifact;
use crate::hash::{ContentDigest, DigestError};
use crate::merkle::{build_root, MerkleProof, MerkleTree};
use crate::name::{ArtifactName, NameError, ROOT_LABEL};
use std::fmt::Write as _;

/// Separator between digest and name on every line
pub const SEPARATOR: &str = "  ";

/// One artifact line
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManifestEntry {
    /// Artifact name
    pub name: ArtifactName,
    /// Leaf digest of the artifact content
    pub digest: ContentDigest,
}

impl ManifestEntry {
    /// Create new entry
    #[inline]
    #[must_use]
    pub fn new(name: ArtifactName, digest: ContentDigest) -> Self {
        Self { name, digest }
    }
}

impl From<&HashedArtifact> for ManifestEntry {
    fn from(hashed: &HashedArtifact) -> Self {
        Self::new(hashed.name().clone(), hashed.digest())
    }
}

/// Ordered `(name, digest)` listing plus Merkle root
///
/// # Invariants
/// - Entries are strictly increasing by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
    root: ContentDigest,
}

impl Manifest {
    /// Assemble a manifest from sorted entries and their root
    ///
    /// The root is taken as given; use [`verify_root`](Self::verify_root)
    /// to check it against the entries.
    ///
    /// # Errors
    /// Returns error if entries are not strictly sorted by name
    pub fn generate(entries: Vec<ManifestEntry>, root: ContentDigest) -> Result<Self, ManifestError> {
        check_order(&entries)?;
        Ok(Self { entries, root })
    }

    /// Build a manifest from hashed artifacts, computing the root
    ///
    /// Input order does not matter; entries are sorted by name here.
    ///
    /// # Errors
    /// Returns error if two artifacts share a name
    pub fn from_hashed(hashed: &[HashedArtifact]) -> Result<Self, ManifestError> {
        let mut entries: Vec<ManifestEntry> = hashed.iter().map(ManifestEntry::from).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        check_order(&entries)?;
        let leaves: Vec<ContentDigest> = entries.iter().map(|e| e.digest).collect();
        let root = build_root(&leaves);
        Ok(Self { entries, root })
    }

    /// Entries in name order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Recorded Merkle root
    #[inline]
    #[must_use]
    pub fn root(&self) -> ContentDigest {
        self.root
    }

    /// Number of artifacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the manifest lists no artifacts
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Leaf digests in canonical order
    #[must_use]
    pub fn leaf_digests(&self) -> Vec<ContentDigest> {
        self.entries.iter().map(|e| e.digest).collect()
    }

    /// Digest recorded for `name`
    #[must_use]
    pub fn digest_of(&self, name: &ArtifactName) -> Option<ContentDigest> {
        self.position(name).map(|i| self.entries[i].digest)
    }

    /// Inclusion proof of `name` under the recorded root
    #[must_use]
    pub fn proof_for(&self, name: &ArtifactName) -> Option<MerkleProof> {
        let index = self.position(name)?;
        MerkleTree::from_leaves(&self.leaf_digests()).proof(index)
    }

    fn position(&self, name: &ArtifactName) -> Option<usize> {
        self.entries.binary_search_by(|e| e.name.cmp(name)).ok()
    }

    /// Check the recorded root against the entries
    ///
    /// # Errors
    /// Returns [`ManifestError::RootMismatch`] if they disagree
    pub fn verify_root(&self) -> Result<(), ManifestError> {
        let computed = build_root(&self.leaf_digests());
        if computed == self.root {
            Ok(())
        } else {
            Err(ManifestError::RootMismatch {
                recorded: self.root,
                computed,
            })
        }
    }

    /// Render the stable text form
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity((self.entries.len() + 1) * 96);
        for entry in &self.entries {
            let _ = writeln!(out, "{}{SEPARATOR}{}", entry.digest, entry.name);
        }
        let _ = writeln!(out, "{}{SEPARATOR}{ROOT_LABEL}", self.root);
        out
    }

    /// Parse the text form
    ///
    /// Inverse of [`to_text`](Self::to_text).
    ///
    /// # Errors
    /// Returns error on malformed lines, bad digests or names, unsorted or
    /// duplicate entries, and a missing, repeated or misplaced root line
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        let mut entries = Vec::new();
        let mut root = None;

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if root.is_some() {
                let repeated = line.split_once(SEPARATOR).map(|(_, n)| n) == Some(ROOT_LABEL);
                return Err(if repeated {
                    ManifestError::DuplicateRoot { line: line_no }
                } else {
                    ManifestError::RootNotLast { line: line_no }
                });
            }

            let (hex, name) = line
                .split_once(SEPARATOR)
                .ok_or_else(|| ManifestError::malformed(line_no, "missing digest separator"))?;
            let digest: ContentDigest = hex
                .parse()
                .map_err(|source| ManifestError::InvalidDigest {
                    line: line_no,
                    source,
                })?;

            if name == ROOT_LABEL {
                root = Some(digest);
                continue;
            }

            let name = ArtifactName::new(name).map_err(|source| ManifestError::InvalidName {
                line: line_no,
                source,
            })?;
            entries.push(ManifestEntry::new(name, digest));
        }

        let root = root.ok_or(ManifestError::MissingRoot)?;
        check_order(&entries)?;
        Ok(Self { entries, root })
    }
}

/// Entries must be strictly increasing by name. Entry `k` sits on line `k + 1`.
fn check_order(entries: &[ManifestEntry]) -> Result<(), ManifestError> {
    for (i, pair) in entries.windows(2).enumerate() {
        match pair[0].name.cmp(&pair[1].name) {
            std::cmp::Ordering::Less => {}
            std::cmp::Ordering::Equal => {
                return Err(ManifestError::DuplicateEntry(pair[1].name.clone()));
            }
            std::cmp::Ordering::Greater => {
                return Err(ManifestError::Unsorted {
                    line: i + 2,
                    name: pair[1].name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Errors while building or parsing manifests
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Line does not have the `<digest>  <name>` shape
    #[error("line {line}: malformed manifest line: {reason}")]
    Malformed { line: usize, reason: String },

    /// Digest field is not a valid lowercase SHA-256 hex digest
    #[error("line {line}: invalid digest: {source}")]
    InvalidDigest {
        line: usize,
        #[source]
        source: DigestError,
    },

    /// Name field is not a valid artifact name
    #[error("line {line}: invalid artifact name: {source}")]
    InvalidName {
        line: usize,
        #[source]
        source: NameError,
    },

    /// Entries out of canonical order
    #[error("line {line}: entry '{name}' is out of order")]
    Unsorted { line: usize, name: ArtifactName },

    /// Same artifact listed twice
    #[error("duplicate manifest entry: {0}")]
    DuplicateEntry(ArtifactName),

    /// No root line
    #[error("manifest has no MERKLE_ROOT line")]
    MissingRoot,

    /// More than one root line
    #[error("line {line}: second MERKLE_ROOT line")]
    DuplicateRoot { line: usize },

    /// Root line followed by more entries
    #[error("line {line}: entry after MERKLE_ROOT line")]
    RootNotLast { line: usize },

    /// Recorded root differs from the root of the recorded leaves
    #[error("root mismatch: manifest records {recorded}, leaves reduce to {computed}")]
    RootMismatch {
        recorded: ContentDigest,
        computed: ContentDigest,
    },
}

impl ManifestError {
    fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line,
            reason: reason.into(),
        }
    }
}
