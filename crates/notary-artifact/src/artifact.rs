//! Artifacts and artifact sets
//!
//! An [`Artifact`] is a named, immutable byte sequence handed over by an
//! upstream producer. An [`ArtifactSet`] holds the artifacts of one run in
//! canonical (name) order, which is the leaf order of the Merkle tree.

use crate::hash::ContentDigest;
use crate::name::{ArtifactName, NameError};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// Named, immutable artifact content
///
/// Content is shared, so cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    name: ArtifactName,
    content: Arc<[u8]>,
}

impl Artifact {
    /// Create new artifact
    #[inline]
    #[must_use]
    pub fn new(name: ArtifactName, content: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name,
            content: content.into(),
        }
    }

    /// Logical name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &ArtifactName {
        &self.name
    }

    /// Content bytes
    #[inline]
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Shared handle to the content bytes
    #[inline]
    #[must_use]
    pub fn shared_content(&self) -> Arc<[u8]> {
        Arc::clone(&self.content)
    }

    /// Content length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Check if content is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Hash the content, producing the leaf digest
    #[must_use]
    pub fn hashed(&self) -> HashedArtifact {
        HashedArtifact {
            digest: ContentDigest::compute(&self.content),
            artifact: self.clone(),
        }
    }
}

/// Artifact paired with its leaf digest
///
/// # Invariants
/// - `digest` is always `ContentDigest::compute(artifact.content())`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashedArtifact {
    artifact: Artifact,
    digest: ContentDigest,
}

impl HashedArtifact {
    /// The artifact
    #[inline]
    #[must_use]
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Logical name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &ArtifactName {
        self.artifact.name()
    }

    /// Leaf digest
    #[inline]
    #[must_use]
    pub fn digest(&self) -> ContentDigest {
        self.digest
    }
}

/// Options for collecting artifacts from a directory
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Skip files and directories whose name starts with `.`
    pub skip_hidden: bool,
    /// Paths (files or directories) never collected
    pub exclude: Vec<PathBuf>,
    /// Maximum directory depth below the base
    pub max_depth: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            skip_hidden: true,
            exclude: Vec::new(),
            max_depth: 64,
        }
    }
}

impl CollectOptions {
    /// Exclude an additional path
    #[inline]
    #[must_use]
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude.push(path.into());
        self
    }

    /// Also collect files and directories whose name starts with `.`
    #[inline]
    #[must_use]
    pub fn include_hidden(mut self) -> Self {
        self.skip_hidden = false;
        self
    }
}

/// Artifacts of one run, ordered by name
///
/// # Invariants
/// - Names are unique
/// - Iteration order is byte-wise name order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    artifacts: BTreeMap<ArtifactName, Artifact>,
}

impl ArtifactSet {
    /// Create empty set
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact
    ///
    /// # Errors
    /// Returns error if an artifact with the same name is present
    pub fn insert(&mut self, artifact: Artifact) -> Result<(), InputError> {
        if self.artifacts.contains_key(artifact.name()) {
            return Err(InputError::Duplicate(artifact.name().clone()));
        }
        self.artifacts.insert(artifact.name().clone(), artifact);
        Ok(())
    }

    /// Build a set from in-memory `(name, bytes)` pairs
    ///
    /// # Errors
    /// Returns error on invalid or duplicate names
    pub fn from_pairs<I, N, B>(pairs: I) -> Result<Self, InputError>
    where
        I: IntoIterator<Item = (N, B)>,
        N: Into<String>,
        B: Into<Arc<[u8]>>,
    {
        let mut set = Self::new();
        for (name, bytes) in pairs {
            let name = name.into();
            let name = ArtifactName::new(name.clone()).map_err(|source| InputError::InvalidName {
                path: PathBuf::from(name),
                source,
            })?;
            set.insert(Artifact::new(name, bytes))?;
        }
        Ok(set)
    }

    /// Collect every regular file below `dir`
    ///
    /// Symlinks are not followed. Names are paths relative to `dir`.
    ///
    /// # Errors
    /// Returns error if `dir` is not a directory, an entry cannot be read, or
    /// a path does not form a valid name
    pub fn collect_dir(dir: &Path, options: &CollectOptions) -> Result<Self, InputError> {
        let mut set = Self::new();
        for (name, path) in walk_files(dir, options)? {
            let content = std::fs::read(&path).map_err(|e| InputError::unreadable(&path, e))?;
            tracing::debug!("collected {} ({} bytes)", name, content.len());
            set.insert(Artifact::new(name, content))?;
        }
        Ok(set)
    }

    /// Collect an explicit list of files, named relative to `base`
    ///
    /// # Errors
    /// Returns error if a file is missing or unreadable, lies outside
    /// `base`, or two paths map to the same name
    pub fn collect_paths<P: AsRef<Path>>(base: &Path, paths: &[P]) -> Result<Self, InputError> {
        let mut set = Self::new();
        for path in paths {
            let path = path.as_ref();
            let full = if path.is_absolute() {
                path.to_path_buf()
            } else {
                base.join(path)
            };
            if !full.is_file() {
                return Err(InputError::Missing(full));
            }
            let relative = full
                .strip_prefix(base)
                .map_err(|_| InputError::OutsideBase(full.clone()))?;
            let name = ArtifactName::from_relative_path(relative).map_err(|source| {
                InputError::InvalidName {
                    path: full.clone(),
                    source,
                }
            })?;
            let content = std::fs::read(&full).map_err(|e| InputError::unreadable(&full, e))?;
            set.insert(Artifact::new(name, content))?;
        }
        Ok(set)
    }

    /// Number of artifacts
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Check if set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Check if a name is present
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &ArtifactName) -> bool {
        self.artifacts.contains_key(name)
    }

    /// Get artifact by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &ArtifactName) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    /// Artifacts in name order
    pub fn iter(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    /// Hash every artifact in parallel
    ///
    /// Output is in name order regardless of scheduling.
    #[must_use]
    pub fn hash_all(&self) -> Vec<HashedArtifact> {
        let artifacts: Vec<&Artifact> = self.artifacts.values().collect();
        artifacts.par_iter().map(|a| a.hashed()).collect()
    }
}

/// Regular files below `dir` with their names, in name order
///
/// # Errors
/// Returns error if `dir` is not a directory, traversal fails, or a path
/// does not form a valid name
pub fn walk_files(
    dir: &Path,
    options: &CollectOptions,
) -> Result<Vec<(ArtifactName, PathBuf)>, InputError> {
    if !dir.is_dir() {
        return Err(InputError::NotADirectory(dir.to_path_buf()));
    }

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(options.max_depth)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            let hidden = e.file_name().to_str().is_some_and(|n| n.starts_with('.'));
            let excluded = options.exclude.iter().any(|x| e.path() == x.as_path());
            !(options.skip_hidden && hidden) && !excluded
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| InputError::Walk {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|_| InputError::OutsideBase(entry.path().to_path_buf()))?;
        let name = ArtifactName::from_relative_path(relative).map_err(|source| {
            InputError::InvalidName {
                path: entry.path().to_path_buf(),
                source,
            }
        })?;
        files.push((name, entry.into_path()));
    }

    // Directory order is not name order ("a-b" vs "a/b"), so sort explicitly
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type Item = &'a Artifact;
    type IntoIter = std::collections::btree_map::Values<'a, ArtifactName, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.artifacts.values()
    }
}

/// Errors while collecting artifacts
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// Listed artifact does not exist
    #[error("artifact not found: {}", .0.display())]
    Missing(PathBuf),

    /// Artifact exists but could not be read
    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Path does not form a valid artifact name
    #[error("invalid artifact name for {}: {source}", path.display())]
    InvalidName {
        path: PathBuf,
        #[source]
        source: NameError,
    },

    /// Two artifacts share a name
    #[error("duplicate artifact name: {0}")]
    Duplicate(ArtifactName),

    /// Collection root is not a directory
    #[error("not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    /// Explicit path lies outside the collection base
    #[error("path is outside the collection base: {}", .0.display())]
    OutsideBase(PathBuf),

    /// Directory traversal failed
    #[error("cannot walk {}: {message}", path.display())]
    Walk { path: PathBuf, message: String },
}

impl InputError {
    /// Create unreadable error for path
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }
}
