//! Flat per-file checksums
//!
//! Independent of the manifest: a `sha256  path` listing of every file
//! under a data directory, regenerated from scratch on each run. Files are
//! hashed with the streaming hasher so large data files are never held in
//! memory.

use crate::artifact::{walk_files, CollectOptions, InputError};
use crate::hash::ContentDigest;
use crate::manifest::SEPARATOR;
use crate::name::ArtifactName;
use rayon::prelude::*;
use std::fmt::Write as _;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One line of the checksums file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumEntry {
    /// Path relative to the data directory
    pub path: ArtifactName,
    /// SHA-256 of the file content
    pub digest: ContentDigest,
}

/// Checksums of every file under a directory, sorted by path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checksums {
    entries: Vec<ChecksumEntry>,
}

impl Checksums {
    /// Hash every file below `dir`
    ///
    /// # Errors
    /// Returns error if the directory cannot be walked or a file cannot be
    /// read
    pub fn compute(dir: &Path, options: &CollectOptions) -> Result<Self, InputError> {
        let files = walk_files(dir, options)?;
        let entries = files
            .par_iter()
            .map(|(name, path)| {
                let file = File::open(path).map_err(|e| InputError::unreadable(path, e))?;
                let digest = ContentDigest::compute_reader(BufReader::new(file))
                    .map_err(|e| InputError::unreadable(path, e))?;
                Ok(ChecksumEntry {
                    path: name.clone(),
                    digest,
                })
            })
            .collect::<Result<Vec<_>, InputError>>()?;

        tracing::debug!("checksummed {} files under {}", entries.len(), dir.display());
        Ok(Self { entries })
    }

    /// Entries sorted by path
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[ChecksumEntry] {
        &self.entries
    }

    /// Number of files
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no files were found
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render as `<sha256-hex>  <path>` lines
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 96);
        for entry in &self.entries {
            let _ = writeln!(out, "{}{SEPARATOR}{}", entry.digest, entry.path);
        }
        out
    }
}
