//! Manifest verification against files on disk

use notary_artifact::{build_root, ArtifactName, ContentDigest, Manifest};
use std::fmt::{self, Display, Formatter};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Per-entry verification failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// File content hashes to a different digest
    Mismatch {
        name: ArtifactName,
        expected: ContentDigest,
        actual: ContentDigest,
    },
    /// File could not be read
    Missing { name: ArtifactName, reason: String },
    /// Recorded root is not the Merkle root of the recorded leaves
    RootMismatch {
        recorded: ContentDigest,
        computed: ContentDigest,
    },
}

impl Display for Discrepancy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch {
                name,
                expected,
                actual,
            } => write!(f, "{name}: expected {expected}, found {actual}"),
            Self::Missing { name, reason } => write!(f, "{name}: {reason}"),
            Self::RootMismatch { recorded, computed } => {
                write!(f, "MERKLE_ROOT: recorded {recorded}, computed {computed}")
            }
        }
    }
}

/// Outcome of checking a manifest against a directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Entries whose file matched
    pub verified: usize,
    /// Everything that did not match
    pub discrepancies: Vec<Discrepancy>,
}

impl VerifyReport {
    /// Check if every entry and the root matched
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Path of an artifact below `dir`
#[must_use]
pub fn artifact_path(dir: &Path, name: &ArtifactName) -> PathBuf {
    name.segments().fold(dir.to_path_buf(), |path, segment| path.join(segment))
}

fn hash_file(path: &Path) -> std::io::Result<ContentDigest> {
    ContentDigest::compute_reader(BufReader::new(File::open(path)?))
}

/// Re-hash every file named in `manifest` below `dir` and check the root
#[must_use]
pub fn verify_dir(manifest: &Manifest, dir: &Path) -> VerifyReport {
    let mut report = VerifyReport::default();

    let computed = build_root(&manifest.leaf_digests());
    if computed != manifest.root() {
        report.discrepancies.push(Discrepancy::RootMismatch {
            recorded: manifest.root(),
            computed,
        });
    }

    for entry in manifest.entries() {
        let path = artifact_path(dir, &entry.name);
        match hash_file(&path) {
            Ok(actual) if actual == entry.digest => {
                tracing::debug!("{} ok", entry.name);
                report.verified += 1;
            }
            Ok(actual) => report.discrepancies.push(Discrepancy::Mismatch {
                name: entry.name.clone(),
                expected: entry.digest,
                actual,
            }),
            Err(e) => report.discrepancies.push(Discrepancy::Missing {
                name: entry.name.clone(),
                reason: format!("cannot read {}: {e}", path.display()),
            }),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use notary_artifact::{ArtifactSet, CollectOptions, ManifestEntry};
    use std::fs;

    fn manifest_for(dir: &Path) -> Manifest {
        let set = ArtifactSet::collect_dir(dir, &CollectOptions::default()).unwrap();
        Manifest::from_hashed(&set.hash_all()).unwrap()
    }

    #[test]
    fn untouched_directory_verifies() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("plots")).unwrap();
        fs::write(tmp.path().join("a.csv"), b"1").unwrap();
        fs::write(tmp.path().join("plots/p.png"), b"png").unwrap();

        let manifest = manifest_for(tmp.path());
        let report = verify_dir(&manifest, tmp.path());
        assert!(report.is_ok(), "{:?}", report.discrepancies);
        assert_eq!(report.verified, 2);
    }

    #[test]
    fn modified_and_deleted_files_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.csv"), b"1").unwrap();
        fs::write(tmp.path().join("b.csv"), b"2").unwrap();
        let manifest = manifest_for(tmp.path());

        fs::write(tmp.path().join("a.csv"), b"tampered").unwrap();
        fs::remove_file(tmp.path().join("b.csv")).unwrap();

        let report = verify_dir(&manifest, tmp.path());
        assert_eq!(report.verified, 0);
        assert_eq!(report.discrepancies.len(), 2);
        assert!(matches!(
            &report.discrepancies[0],
            Discrepancy::Mismatch { actual, .. } if *actual == ContentDigest::compute(b"tampered")
        ));
        assert!(matches!(&report.discrepancies[1], Discrepancy::Missing { .. }));
    }

    #[test]
    fn wrong_root_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("a.csv"), b"1").unwrap();
        let name = ArtifactName::new("a.csv").unwrap();
        let entries = vec![ManifestEntry::new(name, ContentDigest::compute(b"1"))];
        let manifest = Manifest::generate(entries, ContentDigest::compute(b"forged")).unwrap();

        let report = verify_dir(&manifest, tmp.path());
        assert_eq!(report.verified, 1);
        assert!(matches!(
            report.discrepancies.as_slice(),
            [Discrepancy::RootMismatch { .. }]
        ));
    }
}
