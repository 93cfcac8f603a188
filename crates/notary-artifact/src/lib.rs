//! Notary Artifact
//!
//! Hashing, Merkle roots and manifests for artifact sets.
//!
//! # Core Concepts
//!
//! - [`ContentDigest`]: 32-byte SHA-256 digest of artifact content
//! - [`ArtifactSet`]: the artifacts of one run, in canonical name order
//! - [`build_root`]: carry-forward binary Merkle reduction
//! - [`Manifest`]: stable `digest  name` listing plus root
//! - [`Checksums`]: flat per-file checksums of a data directory
//!
//! # Example
//!
//! ```rust,ignore
//! use notary_artifact::{ArtifactSet, CollectOptions, Manifest};
//!
//! let set = ArtifactSet::collect_dir(dir, &CollectOptions::default())?;
//! let manifest = Manifest::from_hashed(&set.hash_all())?;
//! println!("root: {}", manifest.root());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod checksums;
mod hash;
mod manifest;
mod name;

/// Merkle tree support
pub mod merkle;

pub use artifact::{walk_files, Artifact, ArtifactSet, CollectOptions, HashedArtifact, InputError};
pub use checksums::{ChecksumEntry, Checksums};
pub use hash::{ContentDigest, DigestError, DIGEST_LEN, EMPTY_TREE_TAG};
pub use manifest::{Manifest, ManifestEntry, ManifestError, SEPARATOR};
pub use merkle::{build_root, MerkleProof, MerkleTree};
pub use name::{ArtifactName, NameError, ROOT_LABEL};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
