//! Binary Merkle tree over leaf digests
//!
//! Thin wrapper around the `rs_merkle` crate with SHA-256 nodes. Pairs are
//! hashed left to right as `SHA-256(left ++ right)`; an unpaired last node
//! is carried forward unchanged to the next level. It is never duplicated
//! and no padding is added.
//!
//! Callers must canonicalize leaf order (by artifact name) before building:
//! the root depends on order.

use crate::hash::ContentDigest;
use rs_merkle::algorithms::Sha256;
use rs_merkle::MerkleTree as RsMerkleTree;
use serde::{Deserialize, Serialize};

/// Root digest of an ordered list of leaves
///
/// - zero leaves: [`ContentDigest::EMPTY_TREE`]
/// - one leaf: that leaf
#[must_use]
pub fn build_root(leaves: &[ContentDigest]) -> ContentDigest {
    MerkleTree::from_leaves(leaves).root()
}

/// Merkle tree able to hand out inclusion proofs
pub struct MerkleTree {
    inner: RsMerkleTree<Sha256>,
    leaf_count: usize,
}

impl std::fmt::Debug for MerkleTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerkleTree")
            .field("leaf_count", &self.leaf_count)
            .field("root", &self.root())
            .finish()
    }
}

impl MerkleTree {
    /// Build from ordered leaf digests
    ///
    /// # Performance
    /// O(n) hashes
    #[must_use]
    pub fn from_leaves(leaves: &[ContentDigest]) -> Self {
        let raw: Vec<[u8; 32]> = leaves.iter().map(|d| d.into_bytes()).collect();
        Self {
            inner: RsMerkleTree::from_leaves(&raw),
            leaf_count: leaves.len(),
        }
    }

    /// Root digest
    ///
    /// Returns [`ContentDigest::EMPTY_TREE`] for an empty tree.
    #[must_use]
    pub fn root(&self) -> ContentDigest {
        self.inner
            .root()
            .map_or(ContentDigest::EMPTY_TREE, ContentDigest::new)
    }

    /// Number of leaves
    #[inline]
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Check if tree is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Inclusion proof for the leaf at `index`
    ///
    /// Returns `None` if `index` is out of range. Levels where the node was
    /// carried forward without a sibling contribute no hash.
    #[must_use]
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaf_count {
            return None;
        }
        let proof = self.inner.proof(&[index]);
        Some(MerkleProof {
            leaf_index: index,
            leaf_count: self.leaf_count,
            siblings: proof
                .proof_hashes()
                .iter()
                .copied()
                .map(ContentDigest::new)
                .collect(),
        })
    }
}

/// Inclusion proof for a single leaf
///
/// Serializable form of an `rs_merkle` proof: the sibling hashes from leaf
/// to root plus the position needed to replay them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the proven leaf
    pub leaf_index: usize,
    /// Number of leaves in the tree the proof was taken from
    pub leaf_count: usize,
    /// Sibling digests, leaf level first
    pub siblings: Vec<ContentDigest>,
}

impl MerkleProof {
    fn to_rs(&self) -> rs_merkle::MerkleProof<Sha256> {
        rs_merkle::MerkleProof::new(self.siblings.iter().map(|d| d.into_bytes()).collect())
    }

    /// Recompute the root from `leaf` along this proof
    ///
    /// Returns `None` if the proof does not fit its recorded tree shape.
    #[must_use]
    pub fn compute_root(&self, leaf: ContentDigest) -> Option<ContentDigest> {
        if self.leaf_index >= self.leaf_count {
            return None;
        }
        self.to_rs()
            .root(&[self.leaf_index], &[leaf.into_bytes()], self.leaf_count)
            .ok()
            .map(ContentDigest::new)
    }

    /// Check that `leaf` is committed to by `root`
    #[must_use]
    pub fn verify(&self, leaf: ContentDigest, root: ContentDigest) -> bool {
        self.leaf_index < self.leaf_count
            && self.to_rs().verify(
                root.into_bytes(),
                &[self.leaf_index],
                &[leaf.into_bytes()],
                self.leaf_count,
            )
    }
}
