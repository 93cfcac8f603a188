//! Content digest primitives
//!
//! Provides [`ContentDigest`], a strongly-typed 32-byte SHA-256 digest used
//! for leaves, Merkle nodes and the anchored root.

use sha2::{Digest, Sha256};
use std::fmt::{self, Display, Formatter};
use std::io::{self, Read};
use std::str::FromStr;

/// Length of a digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Read buffer used by the streaming hasher
const STREAM_CHUNK: usize = 64 * 1024;

/// Tag hashed to produce [`ContentDigest::EMPTY_TREE`]
pub const EMPTY_TREE_TAG: &[u8] = b"evidence-notary:empty-merkle-tree";

/// A 32-byte SHA-256 digest
///
/// Immutable and cheap to copy. Ordering is byte-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Reserved root of a Merkle tree with no leaves.
    ///
    /// SHA-256 of [`EMPTY_TREE_TAG`]. Kept distinct from the digest of the
    /// empty byte string so that a run over zero artifacts never anchors the
    /// same root as a run over a single empty file.
    pub const EMPTY_TREE: Self = Self([
        0x47, 0x19, 0xeb, 0x6f, 0xfb, 0x91, 0x0b, 0x8c, 0x99, 0x33, 0x75, 0x03, 0x18, 0xce, 0xcc,
        0xa5, 0x3c, 0x55, 0x43, 0x15, 0x0a, 0xb3, 0xe7, 0xde, 0x40, 0xd6, 0xd3, 0x4a, 0x98, 0x2c,
        0xaf, 0x9c,
    ]);

    /// Create a digest from raw bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Get reference to the underlying bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Convert to byte array
    #[inline]
    #[must_use]
    pub const fn into_bytes(self) -> [u8; DIGEST_LEN] {
        self.0
    }

    /// Create digest from byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DigestError> {
        let arr: [u8; DIGEST_LEN] =
            bytes
                .try_into()
                .map_err(|_| DigestError::InvalidLength {
                    expected: DIGEST_LEN,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    /// SHA-256 of a whole buffer
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// SHA-256 of everything a reader yields
    ///
    /// Produces the same digest as [`compute`](Self::compute) over the
    /// concatenated bytes, without holding them in memory.
    ///
    /// # Errors
    /// Propagates read errors
    pub fn compute_reader<R: Read>(mut reader: R) -> io::Result<Self> {
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }

    /// Digest of `left ++ right`, the Merkle node combinator
    #[inline]
    #[must_use]
    pub fn combine(left: &Self, right: &Self) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(left.0);
        hasher.update(right.0);
        Self(hasher.finalize().into())
    }

    /// Lowercase hex encoding (64 chars)
    #[inline]
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short string representation (first 16 hex chars)
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ContentDigest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != DIGEST_LEN * 2 {
            return Err(DigestError::InvalidLength {
                expected: DIGEST_LEN,
                actual: s.len() / 2,
            });
        }
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(DigestError::NotLowercase);
        }
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for ContentDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl serde::Serialize for ContentDigest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> serde::Deserialize<'de> for ContentDigest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct DigestVisitor;

        impl serde::de::Visitor<'_> for DigestVisitor {
            type Value = ContentDigest;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("a 32-byte digest as lowercase hex or raw bytes")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value.parse().map_err(serde::de::Error::custom)
            }

            fn visit_bytes<E>(self, value: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                ContentDigest::from_slice(value).map_err(serde::de::Error::custom)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(DigestVisitor)
        } else {
            deserializer.deserialize_bytes(DigestVisitor)
        }
    }
}

/// Errors that can occur when decoding digests
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// Invalid digest length
    #[error("invalid digest length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Uppercase hex is rejected so textual digests stay canonical
    #[error("digest hex must be lowercase")]
    NotLowercase,

    /// Hex decoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}
