//! Proof bundle
//!
//! Everything one run produces: the manifest, the anchor attestation if
//! one was obtained, the pin record, and a status summary naming whatever
//! evidence is missing.

use crate::anchor::AnchorProof;
use crate::error::AnchorError;
use crate::pin::PinRecord;
use chrono::{DateTime, Utc};
use notary_artifact::{ContentDigest, Manifest};
use serde::{Deserialize, Serialize};

/// Kinds of evidence a run can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceKind {
    Manifest,
    AnchorProof,
    PinRecord,
}

/// How anchoring went
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorOutcome {
    /// Backend label
    pub backend: String,
    /// Attempts made
    pub attempts: u32,
    /// Attestation or the last error
    pub result: Result<AnchorProof, AnchorError>,
}

impl AnchorOutcome {
    /// Attestation, if one was obtained
    #[must_use]
    pub fn proof(&self) -> Option<&AnchorProof> {
        self.result.as_ref().ok()
    }
}

/// Contents of `status.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceStatus {
    /// Merkle root of the run
    pub root: ContentDigest,
    /// When the bundle was assembled
    pub created_at: DateTime<Utc>,
    /// Number of manifest entries
    pub artifacts: usize,
    /// Evidence that was produced
    pub produced: Vec<EvidenceKind>,
    /// Human-readable list of what is missing
    pub missing: Vec<String>,
    /// Anchor backend label
    pub anchor_backend: String,
    /// Anchor attempts made
    pub anchor_attempts: u32,
    /// When the attestation was received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchored_at: Option<DateTime<Utc>>,
    /// Last anchor error, if anchoring failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_error: Option<String>,
    /// Pin backend label
    pub pin_backend: String,
}

impl EvidenceStatus {
    /// Check if nothing is missing
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// A run's evidence, ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofBundle {
    manifest: Manifest,
    anchor: Option<AnchorProof>,
    pins: PinRecord,
    status: EvidenceStatus,
}

impl ProofBundle {
    /// Assemble a bundle and derive its status
    #[must_use]
    pub fn assemble(
        manifest: Manifest,
        anchor: AnchorOutcome,
        pins: PinRecord,
        pin_backend: &str,
    ) -> Self {
        let mut produced = vec![EvidenceKind::Manifest];
        let mut missing = Vec::new();

        let anchor_error = match &anchor.result {
            Ok(_) => {
                produced.push(EvidenceKind::AnchorProof);
                None
            }
            Err(e) => {
                missing.push("anchor missing".to_string());
                Some(e.to_string())
            }
        };

        if !pins.pinned.is_empty() {
            produced.push(EvidenceKind::PinRecord);
        }
        missing.extend(pins.failed.keys().map(|name| format!("pin missing for file {name}")));

        let status = EvidenceStatus {
            root: manifest.root(),
            created_at: Utc::now(),
            artifacts: manifest.len(),
            produced,
            missing,
            anchor_backend: anchor.backend,
            anchor_attempts: anchor.attempts,
            anchored_at: anchor.result.as_ref().ok().map(|p| p.anchored_at),
            anchor_error,
            pin_backend: pin_backend.to_string(),
        };

        Self {
            manifest,
            anchor: anchor.result.ok(),
            pins,
            status,
        }
    }

    /// The manifest
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// The anchor attestation, if any
    #[must_use]
    pub fn anchor(&self) -> Option<&AnchorProof> {
        self.anchor.as_ref()
    }

    /// The pin record
    #[must_use]
    pub fn pins(&self) -> &PinRecord {
        &self.pins
    }

    /// The status summary
    #[must_use]
    pub fn status(&self) -> &EvidenceStatus {
        &self.status
    }

    /// Merkle root
    #[must_use]
    pub fn root(&self) -> ContentDigest {
        self.manifest.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PinError;
    use notary_artifact::{Artifact, ArtifactName};
    use std::time::Duration;

    fn manifest() -> Manifest {
        let a = Artifact::new(ArtifactName::new("a.csv").unwrap(), b"a".to_vec());
        Manifest::from_hashed(&[a.hashed()]).unwrap()
    }

    fn proof(root: ContentDigest) -> AnchorProof {
        AnchorProof {
            root,
            backend: "http".into(),
            anchored_at: Utc::now(),
            attestation: "{}".into(),
        }
    }

    #[test]
    fn complete_bundle_has_nothing_missing() {
        let manifest = manifest();
        let mut pins = PinRecord::new();
        pins.record_pinned(ArtifactName::new("a.csv").unwrap(), "Qm".into());
        let anchor = AnchorOutcome {
            backend: "http".into(),
            attempts: 1,
            result: Ok(proof(manifest.root())),
        };

        let bundle = ProofBundle::assemble(manifest, anchor, pins, "ipfs");
        assert!(bundle.status().is_complete());
        assert_eq!(
            bundle.status().produced,
            vec![EvidenceKind::Manifest, EvidenceKind::AnchorProof, EvidenceKind::PinRecord]
        );
        assert!(bundle.anchor().is_some());
    }

    #[test]
    fn missing_items_are_listed() {
        let mut pins = PinRecord::new();
        pins.record_failed(
            ArtifactName::new("a.csv").unwrap(),
            &PinError::Timeout(Duration::from_secs(5)),
        );
        let anchor = AnchorOutcome {
            backend: "http".into(),
            attempts: 2,
            result: Err(AnchorError::Timeout(Duration::from_secs(30))),
        };

        let bundle = ProofBundle::assemble(manifest(), anchor, pins, "ipfs");
        let status = bundle.status();
        assert_eq!(status.produced, vec![EvidenceKind::Manifest]);
        assert_eq!(
            status.missing,
            vec!["anchor missing".to_string(), "pin missing for file a.csv".to_string()]
        );
        assert_eq!(status.anchor_attempts, 2);
        assert!(status.anchor_error.as_deref().unwrap().contains("timed out"));
        assert!(bundle.anchor().is_none());
    }

    #[test]
    fn status_json_round_trips() {
        let anchor = AnchorOutcome {
            backend: "disabled".into(),
            attempts: 1,
            result: Err(AnchorError::Disabled),
        };
        let bundle = ProofBundle::assemble(manifest(), anchor, PinRecord::new(), "disabled");
        let json = serde_json::to_string_pretty(bundle.status()).unwrap();
        assert!(json.contains("\"anchor missing\""));
        assert!(!json.contains("anchored_at"));
        let back: EvidenceStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(&back, bundle.status());
    }
}
