//! Error types for the notarization pipeline
//!
//! Provides error handling for:
//! - Artifact collection and hashing (fatal)
//! - Anchoring and pinning (recoverable, recorded in the bundle)
//! - Proof bundle persistence (fatal for the run's success signal)
//! - Configuration loading

use crate::state::RunState;
use notary_artifact::{ArtifactName, InputError, ManifestError};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level run error
///
/// Every variant is fatal for the run. Anchor and pin failures never show
/// up here; they are recorded in the proof bundle instead.
#[derive(Debug, thiserror::Error)]
pub enum NotaryError {
    /// Artifact collection failed
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// Hashing or root computation failed
    #[error("hash error: {0}")]
    Hash(#[from] HashError),

    /// Proof bundle could not be written
    #[error("persist error: {0}")]
    Persist(#[from] PersistError),

    /// Latest stored bundle could not be read for the unchanged check
    #[error("cannot read latest bundle: {0}")]
    PriorBundle(#[source] PersistError),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State machine rejected a transition
    #[error("illegal state transition: {from} -> {to}")]
    IllegalTransition { from: RunState, to: RunState },

    /// Run aborted before persisting
    #[error("run cancelled during {stage}")]
    Cancelled { stage: RunState },
}

impl NotaryError {
    /// Stage of the pipeline the error belongs to
    #[must_use]
    pub fn stage(&self) -> RunState {
        match self {
            Self::Input(_) | Self::Config(_) => RunState::Collecting,
            Self::Hash(_) => RunState::Hashing,
            Self::PriorBundle(_) => RunState::RootComputed,
            Self::Persist(_) => RunState::Persisting,
            Self::IllegalTransition { from, .. } => *from,
            Self::Cancelled { stage } => *stage,
        }
    }

    /// Check if the run was cancelled rather than failing
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Hashing failures
///
/// Hashing well-formed bytes cannot fail; these cover the machinery around
/// it.
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Hashing task panicked or was aborted
    #[error("hashing task failed: {0}")]
    TaskFailed(String),

    /// Produced manifest is inconsistent
    #[error("manifest construction failed: {0}")]
    Manifest(#[from] ManifestError),
}

/// Anchoring failures (recoverable)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnchorError {
    /// Network or connection failure
    #[error("anchor service unreachable: {0}")]
    Unreachable(String),

    /// Service answered with a non-success status
    #[error("anchor service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body was not a usable attestation
    #[error("malformed anchor response: {0}")]
    MalformedResponse(String),

    /// No answer within the configured timeout
    #[error("anchor request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// No anchor backend configured
    #[error("anchoring disabled")]
    Disabled,
}

impl AnchorError {
    /// Check if another attempt might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::MalformedResponse(_) | Self::Disabled => false,
        }
    }
}

/// Pinning failure for a single file (recoverable)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PinError {
    /// Network or connection failure
    #[error("pinning service unreachable: {0}")]
    Unreachable(String),

    /// Service answered with a non-success status
    #[error("pinning service returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response did not contain a content identifier
    #[error("malformed pin response: {0}")]
    MalformedResponse(String),

    /// No answer within the configured timeout
    #[error("pin request timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// Local content store failure
    #[error("local pin store error: {0}")]
    Storage(String),

    /// No pin backend configured
    #[error("pinning disabled")]
    Disabled,
}

impl PinError {
    /// Check if another attempt might succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout(_) | Self::Storage(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::MalformedResponse(_) | Self::Disabled => false,
        }
    }
}

/// Evidence store failures
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Filesystem failure
    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Bundle metadata could not be encoded or decoded
    #[error("bundle encoding error at {}: {source}", path.display())]
    Encoding {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Persisted manifest is unreadable
    #[error("stored manifest at {} is invalid: {source}", path.display())]
    CorruptManifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    /// `CURRENT` names a bundle that does not exist
    #[error("store pointer references missing bundle: {0}")]
    DanglingPointer(String),
}

impl PersistError {
    /// Create IO error for path
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Configuration failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file unreadable
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for the schema
    #[error("cannot parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Semantically invalid value
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// Manifest name collides with an artifact
    #[error("manifest name '{0}' collides with an artifact")]
    ManifestNameCollision(ArtifactName),

    /// HTTP client could not be constructed
    #[error("cannot build http client: {0}")]
    HttpClient(String),
}

impl ConfigError {
    /// Create invalid-value error
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notary_error_display_is_stage_tagged() {
        let err = NotaryError::Cancelled {
            stage: RunState::Anchoring,
        };
        assert_eq!(err.to_string(), "run cancelled during ANCHORING");
        assert_eq!(err.stage(), RunState::Anchoring);
        assert!(err.is_cancelled());
    }

    #[test]
    fn input_errors_belong_to_collecting() {
        let err = NotaryError::from(InputError::Missing(PathBuf::from("a.csv")));
        assert_eq!(err.stage(), RunState::Collecting);
        assert!(err.to_string().contains("a.csv"));
    }

    #[test]
    fn prior_bundle_errors_belong_to_root_computed() {
        let err = NotaryError::PriorBundle(PersistError::DanglingPointer("000003-abcdef".into()));
        assert_eq!(err.stage(), RunState::RootComputed);
        assert!(err.to_string().contains("000003-abcdef"));

        let err = NotaryError::from(PersistError::DanglingPointer("x".into()));
        assert_eq!(err.stage(), RunState::Persisting);
    }

    #[test]
    fn anchor_error_retryability() {
        assert!(AnchorError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(AnchorError::Unreachable("refused".into()).is_retryable());
        assert!(AnchorError::Status {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!AnchorError::Status {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!AnchorError::MalformedResponse("not json".into()).is_retryable());
        assert!(!AnchorError::Disabled.is_retryable());
    }

    #[test]
    fn pin_error_retryability() {
        assert!(PinError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!PinError::Disabled.is_retryable());
        assert!(PinError::Status {
            status: 429,
            body: "slow down".into()
        }
        .is_retryable());
    }

    #[test]
    fn timeout_display() {
        let err = AnchorError::Timeout(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "anchor request timed out after 1.5s");
    }
}
