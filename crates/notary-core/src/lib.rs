//! Notary Core
//!
//! Orchestrates evidence notarization of an artifact set: hash, build the
//! Merkle manifest, anchor the root, pin the files, and persist a proof
//! bundle.
//!
//! # Architecture
//!
//! ```text
//! ArtifactSet ─► hash (blocking pool) ─► Manifest + root
//!                                            │
//!                      ┌─────────────────────┴───────────────┐
//!                      ▼                                     ▼
//!              AnchorClient (retry)                   PinClient (retry)
//!                      └─────────────────────┬───────────────┘
//!                                            ▼
//!                                 ProofBundle ─► EvidenceStore
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use notary_core::{NotaryConfig, NotaryJob};
//!
//! let config = NotaryConfig::load("notary.toml".as_ref())?;
//! let report = NotaryJob::new(config).execute().await?;
//! println!("root {}", report.run.root);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod anchor;
pub mod backend;
pub mod bundle;
pub mod config;
pub mod error;
pub mod job;
pub mod notary;
pub mod pin;
pub mod state;
pub mod store;
pub mod verify;

pub use anchor::{AnchorClient, AnchorProof};
pub use backend::{AnchorBackend, PinBackend};
pub use bundle::{AnchorOutcome, EvidenceKind, EvidenceStatus, ProofBundle};
pub use config::{AnchorConfig, NotaryConfig, PinBackendConfig, PinConfig};
pub use error::{AnchorError, ConfigError, HashError, NotaryError, PersistError, PinError};
pub use job::{JobReport, NotaryJob};
pub use notary::{Notary, RetryPolicy, RunOutcome, RunReport};
pub use pin::{PinClient, PinRecord, PinRound};
pub use state::{FailedAt, RunState, RunTracker};
pub use store::{EvidenceStore, StoredBundle};
pub use verify::{verify_dir, Discrepancy, VerifyReport};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
