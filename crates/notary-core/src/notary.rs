//! Notarization orchestrator
//!
//! Drives one run through the state machine:
//!
//! 1. Hash every artifact on the blocking pool and build the manifest
//! 2. Stop early if the manifest matches the latest stored one
//! 3. Anchor the root and pin the files concurrently, retrying per policy
//! 4. Persist the proof bundle atomically
//!
//! Anchor and pin failures never abort a run; they are recorded in the
//! bundle. Cancellation is honoured up to the start of persisting.

use crate::anchor::AnchorClient;
use crate::bundle::{AnchorOutcome, EvidenceStatus, ProofBundle};
use crate::config::NotaryConfig;
use crate::error::{ConfigError, HashError, NotaryError};
use crate::pin::{PinClient, PinRecord};
use crate::state::{RunState, RunTracker};
use crate::store::{EvidenceStore, StoredBundle};
use notary_artifact::{Artifact, ArtifactName, ArtifactSet, ContentDigest, Manifest};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Attempt limit and fixed delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least 1
    pub max_attempts: u32,
    /// Pause before each retry
    pub delay: Duration,
}

impl RetryPolicy {
    /// Policy with the given limits
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// A single attempt
    #[must_use]
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new bundle was written, possibly with missing evidence
    Persisted {
        bundle: StoredBundle,
        status: EvidenceStatus,
    },
    /// Manifest identical to the latest bundle's; nothing was done
    Unchanged { bundle: StoredBundle },
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Merkle root of the artifact set
    pub root: ContentDigest,
    /// Number of artifacts
    pub artifacts: usize,
    /// Persisted or unchanged
    pub outcome: RunOutcome,
    /// States visited, ending in `DONE`
    pub trail: Vec<RunState>,
}

impl RunReport {
    /// Check if this run wrote nothing
    #[must_use]
    pub fn is_unchanged(&self) -> bool {
        matches!(self.outcome, RunOutcome::Unchanged { .. })
    }

    /// Bundle written by or matching this run
    #[must_use]
    pub fn bundle(&self) -> &StoredBundle {
        match &self.outcome {
            RunOutcome::Persisted { bundle, .. } | RunOutcome::Unchanged { bundle } => bundle,
        }
    }

    /// Status of a newly persisted bundle
    #[must_use]
    pub fn status(&self) -> Option<&EvidenceStatus> {
        match &self.outcome {
            RunOutcome::Persisted { status, .. } => Some(status),
            RunOutcome::Unchanged { .. } => None,
        }
    }

    /// Missing evidence items; empty for unchanged runs
    #[must_use]
    pub fn missing(&self) -> &[String] {
        self.status().map_or(&[], |s| s.missing.as_slice())
    }
}

/// Runs the notarization pipeline against one evidence store
#[derive(Debug, Clone)]
pub struct Notary {
    anchor: AnchorClient,
    pins: PinClient,
    store: EvidenceStore,
    manifest_name: ArtifactName,
    anchor_retry: RetryPolicy,
    pin_retry: RetryPolicy,
    force: bool,
}

impl Notary {
    /// Create a notary from its collaborators
    #[must_use]
    pub fn new(
        anchor: AnchorClient,
        pins: PinClient,
        store: EvidenceStore,
        manifest_name: ArtifactName,
    ) -> Self {
        Self {
            anchor,
            pins,
            store,
            manifest_name,
            anchor_retry: RetryPolicy::default(),
            pin_retry: RetryPolicy::default(),
            force: false,
        }
    }

    /// Build backends and open the store described by `config`
    ///
    /// # Errors
    /// Returns error if the config is invalid, a backend cannot be
    /// constructed, or the store cannot be opened
    pub fn from_config(config: &NotaryConfig) -> Result<Self, NotaryError> {
        config.validate()?;
        let anchor = AnchorClient::from_config(config.anchor.as_ref())?;
        let pins = PinClient::from_config(config.pin.as_ref())?;
        let store = EvidenceStore::open(&config.store_dir)?;

        let mut notary = Self::new(anchor, pins, store, config.manifest_artifact_name()?);
        if let Some(a) = &config.anchor {
            notary.anchor_retry = RetryPolicy::new(a.max_attempts, a.retry_delay());
        }
        if let Some(p) = &config.pin {
            notary.pin_retry = RetryPolicy::new(p.max_attempts, p.retry_delay());
        }
        Ok(notary)
    }

    /// With anchor retry policy
    #[inline]
    #[must_use]
    pub fn with_anchor_retry(mut self, policy: RetryPolicy) -> Self {
        self.anchor_retry = policy;
        self
    }

    /// With pin retry policy
    #[inline]
    #[must_use]
    pub fn with_pin_retry(mut self, policy: RetryPolicy) -> Self {
        self.pin_retry = policy;
        self
    }

    /// Persist even when the manifest is unchanged
    #[inline]
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Evidence store
    #[must_use]
    pub fn store(&self) -> &EvidenceStore {
        &self.store
    }

    /// Notarize `artifacts`
    ///
    /// # Errors
    /// Returns error on input, hash or persist failure
    pub async fn run(&self, artifacts: ArtifactSet) -> Result<RunReport, NotaryError> {
        self.run_until(artifacts, std::future::pending()).await
    }

    /// Notarize `artifacts`, aborting if `shutdown` completes before the
    /// bundle starts being written
    ///
    /// # Errors
    /// Returns error on input, hash or persist failure, or
    /// [`NotaryError::Cancelled`] when shut down
    pub async fn run_until<S>(&self, artifacts: ArtifactSet, shutdown: S) -> Result<RunReport, NotaryError>
    where
        S: Future<Output = ()>,
    {
        let mut tracker = RunTracker::new();
        tokio::pin!(shutdown);

        let result = self.drive(&mut tracker, &artifacts, shutdown).await;
        if let Err(e) = &result {
            tracker.fail();
            if e.is_cancelled() {
                tracing::warn!("run {}: {}", tracker.current(), e);
            } else {
                tracing::error!("run {}: {}", tracker.current(), e);
            }
        }
        result
    }

    async fn drive<S>(
        &self,
        tracker: &mut RunTracker,
        artifacts: &ArtifactSet,
        mut shutdown: Pin<&mut S>,
    ) -> Result<RunReport, NotaryError>
    where
        S: Future<Output = ()>,
    {
        if artifacts.contains(&self.manifest_name) {
            return Err(ConfigError::ManifestNameCollision(self.manifest_name.clone()).into());
        }
        if artifacts.is_empty() {
            tracing::warn!("no artifacts to notarize; anchoring the empty-tree root");
        }

        tracker.advance(RunState::Hashing)?;
        tracing::info!("hashing {} artifacts", artifacts.len());
        let manifest = or_shutdown(shutdown.as_mut(), hash_artifacts(artifacts))
            .await
            .ok_or(NotaryError::Cancelled {
                stage: RunState::Hashing,
            })??;

        tracker.advance(RunState::RootComputed)?;
        let root = manifest.root();
        let text = manifest.to_text();
        tracing::info!("merkle root {} over {} artifacts", root, manifest.len());

        if !self.force {
            let latest = self.store.latest().map_err(NotaryError::PriorBundle)?;
            if let Some(latest) = latest {
                let stored = latest.manifest_text().map_err(NotaryError::PriorBundle)?;
                if stored == text {
                    tracker.advance(RunState::Done)?;
                    tracing::info!("manifest unchanged since {}; nothing to do", latest.name);
                    return Ok(RunReport {
                        root,
                        artifacts: manifest.len(),
                        outcome: RunOutcome::Unchanged { bundle: latest },
                        trail: tracker.trail().to_vec(),
                    });
                }
            }
        }

        tracker.advance(RunState::Anchoring)?;
        tracing::info!(
            "anchoring via {} and pinning via {}",
            self.anchor.kind(),
            self.pins.kind()
        );
        let mut files: Vec<Artifact> = artifacts.iter().cloned().collect();
        files.push(Artifact::new(self.manifest_name.clone(), text.into_bytes()));

        let evidence = async {
            let anchored = async {
                let outcome = self.anchor_with_retry(root).await;
                tracker.advance(RunState::Pinning).map(|()| outcome)
            };
            tokio::join!(anchored, self.pin_with_retry(&files))
        };
        let Some((anchor, pins)) = or_shutdown(shutdown.as_mut(), evidence).await else {
            return Err(NotaryError::Cancelled {
                stage: tracker.current(),
            });
        };
        let anchor = anchor?;

        tracker.advance(RunState::Persisting)?;
        let bundle = ProofBundle::assemble(manifest, anchor, pins, self.pins.kind());
        let stored = self.store.persist(&bundle)?;

        tracker.advance(RunState::Done)?;
        let status = bundle.status().clone();
        if status.is_complete() {
            tracing::info!("bundle {} complete", stored.name);
        } else {
            tracing::warn!(
                "bundle {} persisted with {} missing item(s)",
                stored.name,
                status.missing.len()
            );
        }

        Ok(RunReport {
            root,
            artifacts: bundle.manifest().len(),
            outcome: RunOutcome::Persisted {
                bundle: stored,
                status,
            },
            trail: tracker.trail().to_vec(),
        })
    }

    async fn anchor_with_retry(&self, root: ContentDigest) -> AnchorOutcome {
        let policy = self.anchor_retry;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.anchor.anchor(root).await {
                Ok(proof) => {
                    tracing::info!("root {} anchored on attempt {}", root.short(), attempts);
                    return AnchorOutcome {
                        backend: self.anchor.kind().to_string(),
                        attempts,
                        result: Ok(proof),
                    };
                }
                Err(e) if e.is_retryable() && attempts < policy.max_attempts => {
                    tracing::warn!("anchor attempt {} failed: {}; retrying", attempts, e);
                    tokio::time::sleep(policy.delay).await;
                }
                Err(e) => {
                    tracing::warn!("anchor missing after {} attempt(s): {}", attempts, e);
                    return AnchorOutcome {
                        backend: self.anchor.kind().to_string(),
                        attempts,
                        result: Err(e),
                    };
                }
            }
        }
    }

    async fn pin_with_retry(&self, files: &[Artifact]) -> PinRecord {
        let policy = self.pin_retry;
        let mut record = PinRecord::new();
        let mut pending = files.to_vec();

        for attempt in 1..=policy.max_attempts {
            let round = self.pins.pin(&pending).await;
            record.merge(round.record);
            if round.retryable.is_empty() || attempt == policy.max_attempts {
                break;
            }
            tracing::warn!(
                "retrying {} pin(s) after attempt {}",
                round.retryable.len(),
                attempt
            );
            tokio::time::sleep(policy.delay).await;
            pending = round.retryable;
        }

        tracing::info!(
            "pinned {} of {} files",
            record.pinned.len(),
            files.len()
        );
        record
    }
}

async fn hash_artifacts(artifacts: &ArtifactSet) -> Result<Manifest, NotaryError> {
    let set = artifacts.clone();
    let manifest = tokio::task::spawn_blocking(move || Manifest::from_hashed(&set.hash_all()))
        .await
        .map_err(|e| HashError::TaskFailed(e.to_string()))?
        .map_err(HashError::from)?;
    Ok(manifest)
}

/// Run `work` unless `shutdown` fires first
async fn or_shutdown<S, F>(shutdown: Pin<&mut S>, work: F) -> Option<F::Output>
where
    S: Future<Output = ()>,
    F: Future,
{
    tokio::select! {
        biased;
        () = shutdown => None,
        out = work => Some(out),
    }
}
