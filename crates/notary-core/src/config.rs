//! Notary configuration
//!
//! Loaded from TOML; CLI flags are applied on top with the `with_*`
//! builders. An absent `[anchor]` or `[pin]` table disables that stage and
//! the run records the evidence as missing.

use crate::error::ConfigError;
use notary_artifact::ArtifactName;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default manifest artifact name
pub const DEFAULT_MANIFEST_NAME: &str = "MANIFEST.sha256";

/// Default checksums file name inside the store directory
pub const DEFAULT_CHECKSUMS_NAME: &str = "checksums.sha256";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotaryConfig {
    /// Directory whose files are notarized
    pub input_dir: PathBuf,
    /// Directory covered by the checksums file (defaults to `input_dir`)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    /// Evidence store root
    pub store_dir: PathBuf,
    /// Checksums output (defaults to `<store_dir>/checksums.sha256`)
    #[serde(default)]
    pub checksums_path: Option<PathBuf>,
    /// Name under which the manifest itself is pinned
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
    /// Timestamping service
    #[serde(default)]
    pub anchor: Option<AnchorConfig>,
    /// Content-addressed storage
    #[serde(default)]
    pub pin: Option<PinConfig>,
}

fn default_manifest_name() -> String {
    DEFAULT_MANIFEST_NAME.to_string()
}

impl Default for NotaryConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("artifacts"),
            data_dir: None,
            store_dir: PathBuf::from("evidence"),
            checksums_path: None,
            manifest_name: default_manifest_name(),
            anchor: None,
            pin: None,
        }
    }
}

impl NotaryConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// Returns error if the file is unreadable, not valid TOML for the
    /// schema, or fails [`validate`](Self::validate)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// With input directory
    #[inline]
    #[must_use]
    pub fn with_input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = dir.into();
        self
    }

    /// With checksummed data directory
    #[inline]
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// With evidence store directory
    #[inline]
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = dir.into();
        self
    }

    /// With checksums output path
    #[inline]
    #[must_use]
    pub fn with_checksums_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checksums_path = Some(path.into());
        self
    }

    /// With manifest name
    #[inline]
    #[must_use]
    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    /// With anchoring enabled
    #[inline]
    #[must_use]
    pub fn with_anchor(mut self, anchor: AnchorConfig) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// With pinning enabled
    #[inline]
    #[must_use]
    pub fn with_pin(mut self, pin: PinConfig) -> Self {
        self.pin = Some(pin);
        self
    }

    /// Directory covered by the checksums file
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        self.data_dir.as_deref().unwrap_or(&self.input_dir)
    }

    /// Where the checksums file is written
    #[must_use]
    pub fn checksums_path(&self) -> PathBuf {
        self.checksums_path
            .clone()
            .unwrap_or_else(|| self.store_dir.join(DEFAULT_CHECKSUMS_NAME))
    }

    /// Manifest name as an artifact name
    ///
    /// # Errors
    /// Returns error if the configured name is not a valid artifact name
    pub fn manifest_artifact_name(&self) -> Result<ArtifactName, ConfigError> {
        ArtifactName::new(self.manifest_name.as_str())
            .map_err(|e| ConfigError::invalid("manifest_name", e.to_string()))
    }

    /// Check semantic constraints the schema cannot express
    ///
    /// # Errors
    /// Returns the first invalid field found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("input_dir", "must not be empty"));
        }
        if self.store_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("store_dir", "must not be empty"));
        }
        self.manifest_artifact_name()?;
        if let Some(anchor) = &self.anchor {
            anchor.validate()?;
        }
        if let Some(pin) = &self.pin {
            pin.validate()?;
        }
        Ok(())
    }
}

/// Anchor backend kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnchorKind {
    /// JSON over HTTP timestamping service
    #[default]
    Http,
}

/// `[anchor]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    /// Backend kind
    #[serde(default)]
    pub kind: AnchorKind,
    /// Submission URL
    pub endpoint: String,
    /// Per-attempt timeout
    #[serde(default = "default_anchor_timeout")]
    pub timeout_secs: u64,
    /// Attempts before the anchor is recorded as missing
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_anchor_timeout() -> u64 {
    30
}

fn default_pin_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retry_delay() -> u64 {
    500
}

fn default_concurrency() -> usize {
    4
}

impl AnchorConfig {
    /// HTTP anchor with defaults
    #[must_use]
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self {
            kind: AnchorKind::Http,
            endpoint: endpoint.into(),
            timeout_secs: default_anchor_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }

    /// With timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// With attempt limit
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Per-attempt timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay between attempts
    #[inline]
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_endpoint("anchor.endpoint", &self.endpoint)?;
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid("anchor.timeout_secs", "must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("anchor.max_attempts", "must be positive"));
        }
        Ok(())
    }
}

/// Pin backend selection, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PinBackendConfig {
    /// IPFS HTTP API
    Ipfs {
        /// API base URL, e.g. `http://127.0.0.1:5001`
        endpoint: String,
    },
    /// Content-addressed local directory
    Local {
        /// Target directory
        dir: PathBuf,
    },
}

/// `[pin]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinConfig {
    /// Backend
    #[serde(flatten)]
    pub backend: PinBackendConfig,
    /// Per-file timeout
    #[serde(default = "default_pin_timeout")]
    pub timeout_secs: u64,
    /// Attempts per file before it is recorded as failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay between rounds of re-submission
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Files in flight at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl PinConfig {
    /// Pin config with defaults for the given backend
    #[must_use]
    pub fn new(backend: PinBackendConfig) -> Self {
        Self {
            backend,
            timeout_secs: default_pin_timeout(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            concurrency: default_concurrency(),
        }
    }

    /// IPFS pinning with defaults
    #[must_use]
    pub fn ipfs(endpoint: impl Into<String>) -> Self {
        Self::new(PinBackendConfig::Ipfs {
            endpoint: endpoint.into(),
        })
    }

    /// Local directory pinning with defaults
    #[must_use]
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self::new(PinBackendConfig::Local { dir: dir.into() })
    }

    /// With per-file timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// With attempt limit
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// With concurrency limit
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Per-file timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Delay between rounds
    #[inline]
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match &self.backend {
            PinBackendConfig::Ipfs { endpoint } => validate_endpoint("pin.endpoint", endpoint)?,
            PinBackendConfig::Local { dir } => {
                if dir.as_os_str().is_empty() {
                    return Err(ConfigError::invalid("pin.dir", "must not be empty"));
                }
            }
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::invalid("pin.timeout_secs", "must be positive"));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("pin.max_attempts", "must be positive"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::invalid("pin.concurrency", "must be positive"));
        }
        Ok(())
    }
}

fn validate_endpoint(field: &'static str, endpoint: &str) -> Result<(), ConfigError> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(ConfigError::invalid(field, "must not be empty"));
    }
    if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
        return Err(ConfigError::invalid(field, "must be an http(s) URL"));
    }
    Ok(())
}
