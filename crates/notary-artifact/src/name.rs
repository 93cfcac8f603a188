//! Logical artifact names
//!
//! Provides [`ArtifactName`], the stable `/`-separated name an artifact is
//! listed under in manifests, checksums and pin records.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path};
use std::str::FromStr;

/// Label of the root line in a manifest. Never a valid artifact name.
pub const ROOT_LABEL: &str = "MERKLE_ROOT";

/// Logical name of an artifact
///
/// A relative path using `/` as separator, independent of the host
/// platform. Ordering is byte-wise on the UTF-8 text, which is the
/// canonical leaf order for Merkle roots.
///
/// # Examples
/// - `results/summary.csv`
/// - `figures/density.png`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct ArtifactName(String);

impl ArtifactName {
    /// Validate and wrap a name
    ///
    /// # Errors
    /// Returns error if the name is empty, absolute, contains empty, `.` or
    /// `..` segments, contains control characters, or is the root label.
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// Build a name from a path relative to the collection base
    ///
    /// # Errors
    /// Returns error if the path is not relative, is not UTF-8, or yields an
    /// invalid name.
    pub fn from_relative_path(path: &Path) -> Result<Self, NameError> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(seg) => {
                    let seg = seg
                        .to_str()
                        .ok_or_else(|| NameError::NotUtf8(path.display().to_string()))?;
                    segments.push(seg);
                }
                Component::CurDir => {}
                _ => return Err(NameError::NotRelative(path.display().to_string())),
            }
        }
        Self::new(segments.join("/"))
    }

    /// Name as text
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Last segment (the file name)
    #[inline]
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

fn validate(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name == ROOT_LABEL {
        return Err(NameError::Reserved(name.to_string()));
    }
    if name.chars().any(char::is_control) {
        return Err(NameError::ControlCharacter(name.escape_debug().to_string()));
    }
    if name.starts_with('/') {
        return Err(NameError::NotRelative(name.to_string()));
    }
    if name.contains('\\') {
        return Err(NameError::InvalidSegment(name.to_string()));
    }
    if name
        .split('/')
        .any(|seg| seg.is_empty() || seg == "." || seg == "..")
    {
        return Err(NameError::InvalidSegment(name.to_string()));
    }
    Ok(())
}

impl Display for ArtifactName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ArtifactName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ArtifactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> serde::Deserialize<'de> for ArtifactName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Errors for invalid artifact names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    /// Empty name
    #[error("artifact name is empty")]
    Empty,

    /// Name collides with a reserved label
    #[error("artifact name '{0}' is reserved")]
    Reserved(String),

    /// Name contains a newline or other control character
    #[error("artifact name contains a control character: {0}")]
    ControlCharacter(String),

    /// Absolute path or parent traversal
    #[error("artifact name must be a relative path: {0}")]
    NotRelative(String),

    /// Empty, `.` or `..` segment, or a backslash
    #[error("artifact name has an invalid segment: {0}")]
    InvalidSegment(String),

    /// Path is not valid UTF-8
    #[error("artifact path is not valid UTF-8: {0}")]
    NotUtf8(String),
}
