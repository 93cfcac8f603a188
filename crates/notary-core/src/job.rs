//! Batch notarization job
//!
//! Wires configuration to a full run: collect the input directory, run the
//! [`Notary`], then regenerate the checksums file. The checksums file is
//! rewritten even when the run finds nothing new.

use crate::config::{NotaryConfig, PinBackendConfig};
use crate::error::NotaryError;
use crate::notary::{Notary, RunReport};
use crate::store::write_atomic;
use notary_artifact::{ArtifactSet, Checksums, CollectOptions, InputError};
use std::future::Future;
use std::path::{Path, PathBuf};

/// Result of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    /// Notarization run summary
    pub run: RunReport,
    /// Where the checksums file was written
    pub checksums_path: PathBuf,
    /// Number of files in the checksums file
    pub checksummed: usize,
}

/// One configured notarization job
#[derive(Debug, Clone)]
pub struct NotaryJob {
    config: NotaryConfig,
    force: bool,
}

impl NotaryJob {
    /// Create a job
    #[must_use]
    pub fn new(config: NotaryConfig) -> Self {
        Self {
            config,
            force: false,
        }
    }

    /// Persist even when the manifest is unchanged
    #[inline]
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Configuration in effect
    #[must_use]
    pub fn config(&self) -> &NotaryConfig {
        &self.config
    }

    /// Run to completion
    ///
    /// # Errors
    /// Returns error on configuration, input, hash or persist failure
    pub async fn execute(&self) -> Result<JobReport, NotaryError> {
        self.execute_until(std::future::pending()).await
    }

    /// Run, aborting if `shutdown` completes before persisting starts
    ///
    /// # Errors
    /// Returns error on configuration, input, hash or persist failure, or
    /// [`NotaryError::Cancelled`]
    pub async fn execute_until<S>(&self, shutdown: S) -> Result<JobReport, NotaryError>
    where
        S: Future<Output = ()>,
    {
        self.config.validate()?;
        let options = self.collect_options();

        // Nothing is created on disk until the input has been collected
        let input = absolute(&self.config.input_dir);
        tracing::info!("collecting artifacts from {}", input.display());
        let artifacts = blocking(&input, {
            let (input, options) = (input.clone(), options.clone());
            move || ArtifactSet::collect_dir(&input, &options)
        })
        .await?;

        let notary = Notary::from_config(&self.config)?.with_force(self.force);
        let run = notary.run_until(artifacts, shutdown).await?;

        let data_dir = absolute(self.config.data_dir());
        let checksums = blocking(&data_dir, {
            let (data_dir, options) = (data_dir.clone(), options.include_hidden());
            move || Checksums::compute(&data_dir, &options)
        })
        .await?;
        let checksums_path = self.config.checksums_path();
        write_atomic(&checksums_path, checksums.to_text().as_bytes())?;
        tracing::info!(
            "wrote {} checksums to {}",
            checksums.len(),
            checksums_path.display()
        );

        Ok(JobReport {
            run,
            checksums_path,
            checksummed: checksums.len(),
        })
    }

    /// Paths the job writes to are never collected or checksummed
    fn collect_options(&self) -> CollectOptions {
        let mut options = CollectOptions::default()
            .exclude(absolute(&self.config.store_dir))
            .exclude(absolute(&self.config.checksums_path()));
        if let Some(pin) = &self.config.pin {
            if let PinBackendConfig::Local { dir } = &pin.backend {
                options = options.exclude(absolute(dir));
            }
        }
        options
    }
}

async fn blocking<T, F>(path: &Path, f: F) -> Result<T, InputError>
where
    F: FnOnce() -> Result<T, InputError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| InputError::Walk {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
}

/// Best-effort absolute form of `path`, resolving symlinks for the parts
/// that exist
fn absolute(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => absolute(parent).join(name),
        _ => std::env::current_dir()
            .and_then(|d| d.canonicalize())
            .map_or_else(|_| path.to_path_buf(), |d| d.join(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn absolute_resolves_missing_leaf() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("not-yet/file.txt");
        let resolved = absolute(&missing);
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("not-yet/file.txt"));
        assert!(resolved.starts_with(tmp.path().canonicalize().unwrap()));
    }

    #[tokio::test]
    async fn store_inside_input_is_not_collected() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("out");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("a.csv"), b"1").unwrap();

        let config = NotaryConfig::new()
            .with_input_dir(&input)
            .with_store_dir(input.join("evidence"));
        let job = NotaryJob::new(config);

        let first = job.execute().await.unwrap();
        assert_eq!(first.run.artifacts, 1);
        assert_eq!(first.checksummed, 1);

        let second = job.execute().await.unwrap();
        assert!(second.run.is_unchanged());
    }

    #[tokio::test]
    async fn checksums_rewritten_on_unchanged_run() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("out");
        let data = tmp.path().join("data");
        fs::create_dir_all(&input).unwrap();
        fs::create_dir_all(&data).unwrap();
        fs::write(input.join("a.csv"), b"1").unwrap();
        fs::write(data.join("raw.txt"), b"r1").unwrap();

        let config = NotaryConfig::new()
            .with_input_dir(&input)
            .with_data_dir(&data)
            .with_store_dir(tmp.path().join("evidence"));
        let job = NotaryJob::new(config);
        job.execute().await.unwrap();

        fs::write(data.join("raw.txt"), b"r2").unwrap();
        let report = job.execute().await.unwrap();
        assert!(report.run.is_unchanged());

        let text = fs::read_to_string(&report.checksums_path).unwrap();
        assert!(text.contains(&notary_artifact::ContentDigest::compute(b"r2").to_hex()));
    }

    #[tokio::test]
    async fn checksums_list_hidden_files() {
        let tmp = tempfile::tempdir().unwrap();
        let data = tmp.path().join("data");
        fs::create_dir_all(data.join(".snapshots")).unwrap();
        fs::write(data.join("raw.csv"), b"1").unwrap();
        fs::write(data.join(".gitattributes"), b"* text").unwrap();
        fs::write(data.join(".snapshots/old.csv"), b"0").unwrap();

        let config = NotaryConfig::new()
            .with_input_dir(&data)
            .with_store_dir(tmp.path().join("evidence"));
        let report = NotaryJob::new(config).execute().await.unwrap();

        assert_eq!(report.run.artifacts, 1);
        assert_eq!(report.checksummed, 3);
        let text = fs::read_to_string(&report.checksums_path).unwrap();
        let names: Vec<&str> = text
            .lines()
            .filter_map(|line| line.split_once("  ").map(|(_, name)| name))
            .collect();
        assert_eq!(names, [".gitattributes", ".snapshots/old.csv", "raw.csv"]);
    }

    #[tokio::test]
    async fn missing_input_leaves_no_store_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let store = tmp.path().join("evidence");
        let config = NotaryConfig::new()
            .with_input_dir(tmp.path().join("absent"))
            .with_store_dir(&store);

        let err = NotaryJob::new(config).execute().await.unwrap_err();
        assert!(matches!(err, NotaryError::Input(_)));
        assert!(!store.exists());
    }
}
