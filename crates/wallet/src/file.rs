//! Durable, directory-backed credential store.
//!
//! Each identity lives in its own JSON document at `{dir}/{label}.id`.
//!
//! # Atomicity
//!
//! A record is first written in full to a temporary file inside the wallet
//! directory, flushed, and only then published under its final name with a
//! no-clobber link. Publishing fails with `AlreadyExists` if the label is
//! bound, which is reported as [`PutOutcome::AlreadyPresent`]. Readers
//! therefore never observe a partially written record, a crash mid-write
//! leaves at most an orphaned temporary file, and an existing record is
//! never replaced.
//!
//! On unix, records are created with mode `0600`.

use std::{
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use fail::fail_point;
use tempfile::NamedTempFile;

use crate::{
    error::{WalletError, WalletResult},
    identity::Identity,
    store::{CredentialStore, PutOutcome},
    types::Label,
};

/// File extension of identity records.
pub const RECORD_EXTENSION: &str = "id";

/// Credential store persisting one file per label in a directory.
///
/// # Example
///
/// ```no_run
/// use claimnet_wallet::{CredentialStore, FileCredentialStore, Label};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FileCredentialStore::open("./wallet").await?;
/// let admin = store.get(&Label::new("admin")?).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    dir: Arc<PathBuf>,
}

impl FileCredentialStore {
    /// Opens the wallet directory, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`WalletError::Io`] if the directory cannot be created or
    /// `dir` exists but is not a directory.
    #[tracing::instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub async fn open(dir: impl AsRef<Path>) -> WalletResult<Self> {
        let dir = dir.as_ref().to_path_buf();

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| WalletError::io(format!("failed to create {}", dir.display()), e))?;

        let metadata = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| WalletError::io(format!("failed to stat {}", dir.display()), e))?;
        if !metadata.is_dir() {
            return Err(WalletError::io(
                format!("{} is not a directory", dir.display()),
                std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
            ));
        }

        tracing::debug!("opened file credential store");
        Ok(Self { dir: Arc::new(dir) })
    }

    /// Returns the wallet directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the record path for a label.
    #[must_use]
    pub fn record_path(&self, label: &Label) -> PathBuf {
        self.dir.join(format!("{label}.{RECORD_EXTENSION}"))
    }
}

/// Writes `bytes` to a temp file in `dir` and links it to `target` unless
/// `target` exists.
fn publish_no_clobber(dir: &Path, target: &Path, bytes: &[u8]) -> WalletResult<PutOutcome> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".pending-")
        .tempfile_in(dir)
        .map_err(|e| WalletError::io("failed to create temporary record", e))?;

    restrict_permissions(&tmp)?;

    tmp.write_all(bytes).map_err(|e| WalletError::io("failed to write temporary record", e))?;
    tmp.as_file().sync_all().map_err(|e| WalletError::io("failed to sync temporary record", e))?;

    fail_point!("wallet-before-publish", |_| {
        Err(WalletError::internal("injected failure before publishing record"))
    });

    match tmp.persist_noclobber(target) {
        Ok(_) => Ok(PutOutcome::Inserted),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
            // Dropping the returned temp file removes it.
            drop(e.file);
            Ok(PutOutcome::AlreadyPresent)
        },
        Err(e) => Err(WalletError::io(format!("failed to publish {}", target.display()), e.error)),
    }
}

#[cfg(unix)]
fn restrict_permissions(tmp: &NamedTempFile) -> WalletResult<()> {
    use std::os::unix::fs::PermissionsExt;

    tmp.as_file()
        .set_permissions(std::fs::Permissions::from_mode(0o600))
        .map_err(|e| WalletError::io("failed to restrict record permissions", e))
}

#[cfg(not(unix))]
fn restrict_permissions(_tmp: &NamedTempFile) -> WalletResult<()> {
    Ok(())
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    #[tracing::instrument(skip(self), fields(label = %label))]
    async fn get(&self, label: &Label) -> WalletResult<Option<Identity>> {
        let path = self.record_path(label);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => zeroize::Zeroizing::new(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(WalletError::io(format!("failed to read {}", path.display()), e));
            },
        };

        Identity::from_record_bytes(label.clone(), &bytes).map(Some)
    }

    #[tracing::instrument(skip(self, identity), fields(label = %identity.label))]
    async fn put_if_absent(&self, identity: Identity) -> WalletResult<PutOutcome> {
        let target = self.record_path(&identity.label);

        // Cheap pre-check; the authoritative check is the no-clobber publish.
        if tokio::fs::try_exists(&target).await.unwrap_or(false) {
            tracing::debug!("label already bound, leaving existing record in place");
            return Ok(PutOutcome::AlreadyPresent);
        }

        let bytes = identity.to_record_bytes()?;
        let dir = Arc::clone(&self.dir);

        let outcome = tokio::task::spawn_blocking(move || publish_no_clobber(&dir, &target, &bytes))
            .await
            .map_err(|e| WalletError::internal_with_source("record writer task failed", e))??;

        match outcome {
            PutOutcome::Inserted => tracing::info!("identity record written"),
            PutOutcome::AlreadyPresent => {
                tracing::debug!("lost publish race, leaving existing record in place");
            },
        }

        Ok(outcome)
    }

    async fn labels(&self) -> WalletResult<Vec<Label>> {
        let mut entries = tokio::fs::read_dir(self.dir.as_path())
            .await
            .map_err(|e| WalletError::io(format!("failed to list {}", self.dir.display()), e))?;

        let mut labels = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WalletError::io(format!("failed to list {}", self.dir.display()), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            match Label::new(stem) {
                Ok(label) => labels.push(label),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping record"),
            }
        }

        labels.sort();
        Ok(labels)
    }
}
