//! Local filesystem store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::archive::create_zip_file;
use crate::error::{StorageError, StorageResult};
use crate::reference::RemoteReference;
use crate::store::{ObjectStore, StorageKind, StoredArchive};

/// Stores archives under a base directory and reports `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    async fn ensure_base(&self) -> StorageResult<PathBuf> {
        tokio::fs::create_dir_all(&self.base_path).await.map_err(|e| {
            StorageError::upload_failed(format!(
                "error creating base directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;
        Ok(tokio::fs::canonicalize(&self.base_path).await?)
    }

    fn stored(dest: PathBuf) -> StorageResult<StoredArchive> {
        let url = Url::from_file_path(&dest)
            .map_err(|_| {
                StorageError::upload_failed(format!("non-absolute path {}", dest.display()))
            })?;
        Ok(StoredArchive {
            path: dest.to_string_lossy().to_string(),
            url: url.to_string(),
        })
    }
}

/// Reject names that would escape the base directory.
fn validate_name(name: &str) -> StorageResult<()> {
    let path = Path::new(name);
    if name.is_empty() || path.components().count() != 1 || name == "." || name == ".." {
        return Err(StorageError::invalid_reference(format!("invalid object name: {}", name)));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Local
    }

    async fn store_archive(
        &self,
        source_dir: &Path,
        archive_name: &str,
    ) -> StorageResult<StoredArchive> {
        validate_name(archive_name)?;
        let base = self.ensure_base().await?;
        let dest = base.join(archive_name);
        let source_dir = source_dir.to_path_buf();

        // Build next to the destination and rename, so readers never see a partial zip
        let stored_path = dest.clone();
        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            if !source_dir.is_dir() {
                return Err(StorageError::archive_failed(format!(
                    "{} is not a directory",
                    source_dir.display()
                )));
            }
            let partial = tempfile::Builder::new()
                .prefix(".partial-")
                .suffix(".zip")
                .tempfile_in(&base)?;
            create_zip_file(&source_dir, partial.path())?;
            partial
                .persist(&stored_path)
                .map_err(|e| StorageError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::archive_failed(format!("archive task panicked: {}", e)))??;

        info!("Stored archive {}", dest.display());
        Self::stored(dest)
    }

    async fn store_file(&self, file: &Path, name: &str) -> StorageResult<StoredArchive> {
        validate_name(name)?;
        let base = self.ensure_base().await?;
        let dest = base.join(name);

        debug!("Copying {} to {}", file.display(), dest.display());
        tokio::fs::copy(file, &dest).await.map_err(|e| {
            StorageError::upload_failed(format!("error copying {}: {}", file.display(), e))
        })?;

        Self::stored(dest)
    }

    async fn fetch(&self, reference: &RemoteReference, _destination: &Path) -> StorageResult<()> {
        Err(StorageError::Unsupported(format!(
            "local storage cannot fetch s3://{}/{}",
            reference.bucket, reference.key
        )))
    }
}
