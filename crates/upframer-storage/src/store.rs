//! The object store capability.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::reference::RemoteReference;

/// Which backend a store talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Local,
    Remote,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Local => "local",
            StorageKind::Remote => "remote",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a stored object ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArchive {
    /// Backend-specific location (filesystem path or object key)
    pub path: String,
    /// Durable external reference surfaced to result consumers
    pub url: String,
}

/// Archives directories into single objects and fetches remote sources.
///
/// Implementations are shared across jobs for the life of the process.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn kind(&self) -> StorageKind;

    /// Zip every file under `source_dir` and store it as `archive_name`.
    async fn store_archive(
        &self,
        source_dir: &Path,
        archive_name: &str,
    ) -> StorageResult<StoredArchive>;

    /// Store a single file as `name`.
    async fn store_file(&self, file: &Path, name: &str) -> StorageResult<StoredArchive>;

    /// Download a remote object to `destination`.
    async fn fetch(&self, reference: &RemoteReference, destination: &Path) -> StorageResult<()>;
}
