//! One-time object store selection.
//!
//! Runs once at startup. Remote storage is preferred whenever credentials
//! are configured; a failed remote initialization degrades to local storage
//! outside production and aborts startup in production.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{DeploymentMode, RemoteStorageConfig, StorageConfig};
use crate::error::{StorageError, StorageResult};
use crate::local::LocalStorage;
use crate::s3::S3Storage;
use crate::store::ObjectStore;

/// Which backend to build, decided before any client is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendPlan {
    /// Use the local store directly.
    Local,
    /// Use the remote store; on init failure fall back to local if allowed.
    Remote { fallback_to_local: bool },
}

/// Pure selection policy.
pub fn select_backend(
    credentials_present: bool,
    mode: DeploymentMode,
) -> StorageResult<BackendPlan> {
    match (credentials_present, mode) {
        (true, DeploymentMode::Production) => Ok(BackendPlan::Remote {
            fallback_to_local: false,
        }),
        (true, DeploymentMode::Development) => Ok(BackendPlan::Remote {
            fallback_to_local: true,
        }),
        (false, DeploymentMode::Production) => Err(StorageError::config_error(
            "remote storage credentials are required in production",
        )),
        (false, DeploymentMode::Development) => Ok(BackendPlan::Local),
    }
}

/// Build the process-wide object store.
pub async fn build_object_store(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    build_object_store_with(config, |remote| {
        let remote = remote.clone();
        async move {
            let storage = S3Storage::connect(&remote).await?;
            Ok(Arc::new(storage) as Arc<dyn ObjectStore>)
        }
    })
    .await
}

/// Build the object store with a custom remote initializer.
pub async fn build_object_store_with<F, Fut>(
    config: &StorageConfig,
    init_remote: F,
) -> StorageResult<Arc<dyn ObjectStore>>
where
    F: FnOnce(&RemoteStorageConfig) -> Fut,
    Fut: Future<Output = StorageResult<Arc<dyn ObjectStore>>>,
{
    let plan = select_backend(config.has_remote_credentials(), config.mode)?;

    let local = || -> Arc<dyn ObjectStore> {
        info!("Using local storage at {}", config.local_path.display());
        Arc::new(LocalStorage::new(config.local_path.clone()))
    };

    match (plan, config.remote.as_ref()) {
        (BackendPlan::Remote { fallback_to_local }, Some(remote)) => {
            match init_remote(remote).await {
                Ok(store) => {
                    info!("Using remote storage (bucket {})", remote.bucket);
                    Ok(store)
                }
                Err(e) if fallback_to_local => {
                    warn!("Remote storage unavailable, falling back to local storage: {}", e);
                    Ok(local())
                }
                Err(e) => Err(StorageError::RemoteInitFailed(e.to_string())),
            }
        }
        (BackendPlan::Remote { .. }, None) => Err(StorageError::config_error(
            "remote storage selected without remote configuration",
        )),
        (BackendPlan::Local, _) => Ok(local()),
    }
}
