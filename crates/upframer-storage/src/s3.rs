//! S3 store implementation.

use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::archive::archive_directory;
use crate::config::RemoteStorageConfig;
use crate::error::{StorageError, StorageResult};
use crate::reference::RemoteReference;
use crate::store::{ObjectStore, StorageKind, StoredArchive};

/// Key prefix for uploaded results.
pub const RESULTS_PREFIX: &str = "results";

/// S3 (or S3-compatible) object store.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3Storage {
    /// Create a client from configuration. Performs no network calls.
    pub fn new(config: &RemoteStorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            config.session_token.clone(),
            None,
            "upframer-env",
        );

        let mut builder = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint_url: config.endpoint_url.clone(),
        }
    }

    /// Create a client and verify the bucket is reachable.
    pub async fn connect(config: &RemoteStorageConfig) -> StorageResult<Self> {
        let storage = Self::new(config);
        storage
            .check_connectivity()
            .await
            .map_err(|e| StorageError::RemoteInitFailed(e.to_string()))?;
        info!("Connected to S3 bucket {}", storage.bucket);
        Ok(storage)
    }

    /// Check connectivity by performing a head bucket operation.
    pub async fn check_connectivity(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| StorageError::AwsSdk(format!("S3 connectivity check failed: {}", e)))?;
        Ok(())
    }

    /// Key under which an archive is stored.
    pub fn result_key(name: &str) -> String {
        format!("{}/{}", RESULTS_PREFIX, name)
    }

    /// Public URL of an object in this store.
    pub fn object_url(&self, key: &str) -> String {
        match &self.endpoint_url {
            Some(endpoint) => format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.bucket, key),
            None => format!("https://{}.s3.{}.amazonaws.com/{}", self.bucket, self.region, key),
        }
    }

    /// Upload a file to S3.
    pub async fn upload_file(
        &self,
        path: &Path,
        key: &str,
        content_type: &str,
    ) -> StorageResult<()> {
        debug!("Uploading {} to {}", path.display(), key);

        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::upload_failed(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::TimeoutError(_) => StorageError::Timeout(e.to_string()),
                SdkError::DispatchFailure(d) if d.is_timeout() => {
                    StorageError::Timeout(e.to_string())
                }
                _ => StorageError::upload_failed(e.to_string()),
            })?;

        info!("Uploaded {} to {}", path.display(), key);
        Ok(())
    }

    /// Download an object to a file, streaming the body.
    pub async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<()> {
        debug!("Downloading s3://{}/{} to {}", bucket, key, path.display());

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| match &e {
                SdkError::TimeoutError(_) => StorageError::Timeout(e.to_string()),
                SdkError::DispatchFailure(d) if d.is_timeout() => {
                    StorageError::Timeout(e.to_string())
                }
                _ if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                    StorageError::not_found(format!("s3://{}/{}", bucket, key))
                }
                _ => StorageError::download_failed(e.to_string()),
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::download_failed(format!("Failed to create directory: {}", e))
            })?;
        }

        let mut file = tokio::fs::File::create(path)
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to create file: {}", e)))?;
        let mut body = response.body.into_async_read();
        tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| StorageError::download_failed(format!("Failed to write file: {}", e)))?;
        file.flush().await?;

        info!("Downloaded s3://{}/{} to {}", bucket, key, path.display());
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    fn kind(&self) -> StorageKind {
        StorageKind::Remote
    }

    async fn store_archive(
        &self,
        source_dir: &Path,
        archive_name: &str,
    ) -> StorageResult<StoredArchive> {
        // tempfile creates the directory owner-only (0700)
        let staging = tempfile::Builder::new().prefix("upframer-secure-").tempdir()?;
        let zip_path = staging.path().join(archive_name);

        archive_directory(source_dir, &zip_path).await?;

        let key = Self::result_key(archive_name);
        self.upload_file(&zip_path, &key, "application/zip").await?;

        Ok(StoredArchive {
            url: self.object_url(&key),
            path: key,
        })
    }

    async fn store_file(&self, file: &Path, name: &str) -> StorageResult<StoredArchive> {
        let key = Self::result_key(name);
        self.upload_file(file, &key, "application/octet-stream").await?;

        Ok(StoredArchive {
            url: self.object_url(&key),
            path: key,
        })
    }

    async fn fetch(&self, reference: &RemoteReference, destination: &Path) -> StorageResult<()> {
        // Only the configured bucket is readable with our credentials
        if reference.bucket != self.bucket {
            return Err(StorageError::invalid_reference(format!(
                "bucket {} is not the configured bucket {}",
                reference.bucket, self.bucket
            )));
        }
        self.download_file(&self.bucket, &reference.key, destination).await
    }
}
