//! Storage configuration.

use std::path::PathBuf;

use tracing::warn;

/// Deployment mode, controls whether degraded storage is acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentMode {
    Production,
    #[default]
    Development,
}

impl DeploymentMode {
    /// Parse an `APP_ENV` style value.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => DeploymentMode::Production,
            _ => DeploymentMode::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, DeploymentMode::Production)
    }
}

/// Remote (S3) store settings.
#[derive(Clone)]
pub struct RemoteStorageConfig {
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// Custom endpoint for S3-compatible stores
    pub endpoint_url: Option<String>,
}

impl std::fmt::Debug for RemoteStorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStorageConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &"***")
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .field("endpoint_url", &self.endpoint_url)
            .finish()
    }
}

/// Storage configuration consumed by backend selection.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Present only when bucket and both keys are set
    pub remote: Option<RemoteStorageConfig>,
    /// Base directory of the local store
    pub local_path: PathBuf,
    pub mode: DeploymentMode,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            remote: None,
            local_path: PathBuf::from("./output"),
            mode: DeploymentMode::Development,
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bucket = get("AWS_S3_BUCKET");
        let access_key_id = get("AWS_ACCESS_KEY_ID");
        let secret_access_key = get("AWS_SECRET_ACCESS_KEY");

        let remote = match (bucket, access_key_id, secret_access_key) {
            (Some(bucket), Some(access_key_id), Some(secret_access_key)) => {
                Some(RemoteStorageConfig {
                    bucket,
                    region: get("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string()),
                    access_key_id,
                    secret_access_key,
                    session_token: get("AWS_SESSION_TOKEN"),
                    endpoint_url: get("AWS_ENDPOINT_URL"),
                })
            }
            (None, None, None) => None,
            _ => {
                warn!("Incomplete remote storage credentials, ignoring remote store settings");
                None
            }
        };

        Self {
            remote,
            local_path: get("STORAGE_LOCAL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./output")),
            mode: get("APP_ENV")
                .map(|v| DeploymentMode::parse(&v))
                .unwrap_or_default(),
        }
    }

    pub fn has_remote_credentials(&self) -> bool {
        self.remote.is_some()
    }
}
