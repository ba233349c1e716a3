//! Remote source reference parsing.
//!
//! A job's `videoUrl` is either a plain local path or a reference to an
//! object in the remote store. Two remote shapes are recognised:
//! - `https://<bucket>.s3.<region>.amazonaws.com/<key>` (virtual-hosted URL)
//! - `s3://<bucket>/<key>`

use url::Url;

use crate::error::{StorageError, StorageResult};

/// A parsed remote object reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReference {
    pub bucket: String,
    pub key: String,
}

impl RemoteReference {
    /// Classify a source string.
    ///
    /// `Ok(None)` means the source is a local path. A string that looks like
    /// a remote reference but cannot be resolved to a bucket and key is an
    /// `InvalidReference` error.
    pub fn parse(source: &str) -> StorageResult<Option<Self>> {
        if source.starts_with("s3://") {
            return Self::parse_s3_uri(source).map(Some);
        }
        if source.starts_with("https://") && source.contains(".s3.") {
            return Self::parse_virtual_hosted(source).map(Some);
        }
        Ok(None)
    }

    fn parse_s3_uri(source: &str) -> StorageResult<Self> {
        let url = Url::parse(source)
            .map_err(|e| StorageError::invalid_reference(format!("{}: {}", source, e)))?;
        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| {
                StorageError::invalid_reference(format!("missing bucket in {}", source))
            })?;

        Ok(Self {
            bucket: bucket.to_string(),
            key: decode_key(source, url.path())?,
        })
    }

    fn parse_virtual_hosted(source: &str) -> StorageResult<Self> {
        let url = Url::parse(source)
            .map_err(|e| StorageError::invalid_reference(format!("{}: {}", source, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| StorageError::invalid_reference(format!("missing host in {}", source)))?;

        let bucket = match host.split_once(".s3.") {
            Some((bucket, _)) if !bucket.is_empty() => bucket,
            _ => {
                return Err(StorageError::invalid_reference(format!(
                    "no bucket in host of {}",
                    source
                )))
            }
        };

        Ok(Self {
            bucket: bucket.to_string(),
            key: decode_key(source, url.path())?,
        })
    }

    /// File name of the object, used for logging.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

fn decode_key(source: &str, path: &str) -> StorageResult<String> {
    let key = path.trim_start_matches('/');
    if key.is_empty() {
        return Err(StorageError::invalid_reference(format!("missing object key in {}", source)));
    }
    urlencoding::decode(key)
        .map(|k| k.into_owned())
        .map_err(|e| StorageError::invalid_reference(format!("{}: {}", source, e)))
}
