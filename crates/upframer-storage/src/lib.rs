//! Object store capability.
//!
//! This crate provides:
//! - The `ObjectStore` trait used by the job pipeline
//! - A local filesystem store and an S3 store
//! - Zip archiving of frame directories
//! - Remote source reference parsing
//! - One-time backend selection with local fallback

pub mod archive;
pub mod config;
pub mod error;
pub mod local;
pub mod reference;
pub mod s3;
pub mod selection;
pub mod store;

pub use config::{DeploymentMode, RemoteStorageConfig, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;
pub use reference::RemoteReference;
pub use s3::S3Storage;
pub use selection::{build_object_store, build_object_store_with, select_backend, BackendPlan};
pub use store::{ObjectStore, StorageKind, StoredArchive};
