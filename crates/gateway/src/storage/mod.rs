pub mod local;
pub mod s3;
pub mod sigv4;

use crate::config::{StorageBackend, StorageSettings};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use local::LocalStore;
pub use s3::S3Store;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Object store answered {status} for {key}")]
    Status { status: u16, key: String },
}

/// Where an artifact ended up: a filesystem path or a public URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub key: String,
    pub location: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredArtifact, StorageError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    fn location(&self, key: &str) -> String;
}

/// Keys are relative, `/`-separated and never climb out of the store root.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if invalid {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

pub fn from_settings(settings: &StorageSettings) -> anyhow::Result<Arc<dyn ArtifactStore>> {
    match settings.backend {
        StorageBackend::Local => {
            tracing::info!(root = %settings.local_root.display(), "Using local artifact storage");
            Ok(Arc::new(LocalStore::new(settings.local_root.clone())))
        }
        StorageBackend::S3 => {
            let bucket = settings
                .bucket
                .clone()
                .ok_or_else(|| anyhow::anyhow!("storage.bucket is required for the s3 backend"))?;
            let store = S3Store::new(
                bucket,
                settings.region.clone(),
                settings.endpoint.as_deref(),
                sigv4::Credentials::from_env(),
            )?;
            tracing::info!(
                bucket = store.bucket(),
                region = %settings.region,
                "Using S3 artifact storage"
            );
            Ok(Arc::new(store))
        }
    }
}
