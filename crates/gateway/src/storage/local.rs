use super::{ArtifactStore, StorageError, StoredArtifact, validate_key};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Artifacts as plain files below `root`.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredArtifact, StorageError> {
        validate_key(key)?;
        let path = self.path_for(key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &data).await?;

        tracing::debug!(key, bytes = data.len(), "Artifact written");

        Ok(StoredArtifact {
            key: key.to_string(),
            location: path.display().to_string(),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        match tokio::fs::read(self.path_for(key)).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn location(&self, key: &str) -> String {
        self.path_for(key).display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_creates_directories_and_get_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let stored = store
            .put("uploads/road.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();

        assert_eq!(stored.key, "uploads/road.png");
        assert_eq!(stored.location, store.location("uploads/road.png"));
        assert!(dir.path().join("uploads/road.png").is_file());
        assert_eq!(store.get("uploads/road.png").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_missing_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let err = store.get("results/result_missing.png").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path().join("root"));

        let err = store
            .put("../outside.png", vec![0], "image/png")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::InvalidKey(_)));
        assert!(!dir.path().join("outside.png").exists());
    }
}
