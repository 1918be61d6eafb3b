//! Durable storage for produced export files.
//!
//! `put` returns an artifact reference the client can later hand back to
//! `get`. Keys are `<owner_id>/<job_id>.<ext>`; references are opaque to
//! callers.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

use gradelens_core::DomainError;

const MEMORY_SCHEME: &str = "memory://";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {0}")]
    NotFound(String),
    #[error("invalid artifact reference: {0}")]
    InvalidRef(String),
    #[error("artifact io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("artifact storage poisoned")]
    Poisoned,
}

impl From<ArtifactError> for DomainError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::NotFound(_) => DomainError::NotFound,
            other => DomainError::storage(other.to_string()),
        }
    }
}

/// Artifact storage abstraction.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    /// Store `bytes` under `key`, returning a dereferenceable reference.
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str)
    -> Result<String, ArtifactError>;

    async fn get(&self, artifact_ref: &str) -> Result<Vec<u8>, ArtifactError>;

    async fn delete(&self, artifact_ref: &str) -> Result<(), ArtifactError>;
}

/// In-memory artifact storage for tests/dev. References look like `memory://<key>`.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStorage {
    blobs: RwLock<HashMap<String, (String, Vec<u8>)>>,
}

impl InMemoryArtifactStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content type recorded for an artifact, if present.
    pub fn content_type(&self, artifact_ref: &str) -> Option<String> {
        let blobs = self.blobs.read().ok()?;
        blobs.get(artifact_ref).map(|(ct, _)| ct.clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStorage for InMemoryArtifactStorage {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ArtifactError> {
        let artifact_ref = format!("{MEMORY_SCHEME}{key}");
        let mut blobs = self.blobs.write().map_err(|_| ArtifactError::Poisoned)?;
        blobs.insert(artifact_ref.clone(), (content_type.to_string(), bytes));
        Ok(artifact_ref)
    }

    async fn get(&self, artifact_ref: &str) -> Result<Vec<u8>, ArtifactError> {
        let blobs = self.blobs.read().map_err(|_| ArtifactError::Poisoned)?;
        blobs
            .get(artifact_ref)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| ArtifactError::NotFound(artifact_ref.to_string()))
    }

    async fn delete(&self, artifact_ref: &str) -> Result<(), ArtifactError> {
        let mut blobs = self.blobs.write().map_err(|_| ArtifactError::Poisoned)?;
        blobs
            .remove(artifact_ref)
            .map(|_| ())
            .ok_or_else(|| ArtifactError::NotFound(artifact_ref.to_string()))
    }
}

/// Filesystem-backed artifact storage.
///
/// Files live under `root`; references are `<base_url>/<key>`, so serving
/// `root` at `base_url` makes every reference a resolvable URL.
#[derive(Debug, Clone)]
pub struct FsArtifactStorage {
    root: PathBuf,
    base_url: String,
}

impl FsArtifactStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for_key(&self, key: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(ArtifactError::InvalidRef(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn path_for_ref(&self, artifact_ref: &str) -> Result<PathBuf, ArtifactError> {
        let key = artifact_ref
            .strip_prefix(&self.base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ArtifactError::InvalidRef(artifact_ref.to_string()))?;
        self.path_for_key(key)
    }
}

#[async_trait]
impl ArtifactStorage for FsArtifactStorage {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, ArtifactError> {
        let path = self.path_for_key(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        Ok(format!("{}/{}", self.base_url, key))
    }

    async fn get(&self, artifact_ref: &str) -> Result<Vec<u8>, ArtifactError> {
        let path = self.path_for_ref(artifact_ref)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(artifact_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, artifact_ref: &str) -> Result<(), ArtifactError> {
        let path = self.path_for_ref(artifact_ref)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ArtifactError::NotFound(artifact_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_round_trip_and_delete() {
        let storage = InMemoryArtifactStorage::new();
        let r = storage.put("o/j.csv", b"a,b\n".to_vec(), "text/csv").await.unwrap();
        assert_eq!(r, "memory://o/j.csv");
        assert_eq!(storage.get(&r).await.unwrap(), b"a,b\n");
        assert_eq!(storage.content_type(&r).as_deref(), Some("text/csv"));

        storage.delete(&r).await.unwrap();
        assert!(matches!(storage.get(&r).await, Err(ArtifactError::NotFound(_))));
    }

    #[tokio::test]
    async fn fs_storage_writes_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsArtifactStorage::new(dir.path(), "https://files.example/exports/");

        let r = storage
            .put("owner/job.pdf", b"%PDF-1.4".to_vec(), "application/pdf")
            .await
            .unwrap();
        assert_eq!(r, "https://files.example/exports/owner/job.pdf");
        assert!(dir.path().join("owner/job.pdf").exists());
        assert_eq!(storage.get(&r).await.unwrap(), b"%PDF-1.4");

        storage.delete(&r).await.unwrap();
        assert!(matches!(storage.get(&r).await, Err(ArtifactError::NotFound(_))));
    }

    #[tokio::test]
    async fn fs_storage_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsArtifactStorage::new(dir.path(), "/artifacts");

        assert!(matches!(
            storage.put("../evil", vec![], "text/plain").await,
            Err(ArtifactError::InvalidRef(_))
        ));
        assert!(matches!(
            storage.get("https://elsewhere/x").await,
            Err(ArtifactError::InvalidRef(_))
        ));
    }
}
