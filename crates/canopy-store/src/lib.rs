//! Storage abstraction for generated run artifacts: put an artifact, get a
//! stable relative link. The local-directory backend is the only one that
//! ships; the trait is the seam an object-store backend would slot into.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid artifact name '{0}'")]
    InvalidName(String),

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("I/O error for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// A stored artifact's name and its stable relative URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactLink {
    pub name: String,
    pub url: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persists one artifact under the run's unique subpath and returns its
    /// link. Run ids are the collision-avoidance mechanism: within a run,
    /// names are written once and never rewritten.
    async fn put_artifact(
        &self,
        run_id: &str,
        name: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<ArtifactLink, StoreError>;

    async fn get_artifact(&self, run_id: &str, name: &str) -> Result<Bytes, StoreError>;

    fn artifact_link(&self, run_id: &str, name: &str) -> ArtifactLink;
}

/// Artifact store rooted at a local outputs directory, one subdirectory per
/// run.
#[derive(Debug, Clone)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, run_id: &str, name: &str) -> Result<PathBuf, StoreError> {
        Ok(self
            .root
            .join(sanitize_path_part(run_id)?)
            .join(sanitize_path_part(name)?))
    }
}

/// Rejects anything that could escape the run directory. Artifact names and
/// run ids are single path components.
fn sanitize_path_part(part: &str) -> Result<&str, StoreError> {
    let invalid = part.is_empty()
        || part == "."
        || part == ".."
        || part.contains('/')
        || part.contains('\\')
        || part.contains('\0');
    if invalid {
        return Err(StoreError::InvalidName(part.to_string()));
    }
    Ok(part)
}

#[async_trait]
impl ArtifactStore for LocalDirStore {
    async fn put_artifact(
        &self,
        run_id: &str,
        name: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<ArtifactLink, StoreError> {
        let path = self.resolve(run_id, name)?;
        let key = format!("{run_id}/{name}");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    key: key.clone(),
                    source,
                })?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|source| StoreError::Io { key, source })?;

        Ok(self.artifact_link(run_id, name))
    }

    async fn get_artifact(&self, run_id: &str, name: &str) -> Result<Bytes, StoreError> {
        let path = self.resolve(run_id, name)?;
        let key = format!("{run_id}/{name}");

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key))
            }
            Err(source) => Err(StoreError::Io { key, source }),
        }
    }

    fn artifact_link(&self, run_id: &str, name: &str) -> ArtifactLink {
        ArtifactLink {
            name: name.to_string(),
            url: format!("/download/{run_id}/{name}"),
        }
    }
}
