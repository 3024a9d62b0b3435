//! Filesystem content store for stack and job files.

use async_trait::async_trait;
use domain::error::ContentError;
use domain::store::ContentStore;
use std::path::{Path, PathBuf};

/// Serves files below a root directory. Paths are relative and may not
/// escape the root.
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ContentError> {
        shared::validation::validate_relative_path(path)
            .map_err(|_| ContentError::NotFound(path.to_string()))?;
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        let full_path = self.resolve(path)?;
        tokio::fs::read(&full_path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ContentError::NotFound(path.to_string())
            } else {
                tracing::warn!(path = %full_path.display(), error = %e, "Failed to read content");
                ContentError::Io(e.to_string())
            }
        })
    }
}
