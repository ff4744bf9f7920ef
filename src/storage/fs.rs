//! Directory-backed object store.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use log::debug;

use super::{ObjectStore, StorageError};

const FILE_SCHEME: &str = "file://";

/// Stores objects as files under a root directory.
///
/// References are absolute `file://` URLs so a local viewer can load them
/// directly.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Creates a store rooted at `root`; relative roots resolve against the
    /// current directory. The directory is created on first upload.
    ///
    /// # Errors
    /// Fails if the current directory cannot be determined.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()?.join(root)
        };
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for_key(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(StorageError::ForeignReference(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn path_for_reference(&self, reference: &str) -> Result<PathBuf, StorageError> {
        let path = reference
            .strip_prefix(FILE_SCHEME)
            .map(PathBuf::from)
            .filter(|p| p.starts_with(&self.root))
            .ok_or_else(|| StorageError::ForeignReference(reference.to_string()))?;
        let escapes = path
            .strip_prefix(&self.root)
            .map(|rest| rest.components().any(|c| !matches!(c, Component::Normal(_))))
            .unwrap_or(true);
        if escapes {
            return Err(StorageError::ForeignReference(reference.to_string()));
        }
        Ok(path)
    }
}

fn map_not_found(err: std::io::Error, reference: &str) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(reference.to_string())
    } else {
        StorageError::Io(err)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String, StorageError> {
        let path = self.path_for_key(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!("wrote {}", path.display());
        Ok(format!("{FILE_SCHEME}{}", path.display()))
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for_reference(reference)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| map_not_found(e, reference))
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        let path = self.path_for_reference(reference)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| map_not_found(e, reference))
    }

    fn owns(&self, reference: &str) -> bool {
        self.path_for_reference(reference).is_ok()
    }
}
