//! Catalog persisted as a single JSON document.
//!
//! Every mutation rewrites the whole file through a temporary sibling and a
//! rename, so a crash mid-write leaves the previous version intact.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::Mutex;

use super::{CatalogData, CatalogError, CatalogStore, MaterialRecord, ModelRecord, ThumbnailRef};

/// File-backed catalog.
#[derive(Debug)]
pub struct JsonCatalog {
    path: PathBuf,
    data: Mutex<CatalogData>,
}

impl JsonCatalog {
    /// Opens the catalog at `path`. A missing file is an empty catalog; it
    /// is created on the first write.
    ///
    /// # Errors
    /// Fails if the file exists but cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => CatalogData::default(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("catalog {} does not exist yet, starting empty", path.display());
                CatalogData::default()
            }
            Err(e) => return Err(e.into()),
        };
        debug!(
            "opened catalog {} ({} models, {} materials)",
            path.display(),
            data.models.len(),
            data.materials.len()
        );
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &CatalogData) -> Result<(), CatalogError> {
        let bytes = serde_json::to_vec_pretty(data)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Applies `change` and writes the result; the in-memory copy is only
    /// replaced once the write succeeded.
    async fn mutate<T>(
        &self,
        change: impl FnOnce(&mut CatalogData) -> Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        let mut guard = self.data.lock().await;
        let mut next = guard.clone();
        let out = change(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }
}

#[async_trait]
impl CatalogStore for JsonCatalog {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn list_models(&self) -> Result<Vec<ModelRecord>, CatalogError> {
        Ok(self.data.lock().await.sorted_models())
    }

    async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>, CatalogError> {
        Ok(self.data.lock().await.model(id).cloned())
    }

    async fn insert_model(&self, record: ModelRecord) -> Result<ModelRecord, CatalogError> {
        self.mutate(|data| data.insert_model(record)).await
    }

    async fn set_thumbnail(&self, id: &str, thumbnail: ThumbnailRef) -> Result<ModelRecord, CatalogError> {
        self.mutate(|data| data.set_thumbnail(id, thumbnail)).await
    }

    async fn delete_model(&self, id: &str) -> Result<Option<ModelRecord>, CatalogError> {
        if self.data.lock().await.model(id).is_none() {
            return Ok(None);
        }
        self.mutate(|data| Ok(data.delete_model(id))).await
    }

    async fn list_materials(&self) -> Result<Vec<MaterialRecord>, CatalogError> {
        Ok(self.data.lock().await.sorted_materials())
    }

    async fn get_material(&self, id: &str) -> Result<Option<MaterialRecord>, CatalogError> {
        Ok(self.data.lock().await.material(id).cloned())
    }

    async fn insert_material(&self, record: MaterialRecord) -> Result<MaterialRecord, CatalogError> {
        self.mutate(|data| data.insert_material(record)).await
    }

    async fn update_material(&self, record: MaterialRecord) -> Result<MaterialRecord, CatalogError> {
        self.mutate(|data| data.update_material(record)).await
    }

    async fn delete_material(&self, id: &str) -> Result<Option<MaterialRecord>, CatalogError> {
        if self.data.lock().await.material(id).is_none() {
            return Ok(None);
        }
        self.mutate(|data| Ok(data.delete_material(id))).await
    }
}
