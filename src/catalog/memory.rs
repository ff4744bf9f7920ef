//! In-process catalog.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{CatalogData, CatalogError, CatalogStore, MaterialRecord, ModelRecord, ThumbnailRef};

/// A catalog held entirely in memory.
///
/// # Examples
/// ```
/// use huitong_thumbs::catalog::{CatalogStore, MemoryCatalog, ModelRecord};
///
/// # let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// # rt.block_on(async {
/// let catalog = MemoryCatalog::new();
/// let model = catalog.insert_model(ModelRecord::new("duck", "duck.glb")).await.unwrap();
/// assert!(catalog.get_model(&model.id).await.unwrap().is_some());
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    data: RwLock<CatalogData>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing document.
    pub fn with_data(data: CatalogData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// A copy of the current contents.
    pub fn snapshot(&self) -> CatalogData {
        self.data.read().clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_models(&self) -> Result<Vec<ModelRecord>, CatalogError> {
        Ok(self.data.read().sorted_models())
    }

    async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>, CatalogError> {
        Ok(self.data.read().model(id).cloned())
    }

    async fn insert_model(&self, record: ModelRecord) -> Result<ModelRecord, CatalogError> {
        self.data.write().insert_model(record)
    }

    async fn set_thumbnail(&self, id: &str, thumbnail: ThumbnailRef) -> Result<ModelRecord, CatalogError> {
        self.data.write().set_thumbnail(id, thumbnail)
    }

    async fn delete_model(&self, id: &str) -> Result<Option<ModelRecord>, CatalogError> {
        Ok(self.data.write().delete_model(id))
    }

    async fn list_materials(&self) -> Result<Vec<MaterialRecord>, CatalogError> {
        Ok(self.data.read().sorted_materials())
    }

    async fn get_material(&self, id: &str) -> Result<Option<MaterialRecord>, CatalogError> {
        Ok(self.data.read().material(id).cloned())
    }

    async fn insert_material(&self, record: MaterialRecord) -> Result<MaterialRecord, CatalogError> {
        self.data.write().insert_material(record)
    }

    async fn update_material(&self, record: MaterialRecord) -> Result<MaterialRecord, CatalogError> {
        self.data.write().update_material(record)
    }

    async fn delete_material(&self, id: &str) -> Result<Option<MaterialRecord>, CatalogError> {
        Ok(self.data.write().delete_material(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Rgb;

    #[tokio::test]
    async fn test_models_listed_oldest_first() {
        let catalog = MemoryCatalog::new();
        let mut older = ModelRecord::new("older", "a.glb");
        older.created_at -= chrono::Duration::seconds(60);
        let newer = ModelRecord::new("newer", "b.glb");
        catalog.insert_model(newer).await.unwrap();
        catalog.insert_model(older).await.unwrap();

        let names: Vec<_> = catalog
            .list_models()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, ["older", "newer"]);
    }

    #[tokio::test]
    async fn test_material_crud() {
        let catalog = MemoryCatalog::new();
        let material = MaterialRecord::new("clay", Rgb([170, 110, 80]), 0.8, 0.0).unwrap();
        let id = catalog.insert_material(material).await.unwrap().id;

        let mut edited = catalog.get_material(&id).await.unwrap().unwrap();
        edited.name = "terracotta".into();
        catalog.update_material(edited).await.unwrap();
        assert_eq!(catalog.get_material(&id).await.unwrap().unwrap().name, "terracotta");

        assert!(catalog.delete_material(&id).await.unwrap().is_some());
        assert!(catalog.list_materials().await.unwrap().is_empty());
    }
}
