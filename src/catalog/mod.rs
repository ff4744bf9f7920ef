//! The model and material catalog.
//!
//! Models carry the thumbnail reference the pipeline maintains; materials are
//! PBR presets the viewer can apply. Backends implement [`CatalogStore`]:
//!
//! - [`MemoryCatalog`] for tests and one-shot runs.
//! - [`JsonCatalog`] persisting to a single JSON document.
//! - [`RestCatalog`] talking to a hosted table API.

pub mod json;
pub mod memory;
pub mod presets;
pub mod records;
pub mod rest;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use json::JsonCatalog;
pub use memory::MemoryCatalog;
pub use presets::{find_preset, presets};
pub use records::{MaterialRecord, ModelRecord, ParseColorError, Rgb, ThumbnailRef, ThumbnailState};
pub use rest::RestCatalog;

/// Errors raised by catalog backends.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} {id} already exists")]
    Duplicate { kind: &'static str, id: String },
    #[error("invalid material: {0}")]
    InvalidMaterial(String),
    #[error("catalog IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed catalog document: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid catalog endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("cannot store model source: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

impl CatalogError {
    pub(crate) fn model_not_found(id: &str) -> Self {
        CatalogError::NotFound {
            kind: "model",
            id: id.to_string(),
        }
    }

    pub(crate) fn material_not_found(id: &str) -> Self {
        CatalogError::NotFound {
            kind: "material",
            id: id.to_string(),
        }
    }
}

/// Persistence for models and materials.
///
/// Listings come back oldest first.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn list_models(&self) -> Result<Vec<ModelRecord>, CatalogError>;

    async fn get_model(&self, id: &str) -> Result<Option<ModelRecord>, CatalogError>;

    /// Adds a new model. Fails with [`CatalogError::Duplicate`] on an id clash.
    async fn insert_model(&self, record: ModelRecord) -> Result<ModelRecord, CatalogError>;

    /// Points the model's thumbnail at `thumbnail` and returns the updated
    /// record.
    async fn set_thumbnail(&self, id: &str, thumbnail: ThumbnailRef) -> Result<ModelRecord, CatalogError>;

    /// Removes a model, returning it if it existed.
    async fn delete_model(&self, id: &str) -> Result<Option<ModelRecord>, CatalogError>;

    async fn list_materials(&self) -> Result<Vec<MaterialRecord>, CatalogError>;

    async fn get_material(&self, id: &str) -> Result<Option<MaterialRecord>, CatalogError>;

    /// Adds a validated material.
    async fn insert_material(&self, record: MaterialRecord) -> Result<MaterialRecord, CatalogError>;

    /// Replaces an existing material after validation.
    async fn update_material(&self, record: MaterialRecord) -> Result<MaterialRecord, CatalogError>;

    async fn delete_material(&self, id: &str) -> Result<Option<MaterialRecord>, CatalogError>;
}

/// The whole catalog as one serializable document.
///
/// Shared by the in-memory and JSON backends so both apply identical rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogData {
    #[serde(default)]
    pub models: Vec<ModelRecord>,
    #[serde(default)]
    pub materials: Vec<MaterialRecord>,
}

impl CatalogData {
    pub fn model(&self, id: &str) -> Option<&ModelRecord> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn material(&self, id: &str) -> Option<&MaterialRecord> {
        self.materials.iter().find(|m| m.id == id)
    }

    pub fn insert_model(&mut self, record: ModelRecord) -> Result<ModelRecord, CatalogError> {
        if self.model(&record.id).is_some() {
            return Err(CatalogError::Duplicate {
                kind: "model",
                id: record.id,
            });
        }
        self.models.push(record.clone());
        Ok(record)
    }

    pub fn set_thumbnail(&mut self, id: &str, thumbnail: ThumbnailRef) -> Result<ModelRecord, CatalogError> {
        let model = self
            .models
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| CatalogError::model_not_found(id))?;
        model.thumbnail = Some(thumbnail);
        model.updated_at = Utc::now();
        Ok(model.clone())
    }

    pub fn delete_model(&mut self, id: &str) -> Option<ModelRecord> {
        let index = self.models.iter().position(|m| m.id == id)?;
        Some(self.models.remove(index))
    }

    pub fn insert_material(&mut self, record: MaterialRecord) -> Result<MaterialRecord, CatalogError> {
        record.validate()?;
        if self.material(&record.id).is_some() {
            return Err(CatalogError::Duplicate {
                kind: "material",
                id: record.id,
            });
        }
        self.materials.push(record.clone());
        Ok(record)
    }

    pub fn update_material(&mut self, mut record: MaterialRecord) -> Result<MaterialRecord, CatalogError> {
        record.validate()?;
        let slot = self
            .materials
            .iter_mut()
            .find(|m| m.id == record.id)
            .ok_or_else(|| CatalogError::material_not_found(&record.id))?;
        record.created_at = slot.created_at;
        record.updated_at = Utc::now();
        *slot = record.clone();
        Ok(record)
    }

    pub fn delete_material(&mut self, id: &str) -> Option<MaterialRecord> {
        let index = self.materials.iter().position(|m| m.id == id)?;
        Some(self.materials.remove(index))
    }

    pub(crate) fn sorted_models(&self) -> Vec<ModelRecord> {
        let mut models = self.models.clone();
        models.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        models
    }

    pub(crate) fn sorted_materials(&self) -> Vec<MaterialRecord> {
        let mut materials = self.materials.clone();
        materials.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        materials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_thumbnail_bumps_updated_at() {
        let mut data = CatalogData::default();
        let model = data.insert_model(ModelRecord::new("duck", "blob:memory/models/duck")).unwrap();
        let updated = data
            .set_thumbnail(&model.id, ThumbnailRef::Image("blob:memory/thumbnails/a.png".into()))
            .unwrap();
        assert!(updated.updated_at >= model.updated_at);
        assert_eq!(data.model(&model.id).unwrap().thumbnail, updated.thumbnail);
    }

    #[test]
    fn test_set_thumbnail_unknown_model() {
        let mut data = CatalogData::default();
        let result = data.set_thumbnail("missing", ThumbnailRef::Image("x".into()));
        assert!(matches!(result, Err(CatalogError::NotFound { kind: "model", .. })));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut data = CatalogData::default();
        let model = ModelRecord::new("a", "s");
        data.insert_model(model.clone()).unwrap();
        assert!(matches!(data.insert_model(model), Err(CatalogError::Duplicate { .. })));
    }

    #[test]
    fn test_update_material_keeps_created_at() {
        let mut data = CatalogData::default();
        let original = data
            .insert_material(MaterialRecord::new("steel", Rgb([180, 180, 190]), 0.3, 1.0).unwrap())
            .unwrap();
        let mut edited = original.clone();
        edited.roughness = 0.6;
        edited.created_at = Utc::now();
        let saved = data.update_material(edited).unwrap();
        assert_eq!(saved.created_at, original.created_at);
        assert_eq!(data.material(&original.id).unwrap().roughness, 0.6);

        let mut invalid = saved.clone();
        invalid.metallic = 2.0;
        assert!(matches!(data.update_material(invalid), Err(CatalogError::InvalidMaterial(_))));
    }
}
