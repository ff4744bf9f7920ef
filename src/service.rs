//! Catalog operations that touch thumbnails.
//!
//! The service owns the rule that a model holds exactly one artifact: a new
//! reference is recorded first, and only then is the previous artifact
//! deleted. Deleting a model releases its thumbnail and, for uploaded
//! models, the stored source.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};

use crate::catalog::{CatalogError, CatalogStore, ModelRecord};
use crate::pipeline::{ThumbnailOutcome, ThumbnailPipeline};
use crate::storage::{model_key, ObjectStore, StorageError};

/// Result of a [`ThumbnailService::dedupe`] run.
#[derive(Debug, Default)]
pub struct DedupeReport {
    /// Distinct `(name, source)` groups.
    pub kept: usize,
    /// Records removed, or that would be removed on a dry run.
    pub removed: Vec<ModelRecord>,
}

/// Ties the catalog to the thumbnail pipeline.
pub struct ThumbnailService {
    catalog: Arc<dyn CatalogStore>,
    pipeline: ThumbnailPipeline,
}

impl ThumbnailService {
    pub fn new(catalog: Arc<dyn CatalogStore>, pipeline: ThumbnailPipeline) -> Self {
        Self { catalog, pipeline }
    }

    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.catalog
    }

    pub fn pipeline(&self) -> &ThumbnailPipeline {
        &self.pipeline
    }

    /// Adds a model pointing at an existing source.
    ///
    /// # Errors
    /// Propagates catalog failures.
    pub async fn register_model(
        &self,
        name: &str,
        description: Option<String>,
        source: &str,
    ) -> Result<ModelRecord, CatalogError> {
        let mut record = ModelRecord::new(name, source);
        record.description = description;
        let record = self.catalog.insert_model(record).await?;
        info!("registered model {} ({})", record.name, record.id);
        Ok(record)
    }

    /// Stores `bytes` in the object store and adds a model for it.
    ///
    /// The source reference lives as long as the store does, so a persistent
    /// catalog never points at bytes that vanished with the process.
    ///
    /// # Errors
    /// [`CatalogError::Storage`] if the upload fails, or a catalog failure;
    /// the stored source is released again in that case.
    pub async fn upload_model(
        &self,
        name: &str,
        description: Option<String>,
        bytes: Vec<u8>,
    ) -> Result<ModelRecord, CatalogError> {
        let store = self.pipeline.store();
        let content_type = match name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
            Some(ext) if ext == "gltf" => "model/gltf+json",
            _ => "model/gltf-binary",
        };
        let source = store.upload(&model_key(name, Utc::now()), bytes, content_type).await?;
        debug!("stored source of {name} at {source}");
        match self.register_model(name, description, &source).await {
            Ok(record) => Ok(record),
            Err(e) => {
                self.release(&source).await;
                Err(e)
            }
        }
    }

    /// Generates a thumbnail for model `id` and records it.
    ///
    /// A previous artifact is deleted once the new reference is stored. When
    /// nothing could be uploaded the record is left as it was.
    ///
    /// # Errors
    /// [`CatalogError::NotFound`] for an unknown id, or a failure writing the
    /// new reference.
    pub async fn process(&self, id: &str) -> Result<ThumbnailOutcome, CatalogError> {
        let record = self
            .catalog
            .get_model(id)
            .await?
            .ok_or_else(|| CatalogError::model_not_found(id))?;
        let previous = record.thumbnail.clone();

        let outcome = self.pipeline.generate(&record).await;
        let Some(reference) = outcome.reference().cloned() else {
            warn!("model {id} keeps its current thumbnail");
            return Ok(outcome);
        };

        if let Err(e) = self.catalog.set_thumbnail(id, reference.clone()).await {
            // The new artifact would be orphaned
            self.release(reference.reference()).await;
            return Err(e);
        }

        if let Some(previous) = previous.filter(|p| p.reference() != reference.reference()) {
            debug!("superseding {} for model {id}", previous.reference());
            self.release(previous.reference()).await;
        }
        Ok(outcome)
    }

    /// Deletes model `id`, its thumbnail and its uploaded source.
    ///
    /// # Errors
    /// Propagates catalog failures.
    pub async fn delete_model(&self, id: &str) -> Result<Option<ModelRecord>, CatalogError> {
        let Some(record) = self.catalog.delete_model(id).await? else {
            return Ok(None);
        };
        if let Some(ref thumbnail) = record.thumbnail {
            self.release(thumbnail.reference()).await;
        }
        self.release(&record.source).await;
        info!("deleted model {} ({id})", record.name);
        Ok(Some(record))
    }

    /// Models that need a thumbnail, oldest first.
    ///
    /// Models without one always qualify; placeholders qualify when
    /// `include_placeholders` is set.
    ///
    /// # Errors
    /// Propagates catalog failures.
    pub async fn backfill_candidates(&self, include_placeholders: bool) -> Result<Vec<ModelRecord>, CatalogError> {
        let models = self.catalog.list_models().await?;
        Ok(models
            .into_iter()
            .filter(|m| match m.thumbnail {
                None => true,
                Some(ref t) => include_placeholders && t.is_placeholder(),
            })
            .collect())
    }

    /// Removes models sharing both name and source, keeping the oldest of
    /// each group.
    ///
    /// # Errors
    /// Propagates catalog failures.
    pub async fn dedupe(&self, dry_run: bool) -> Result<DedupeReport, CatalogError> {
        let models = self.catalog.list_models().await?;
        let mut seen: HashMap<(String, String), String> = HashMap::new();
        let mut report = DedupeReport::default();

        for model in models {
            let key = (model.name.clone(), model.source.clone());
            if let Some(kept) = seen.get(&key) {
                debug!("model {} duplicates {kept}", model.id);
                report.removed.push(model);
            } else {
                seen.insert(key, model.id);
            }
        }
        report.kept = seen.len();

        if !dry_run {
            for model in &report.removed {
                self.delete_duplicate(model).await?;
            }
        }
        Ok(report)
    }

    /// Like [`delete_model`](Self::delete_model) but keeps the source blob,
    /// which the surviving record still points at.
    async fn delete_duplicate(&self, model: &ModelRecord) -> Result<(), CatalogError> {
        if let Some(record) = self.catalog.delete_model(&model.id).await? {
            if let Some(ref thumbnail) = record.thumbnail {
                self.release(thumbnail.reference()).await;
            }
            info!("removed duplicate model {} ({})", record.name, record.id);
        }
        Ok(())
    }

    async fn release(&self, reference: &str) {
        let store = self.pipeline.store();
        if !store.owns(reference) {
            debug!("not deleting {reference}: not owned by the {} store", store.name());
            return;
        }
        match store.delete(reference).await {
            Ok(()) => debug!("deleted {reference}"),
            Err(StorageError::NotFound(_)) => debug!("{reference} was already gone"),
            Err(e) => warn!("failed to delete {reference}: {e}"),
        }
    }
}
