//! The thumbnail pipeline: load, frame, rasterize, upload.
//!
//! [`ThumbnailPipeline::generate`] never fails. Load, timeout and render
//! failures are replaced by a placeholder that goes through the same upload
//! path; an upload failure yields [`ThumbnailOutcome::Unavailable`] so the
//! caller leaves the model's existing reference alone.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::catalog::{ModelRecord, ThumbnailRef};
use crate::config::PipelineSettings;
use crate::error::{Stage, ThumbnailError};
use crate::fallback;
use crate::loader::{AssetLoader, ModelSource};
use crate::renderer::{self, RenderError, RenderOptions};
use crate::storage::{thumbnail_key, ObjectStore, PNG_CONTENT_TYPE};

/// An uploaded thumbnail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub reference: ThumbnailRef,
    /// The encoded PNG that was uploaded.
    pub png: Vec<u8>,
}

/// Result of one generation run.
#[derive(Debug)]
pub enum ThumbnailOutcome {
    /// The model rendered and the image was stored.
    Rendered(Thumbnail),
    /// Rendering failed; a placeholder was stored instead.
    Placeholder {
        thumbnail: Thumbnail,
        cause: ThumbnailError,
    },
    /// Nothing could be stored.
    Unavailable { cause: ThumbnailError },
}

impl ThumbnailOutcome {
    /// The reference to record against the model, if any.
    pub fn reference(&self) -> Option<&ThumbnailRef> {
        match self {
            ThumbnailOutcome::Rendered(thumbnail) | ThumbnailOutcome::Placeholder { thumbnail, .. } => {
                Some(&thumbnail.reference)
            }
            ThumbnailOutcome::Unavailable { .. } => None,
        }
    }

    pub fn thumbnail(&self) -> Option<&Thumbnail> {
        match self {
            ThumbnailOutcome::Rendered(thumbnail) | ThumbnailOutcome::Placeholder { thumbnail, .. } => {
                Some(thumbnail)
            }
            ThumbnailOutcome::Unavailable { .. } => None,
        }
    }

    /// Why the model did not get a rendered thumbnail.
    pub fn cause(&self) -> Option<&ThumbnailError> {
        match self {
            ThumbnailOutcome::Rendered(_) => None,
            ThumbnailOutcome::Placeholder { cause, .. } | ThumbnailOutcome::Unavailable { cause } => Some(cause),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ThumbnailOutcome::Placeholder { .. })
    }
}

type RenderTask = JoinHandle<Result<Vec<u8>, RenderError>>;

/// Produces and stores thumbnails, one call at a time.
///
/// A render that outlives its timeout keeps running on the blocking pool;
/// the next render waits for it, so rasterizations never overlap.
pub struct ThumbnailPipeline {
    settings: PipelineSettings,
    loader: AssetLoader,
    store: Arc<dyn ObjectStore>,
    overrun: Mutex<Option<RenderTask>>,
}

impl ThumbnailPipeline {
    pub fn new(settings: PipelineSettings, loader: AssetLoader, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            settings,
            loader,
            store,
            overrun: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn loader(&self) -> &AssetLoader {
        &self.loader
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Loads `source` and renders it to PNG without storing anything.
    ///
    /// # Errors
    /// Load, timeout and render failures.
    pub async fn render(&self, source: &ModelSource, options: &RenderOptions) -> Result<Vec<u8>, ThumbnailError> {
        let model = self.loader.load(source).await?;
        self.settle().await;

        let options = options.clone();
        let limit = self.settings.render_timeout();
        let mut task = tokio::task::spawn_blocking(move || renderer::render_png(model, &options));
        match tokio::time::timeout(limit, &mut task).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join)) => Err(RenderError::Aborted(join.to_string()).into()),
            Err(_) => {
                warn!("render of {source} exceeded {limit:?}, still running in the background");
                *self.overrun.lock() = Some(task);
                Err(ThumbnailError::Timeout {
                    stage: Stage::Render,
                    after: limit,
                })
            }
        }
    }

    /// Waits for a render left running by an earlier timeout.
    pub async fn settle(&self) {
        let pending = self.overrun.lock().take();
        if let Some(task) = pending {
            if !task.is_finished() {
                warn!("waiting for a timed-out render to finish");
            }
            // Its output was already replaced by a placeholder
            let _ = task.await;
        }
    }

    /// Whether a timed-out render is still occupying the blocking pool.
    pub fn render_in_flight(&self) -> bool {
        self.overrun
            .lock()
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Renders and uploads a thumbnail for `record`, falling back to a
    /// placeholder when rendering fails.
    pub async fn generate(&self, record: &ModelRecord) -> ThumbnailOutcome {
        let options = self.settings.render_options();
        let rendered = match ModelSource::parse(&record.source) {
            Ok(source) => self.render(&source, &options).await,
            Err(e) => Err(e.into()),
        };

        match rendered {
            Ok(png) => match self.upload(&record.name, png, false).await {
                Ok(thumbnail) => {
                    info!("rendered thumbnail for {} ({})", record.name, record.id);
                    ThumbnailOutcome::Rendered(thumbnail)
                }
                Err(cause) => {
                    warn!("storing thumbnail for {} failed: {cause}", record.id);
                    ThumbnailOutcome::Unavailable { cause }
                }
            },
            Err(cause) => {
                warn!(
                    "rendering {} ({}) failed, using placeholder: {cause}",
                    record.name, record.id
                );
                self.placeholder(record, cause).await
            }
        }
    }

    async fn placeholder(&self, record: &ModelRecord, cause: ThumbnailError) -> ThumbnailOutcome {
        let png = match fallback::placeholder_png(&record.name, self.settings.width, self.settings.height) {
            Ok(png) => png,
            Err(e) => return ThumbnailOutcome::Unavailable { cause: e.into() },
        };
        match self.upload(&record.name, png, true).await {
            Ok(thumbnail) => ThumbnailOutcome::Placeholder { thumbnail, cause },
            Err(upload) => {
                warn!("storing placeholder for {} failed: {upload}", record.id);
                ThumbnailOutcome::Unavailable { cause: upload }
            }
        }
    }

    async fn upload(&self, name: &str, png: Vec<u8>, placeholder: bool) -> Result<Thumbnail, ThumbnailError> {
        let key = thumbnail_key(name, Utc::now());
        let reference = self.store.upload(&key, png.clone(), PNG_CONTENT_TYPE).await?;
        debug!("uploaded {} bytes to {} as {reference}", png.len(), self.store.name());
        let reference = if placeholder {
            ThumbnailRef::Placeholder(reference)
        } else {
            ThumbnailRef::Image(reference)
        };
        Ok(Thumbnail { reference, png })
    }
}
