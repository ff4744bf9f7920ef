//! Provides off-screen thumbnail generation for the 会通智能色彩云库 model catalog.
//!
//! Uploaded GLB/GLTF models get a PNG preview: the model is fetched under a
//! hard timeout, re-centered and framed, rasterized in software onto a
//! transparent background and stored through the configured object store.
//! Whatever goes wrong while loading or rendering, the model still ends up
//! with a reference: a placeholder cube colored from its name.
//!
//! The catalog also keeps PBR material presets the viewer applies to models.
//!
//! # Examples
//! ```
//! use huitong_thumbs::renderer::{self, RenderOptions};
//!
//! let image = renderer::render_thumbnail(b"", None, &RenderOptions::default());
//! assert!(image.is_none());
//!
//! let placeholder = huitong_thumbs::fallback::render_placeholder("duck.glb", 64, 64);
//! assert_eq!(placeholder.dimensions(), (64, 64));
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod fallback;
pub mod formats;
pub mod framing;
pub mod loader;
pub mod pipeline;
pub mod queue;
pub mod renderer;
pub mod scene;
pub mod service;
pub mod storage;

pub use config::{Config, PipelineSettings};
pub use error::ThumbnailError;
pub use pipeline::{Thumbnail, ThumbnailOutcome, ThumbnailPipeline};
pub use queue::GenerationQueue;
pub use service::ThumbnailService;
