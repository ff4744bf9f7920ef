//! Provides the format loader trait and the triangle representation shared by
//! the thumbnail pipeline.
//!
//! Catalog models are glTF/GLB assets. A loader flattens the scene graph into
//! world-space triangles that the software rasterizer consumes directly.
//!
//! # Examples
//! ```
//! use huitong_thumbs::formats;
//!
//! let result = formats::load_model(b"invalid", None);
//! assert!(result.is_err());
//! ```

pub mod gltf;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

// ---- Math type aliases ----
/// A 2D vector type used by format loaders.
pub type Vec2 = [f32; 2];
/// A 3D vector type used by format loaders.
pub type Vec3 = [f32; 3];
/// A column-major 4x4 matrix type used by format loaders.
pub type Mat4 = [[f32; 4]; 4];

/// External resources (buffers, images) keyed by the URI the document uses
/// to reference them.
pub type ExternalResources = HashMap<String, Vec<u8>>;

/// Represents loaded texture data for sampling.
///
/// # Examples
/// ```
/// use huitong_thumbs::formats::TextureData;
///
/// let tex = TextureData {
///     width: 1,
///     height: 1,
///     data: vec![255, 255, 255, 255],
/// };
/// assert_eq!(tex.sample(0.5, 0.5), [1.0, 1.0, 1.0, 1.0]);
/// ```
#[derive(Clone, Debug)]
pub struct TextureData {
    /// The texture width in pixels.
    pub width: u32,
    /// The texture height in pixels.
    pub height: u32,
    /// RGBA pixel data stored row-major.
    pub data: Vec<u8>,
}

impl TextureData {
    /// Samples the texture at UV coordinates, wrapping outside `[0, 1)`.
    pub fn sample(&self, u: f32, v: f32) -> [f32; 4] {
        let u = u.rem_euclid(1.0);
        let v = v.rem_euclid(1.0);

        let x = ((u * self.width as f32) as u32).min(self.width.saturating_sub(1));
        let y = ((v * self.height as f32) as u32).min(self.height.saturating_sub(1));
        let idx = ((y * self.width + x) * 4) as usize;

        match self.data.get(idx..idx + 4) {
            Some(px) => [
                px[0] as f32 / 255.0,
                px[1] as f32 / 255.0,
                px[2] as f32 / 255.0,
                px[3] as f32 / 255.0,
            ],
            None => [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// A world-space triangle with its surface description.
///
/// `roughness` and `metallic` come from the glTF metallic-roughness material
/// of the primitive the triangle belongs to.
///
/// # Examples
/// ```
/// use huitong_thumbs::formats::Triangle;
///
/// let tri = Triangle::flat([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], [1.0, 1.0, 1.0]);
/// assert_eq!(tri.metallic, 0.0);
/// ```
#[derive(Clone, Debug)]
pub struct Triangle {
    /// Triangle vertex positions.
    pub verts: [Vec3; 3],
    /// Triangle UV coordinates.
    pub uvs: [Vec2; 3],
    /// Base RGB color.
    pub color: [f32; 3],
    /// Perceptual roughness in `0..=1`.
    pub roughness: f32,
    /// Metalness in `0..=1`.
    pub metallic: f32,
    /// Optional base color texture.
    pub texture: Option<Arc<TextureData>>,
}

impl Triangle {
    /// Builds an untextured dielectric triangle.
    pub fn flat(verts: [Vec3; 3], color: [f32; 3]) -> Self {
        Self {
            verts,
            uvs: [[0.0, 0.0]; 3],
            color,
            roughness: 0.5,
            metallic: 0.0,
            texture: None,
        }
    }
}

/// Loaded model data ready for framing and rasterization.
///
/// # Examples
/// ```
/// use huitong_thumbs::formats::{ModelData, Triangle};
///
/// let mut model = ModelData {
///     triangles: vec![Triangle::flat(
///         [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
///         [1.0, 1.0, 1.0],
///     )],
/// };
/// model.translate([1.0, 0.0, 0.0]);
/// assert_eq!(model.triangles[0].verts[0], [1.0, 0.0, 0.0]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ModelData {
    /// Triangles ready for rasterization.
    pub triangles: Vec<Triangle>,
}

impl ModelData {
    /// Moves every vertex by `offset`.
    pub fn translate(&mut self, offset: Vec3) {
        for tri in &mut self.triangles {
            for v in &mut tri.verts {
                v[0] += offset[0];
                v[1] += offset[1];
                v[2] += offset[2];
            }
        }
    }
}

/// The result type for format loading.
pub type LoadResult = Result<ModelData, LoadError>;

/// Errors raised while fetching or parsing a model.
///
/// # Examples
/// ```
/// use huitong_thumbs::formats::LoadError;
///
/// let err = LoadError::NoGeometry;
/// assert_eq!(err.to_string(), "No geometry found");
/// ```
#[derive(Debug, Error)]
pub enum LoadError {
    /// Invalid or corrupted file data.
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// The payload is not a format any loader recognizes.
    #[error("Unrecognized format")]
    UnrecognizedFormat,
    /// Reading a local file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The document parsed but holds no triangles.
    #[error("No geometry found")]
    NoGeometry,
    /// A transport-level failure (connection refused, reset, DNS).
    #[error("Fetch failed: {0}")]
    Fetch(String),
    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    Http { status: u16, url: String },
    /// A referenced blob or external resource is not available.
    #[error("Missing resource: {0}")]
    MissingResource(String),
}

impl LoadError {
    /// Whether another attempt at the same remote resource could succeed.
    ///
    /// # Examples
    /// ```
    /// use huitong_thumbs::formats::LoadError;
    ///
    /// assert!(LoadError::Fetch("reset".into()).is_retryable());
    /// assert!(!LoadError::Http { status: 404, url: "x".into() }.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            LoadError::Fetch(_) => true,
            LoadError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// A trait for format-specific model loaders.
pub trait FormatLoader: Send + Sync {
    /// Returns the human-readable name for this format.
    fn name(&self) -> &'static str;

    /// Returns the file extensions this loader handles (lowercase, without dot).
    fn extensions(&self) -> &'static [&'static str];

    /// Checks whether this loader can handle the given data.
    ///
    /// This is a quick check (magic bytes, initial JSON structure) without
    /// fully parsing the file.
    fn can_load(&self, data: &[u8], extension: Option<&str>) -> bool;

    /// Loads a model from raw bytes with every resource embedded.
    ///
    /// # Errors
    /// Returns an error if the data cannot be parsed or contains no geometry.
    fn load_from_bytes(&self, data: &[u8]) -> LoadResult;

    /// Lists the relative URIs of resources the document expects next to it.
    fn external_uris(&self, _data: &[u8]) -> Vec<String> {
        Vec::new()
    }

    /// Loads a model whose external resources were fetched by the caller.
    ///
    /// # Errors
    /// Returns an error if the data cannot be parsed or contains no geometry.
    fn load_with_resources(&self, data: &[u8], _resources: &ExternalResources) -> LoadResult {
        self.load_from_bytes(data)
    }

    /// Loads a model from a file path, resolving sibling resources.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    fn load_from_path(&self, path: &Path) -> LoadResult {
        let data = std::fs::read(path)?;
        self.load_from_bytes(&data)
    }
}

/// Returns all registered format loaders.
pub fn get_loaders() -> Vec<Box<dyn FormatLoader>> {
    vec![Box::new(gltf::GltfLoader)]
}

/// Finds a loader that can handle the given data and extension.
///
/// # Examples
/// ```
/// use huitong_thumbs::formats;
///
/// let loader = formats::find_loader(b"glTF", Some("glb"));
/// assert!(loader.is_some());
/// ```
pub fn find_loader(data: &[u8], extension: Option<&str>) -> Option<Box<dyn FormatLoader>> {
    let mut loaders = get_loaders();

    if let Some(ext) = extension {
        let ext_lower = ext.to_lowercase();
        if let Some(idx) = loaders.iter().position(|loader| {
            loader.extensions().contains(&ext_lower.as_str())
                && loader.can_load(data, Some(&ext_lower))
        }) {
            return Some(loaders.swap_remove(idx));
        }
    }

    // Fall back to content-based detection
    loaders.into_iter().find(|loader| loader.can_load(data, extension))
}

/// Loads a model from bytes, auto-detecting the format.
///
/// # Errors
/// Returns an error if no loader recognizes the data or parsing fails.
///
/// # Examples
/// ```
/// use huitong_thumbs::formats::{self, LoadError};
///
/// let result = formats::load_model(b"invalid", None);
/// assert!(matches!(result, Err(LoadError::UnrecognizedFormat)));
/// ```
pub fn load_model(data: &[u8], extension: Option<&str>) -> LoadResult {
    load_model_with_resources(data, extension, &ExternalResources::new())
}

/// Loads a model from bytes plus pre-fetched external resources.
///
/// # Errors
/// Returns an error if no loader recognizes the data or parsing fails.
pub fn load_model_with_resources(
    data: &[u8],
    extension: Option<&str>,
    resources: &ExternalResources,
) -> LoadResult {
    find_loader(data, extension)
        .ok_or(LoadError::UnrecognizedFormat)?
        .load_with_resources(data, resources)
}

/// Loads a model from a file path, auto-detecting the format.
///
/// # Errors
/// Returns an error if the file cannot be read or the format is unrecognized.
pub fn load_model_from_path(path: &Path) -> LoadResult {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase());

    let data = std::fs::read(path)?;

    let loader = find_loader(&data, extension.as_deref()).ok_or(LoadError::UnrecognizedFormat)?;

    loader.load_from_path(path)
}
