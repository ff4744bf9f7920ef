//! Provides the glTF/GLB format loader.
//!
//! Supports binary GLB and JSON glTF with embedded data URIs. JSON documents
//! that reference sibling `.bin` or image files can be loaded either from a
//! path or from bytes plus the resources the caller fetched for them.
//!
//! # Examples
//! ```
//! use huitong_thumbs::formats::{self, FormatLoader};
//!
//! let loader = formats::gltf::GltfLoader;
//! assert!(loader.extensions().contains(&"glb"));
//! ```

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use glam::{Mat4, Vec3};
use log::{debug, warn};

use super::{ExternalResources, FormatLoader, LoadError, LoadResult, ModelData, TextureData, Triangle, Vec2};

/// The glTF format loader.
///
/// # Examples
/// ```
/// use huitong_thumbs::formats::{self, FormatLoader};
///
/// let loader = formats::gltf::GltfLoader;
/// assert_eq!(loader.name(), "glTF");
/// ```
pub struct GltfLoader;

impl FormatLoader for GltfLoader {
    fn name(&self) -> &'static str {
        "glTF"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["gltf", "glb"]
    }

    fn can_load(&self, data: &[u8], extension: Option<&str>) -> bool {
        if let Some(ext) = extension {
            let ext_lower = ext.to_lowercase();
            if ext_lower == "gltf" || ext_lower == "glb" {
                return true;
            }
        }

        // GLB magic bytes
        if data.len() >= 4 && &data[0..4] == b"glTF" {
            return true;
        }

        if data.len() > 10 {
            let start = String::from_utf8_lossy(&data[..data.len().min(1000)]);
            if start.contains("\"asset\"")
                && (start.contains("\"scene\"") || start.contains("\"scenes\""))
            {
                return true;
            }
        }

        false
    }

    fn load_from_bytes(&self, data: &[u8]) -> LoadResult {
        self.load_with_resources(data, &ExternalResources::new())
    }

    fn external_uris(&self, data: &[u8]) -> Vec<String> {
        let Ok(gltf_data) = gltf::Gltf::from_slice(data) else {
            return Vec::new();
        };
        let document = &gltf_data.document;

        let mut uris: Vec<String> = document
            .buffers()
            .filter_map(|buffer| match buffer.source() {
                gltf::buffer::Source::Uri(uri) if !is_data_uri(uri) => Some(uri.to_string()),
                _ => None,
            })
            .chain(document.images().filter_map(|image| match image.source() {
                gltf::image::Source::Uri { uri, .. } if !is_data_uri(uri) => Some(uri.to_string()),
                _ => None,
            }))
            .collect();
        uris.sort();
        uris.dedup();
        uris
    }

    fn load_with_resources(&self, data: &[u8], resources: &ExternalResources) -> LoadResult {
        // The standard import handles GLB and fully-embedded glTF
        if resources.is_empty() {
            if let Ok((document, buffers, images)) = gltf::import_slice(data) {
                let images: Vec<_> = images.into_iter().map(Some).collect();
                return load_from_gltf(&document, &buffers, &images);
            }
        }

        let gltf_data = gltf::Gltf::from_slice(data)
            .map_err(|e| LoadError::InvalidData(format!("Failed to parse glTF: {e}")))?;
        let document = gltf_data.document;
        let blob = gltf_data.blob;

        let buffers: Vec<gltf::buffer::Data> = document
            .buffers()
            .map(|buffer| gltf::buffer::Data(resolve_buffer(buffer.source(), blob.as_deref(), resources)))
            .collect();

        let images: Vec<Option<gltf::image::Data>> = document
            .images()
            .map(|image| resolve_image(image.source(), &buffers, resources))
            .collect();

        load_from_gltf(&document, &buffers, &images)
    }

    fn load_from_path(&self, path: &Path) -> LoadResult {
        let (document, buffers, images) = gltf::import(path)
            .map_err(|e| LoadError::InvalidData(format!("Failed to import glTF: {e}")))?;
        let images: Vec<_> = images.into_iter().map(Some).collect();
        load_from_gltf(&document, &buffers, &images)
    }
}

fn resolve_buffer(
    source: gltf::buffer::Source<'_>,
    blob: Option<&[u8]>,
    resources: &ExternalResources,
) -> Vec<u8> {
    match source {
        gltf::buffer::Source::Bin => match blob {
            Some(blob) => blob.to_vec(),
            None => {
                warn!("GLB binary chunk referenced but absent");
                Vec::new()
            }
        },
        gltf::buffer::Source::Uri(uri) => {
            if let Some(data) = decode_data_uri(uri) {
                data
            } else if let Some(data) = resources.get(uri) {
                data.clone()
            } else {
                warn!("glTF buffer {uri} is not available");
                Vec::new()
            }
        }
    }
}

fn resolve_image(
    source: gltf::image::Source<'_>,
    buffers: &[gltf::buffer::Data],
    resources: &ExternalResources,
) -> Option<gltf::image::Data> {
    match source {
        gltf::image::Source::View { view, .. } => {
            let buffer = buffers.get(view.buffer().index())?;
            let bytes = buffer.0.get(view.offset()..view.offset() + view.length())?;
            decode_image_data(bytes)
        }
        gltf::image::Source::Uri { uri, .. } => {
            let bytes = decode_data_uri(uri).or_else(|| resources.get(uri).cloned())?;
            decode_image_data(&bytes)
        }
    }
}

/// Collects world-space triangles from a parsed glTF document.
fn load_from_gltf(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    images: &[Option<gltf::image::Data>],
) -> LoadResult {
    let textures: Vec<Option<Arc<TextureData>>> = document
        .textures()
        .map(|tex| {
            let img = images.get(tex.source().index())?.as_ref()?;
            Some(Arc::new(TextureData {
                width: img.width,
                height: img.height,
                data: convert_to_rgba(&img.pixels, img.format),
            }))
        })
        .collect();

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or(LoadError::NoGeometry)?;

    let mut triangles = Vec::new();
    for node in scene.nodes() {
        extract_node_triangles(&node, buffers, &textures, &mut triangles, Mat4::IDENTITY);
    }

    if triangles.is_empty() {
        return Err(LoadError::NoGeometry);
    }

    debug!("glTF scene flattened to {} triangles", triangles.len());
    Ok(ModelData { triangles })
}

/// Recursively walks the glTF scene graph and collects world-space triangles.
fn extract_node_triangles(
    node: &gltf::Node,
    buffers: &[gltf::buffer::Data],
    textures: &[Option<Arc<TextureData>>],
    triangles: &mut Vec<Triangle>,
    parent: Mat4,
) {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());

    if let Some(mesh) = node.mesh() {
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                continue;
            }

            // Missing or truncated buffers read as absent attributes
            let reader = primitive.reader(|buffer| {
                buffers
                    .get(buffer.index())
                    .map(|d| d.0.as_slice())
                    .filter(|d| !d.is_empty() && d.len() >= buffer.length())
            });

            let positions: Vec<[f32; 3]> = match reader.read_positions() {
                Some(iter) => iter.collect(),
                None => continue,
            };

            let uvs: Vec<Vec2> = reader
                .read_tex_coords(0)
                .map(|iter| iter.into_f32().collect())
                .unwrap_or_default();

            let vertex_colors: Option<Vec<[f32; 4]>> = reader
                .read_colors(0)
                .map(|iter| iter.into_rgba_f32().collect());

            let material = primitive.material();
            let pbr = material.pbr_metallic_roughness();
            let base = pbr.base_color_factor();
            let material_color = [base[0], base[1], base[2]];
            let roughness = pbr.roughness_factor().clamp(0.0, 1.0);
            let metallic = pbr.metallic_factor().clamp(0.0, 1.0);

            let texture = pbr
                .base_color_texture()
                .and_then(|info| textures.get(info.texture().index()).cloned().flatten());

            let indices: Vec<u32> = match reader.read_indices() {
                Some(iter) => iter.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            for tri in indices.chunks_exact(3) {
                let idx = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
                if idx.iter().any(|&i| i >= positions.len()) {
                    continue;
                }

                let verts = idx.map(|i| {
                    world
                        .transform_point3(Vec3::from_array(positions[i]))
                        .to_array()
                });
                let tri_uvs = idx.map(|i| uvs.get(i).copied().unwrap_or([0.0, 0.0]));

                let color = match vertex_colors {
                    Some(ref vc) => {
                        let c = idx.map(|i| vc.get(i).copied().unwrap_or([1.0; 4]));
                        [0usize, 1, 2].map(|ch| {
                            (c[0][ch] + c[1][ch] + c[2][ch]) / 3.0 * material_color[ch]
                        })
                    }
                    None => material_color,
                };

                triangles.push(Triangle {
                    verts,
                    uvs: tri_uvs,
                    color,
                    roughness,
                    metallic,
                    texture: texture.clone(),
                });
            }
        }
    }

    for child in node.children() {
        extract_node_triangles(&child, buffers, textures, triangles, world);
    }
}

fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Decodes a base64 `data:` URI to raw bytes.
pub(crate) fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    if !is_data_uri(uri) {
        return None;
    }

    let comma_pos = uri.find(',')?;
    base64::engine::general_purpose::STANDARD
        .decode(&uri[(comma_pos + 1)..])
        .ok()
}

/// Decodes image data (PNG, JPEG) to RGBA pixels.
fn decode_image_data(data: &[u8]) -> Option<gltf::image::Data> {
    let img = image::load_from_memory(data).ok()?;
    let rgba = img.to_rgba8();

    Some(gltf::image::Data {
        width: rgba.width(),
        height: rgba.height(),
        format: gltf::image::Format::R8G8B8A8,
        pixels: rgba.into_raw(),
    })
}

/// Converts decoded glTF pixel data to 8-bit RGBA.
fn convert_to_rgba(pixels: &[u8], format: gltf::image::Format) -> Vec<u8> {
    use gltf::image::Format;

    let (channels, channel_bytes) = match format {
        Format::R8 => (1, 1),
        Format::R8G8 => (2, 1),
        Format::R8G8B8 => (3, 1),
        Format::R8G8B8A8 => (4, 1),
        Format::R16 => (1, 2),
        Format::R16G16 => (2, 2),
        Format::R16G16B16 => (3, 2),
        Format::R16G16B16A16 => (4, 2),
        Format::R32G32B32FLOAT => (3, 4),
        Format::R32G32B32A32FLOAT => (4, 4),
    };

    let read = |c: &[u8]| -> u8 {
        match c.len() {
            1 => c[0],
            // little-endian u16, keep the high byte
            2 => c[1],
            _ => (f32::from_le_bytes([c[0], c[1], c[2], c[3]]).clamp(0.0, 1.0) * 255.0) as u8,
        }
    };

    let stride = channels * channel_bytes;
    let mut rgba = Vec::with_capacity(pixels.len() / stride * 4);
    for px in pixels.chunks_exact(stride) {
        let ch = |i: usize| read(&px[i * channel_bytes..(i + 1) * channel_bytes]);
        let out = match channels {
            1 => [ch(0), ch(0), ch(0), 255],
            2 => [ch(0), ch(1), 0, 255],
            3 => [ch(0), ch(1), ch(2), 255],
            _ => [ch(0), ch(1), ch(2), ch(3)],
        };
        rgba.extend_from_slice(&out);
    }
    rgba
}
