//! Provides the software rasterizer for model thumbnails.
//!
//! A thumbnail is a snapshot: the model is framed, every triangle is drawn
//! once into a z-buffered target with a transparent background, and the
//! result is encoded to PNG. No GPU is required; the per-render scene owns
//! every buffer and is dropped as soon as the image is extracted, so
//! rendering a whole catalog in sequence does not accumulate memory.
//!
//! # Examples
//! ```
//! use huitong_thumbs::renderer::{render_thumbnail, RenderOptions};
//!
//! let image = render_thumbnail(b"not a model", None, &RenderOptions::default());
//! assert!(image.is_none());
//! ```

use std::io::Cursor;
use std::path::Path;

use glam::{Vec3, Vec4};
use image::{ImageFormat, RgbaImage};
use log::debug;
use thiserror::Error;

use crate::formats::{self, ModelData};
use crate::framing::{self, DEFAULT_MARGIN};
use crate::scene::{Lighting, OffscreenScene};

/// Largest accepted edge length for an output image.
pub const MAX_DIMENSION: u32 = 4096;

/// Errors raised while rasterizing or encoding.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid output size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("no geometry to render")]
    NoGeometry,
    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("render task aborted: {0}")]
    Aborted(String),
}

/// A PBR surface override applied to every triangle.
///
/// # Examples
/// ```
/// use huitong_thumbs::renderer::SurfaceMaterial;
///
/// let gold = SurfaceMaterial::from_rgb8([255, 200, 60], 0.3, 1.0);
/// assert_eq!(gold.color[0], 1.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceMaterial {
    /// Linear base color in `0..=1`.
    pub color: [f32; 3],
    pub roughness: f32,
    pub metallic: f32,
}

impl SurfaceMaterial {
    pub fn from_rgb8(rgb: [u8; 3], roughness: f32, metallic: f32) -> Self {
        Self {
            color: rgb.map(|c| c as f32 / 255.0),
            roughness: roughness.clamp(0.0, 1.0),
            metallic: metallic.clamp(0.0, 1.0),
        }
    }
}

/// Output and camera parameters for one render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub width: u32,
    pub height: u32,
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub margin: f32,
    pub material: Option<SurfaceMaterial>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 256,
            height: 256,
            fov_degrees: 45.0,
            margin: DEFAULT_MARGIN,
            material: None,
        }
    }
}

impl RenderOptions {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_material(mut self, material: SurfaceMaterial) -> Self {
        self.material = Some(material);
        self
    }
}

/// Renders a model from raw bytes, auto-detecting the format.
///
/// Returns `None` when the bytes do not hold a renderable model.
pub fn render_thumbnail(
    data: &[u8],
    extension: Option<&str>,
    options: &RenderOptions,
) -> Option<RgbaImage> {
    let model = formats::load_model(data, extension).ok()?;
    render_model(model, options).ok()
}

/// Renders a model from a file path, resolving sibling resources.
///
/// # Examples
/// ```
/// use std::path::Path;
///
/// use huitong_thumbs::renderer::{render_thumbnail_from_path, RenderOptions};
///
/// let image = render_thumbnail_from_path(Path::new("does_not_exist.glb"), &RenderOptions::default());
/// assert!(image.is_none());
/// ```
pub fn render_thumbnail_from_path(path: &Path, options: &RenderOptions) -> Option<RgbaImage> {
    let model = formats::load_model_from_path(path).ok()?;
    render_model(model, options).ok()
}

/// Frames and rasterizes `model` in a single pass.
///
/// # Errors
/// Fails on an out-of-range output size or a model without triangles.
pub fn render_model(mut model: ModelData, options: &RenderOptions) -> Result<RgbaImage, RenderError> {
    let (width, height) = (options.width, options.height);
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(RenderError::InvalidSize { width, height });
    }
    if model.triangles.is_empty() {
        return Err(RenderError::NoGeometry);
    }

    let mut scene = OffscreenScene::new(width, height, options.fov_degrees);
    let framing = framing::frame_model(&mut model, &mut scene.camera, options.margin);
    debug!(
        "framed {} triangles: max extent {:.4}, camera distance {:.4}",
        model.triangles.len(),
        framing.max_dim,
        framing.distance
    );

    rasterize(&model, &mut scene, options.material.as_ref());

    let OffscreenScene { target, .. } = scene;
    RgbaImage::from_raw(width, height, target.into_rgba8())
        .ok_or(RenderError::InvalidSize { width, height })
}

/// Encodes an RGBA image as PNG.
///
/// # Errors
/// Propagates encoder failures.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, RenderError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Renders `model` and encodes the result as PNG.
///
/// # Errors
/// See [`render_model`] and [`encode_png`].
pub fn render_png(model: ModelData, options: &RenderOptions) -> Result<Vec<u8>, RenderError> {
    let image = render_model(model, options)?;
    encode_png(&image)
}

fn rasterize(model: &ModelData, scene: &mut OffscreenScene, material: Option<&SurfaceMaterial>) {
    let view_proj = scene.camera.view_proj();
    let eye = scene.camera.eye;
    let lighting = scene.lighting;
    let target = &mut scene.target;
    let (width, height) = (target.width() as f32, target.height() as f32);
    let w = target.width() as usize;
    let h = target.height() as usize;

    for tri in &model.triangles {
        let mut screen = [Vec3::ZERO; 3];
        let mut visible = true;

        for i in 0..3 {
            let clip: Vec4 = view_proj * Vec3::from_array(tri.verts[i]).extend(1.0);

            if clip.w <= 0.0 {
                visible = false;
                break;
            }

            let inv_w = 1.0 / clip.w;
            screen[i] = Vec3::new(
                (clip.x * inv_w * 0.5 + 0.5) * width,
                (0.5 - clip.y * inv_w * 0.5) * height,
                clip.z * inv_w,
            );
        }

        if !visible {
            continue;
        }

        let v0 = Vec3::from_array(tri.verts[0]);
        let v1 = Vec3::from_array(tri.verts[1]);
        let v2 = Vec3::from_array(tri.verts[2]);
        let normal = (v1 - v0).cross(v2 - v0).normalize_or_zero();
        let centroid = (v0 + v1 + v2) / 3.0;
        let view_dir = (eye - centroid).normalize_or_zero();

        let (base_color, roughness, metallic) = match material {
            Some(m) => (m.color, m.roughness, m.metallic),
            None => (tri.color, tri.roughness, tri.metallic),
        };
        let lit = shade(normal, view_dir, roughness, metallic, &lighting);

        // Screen-space bounding box
        let min_x = screen[0].x.min(screen[1].x).min(screen[2].x).max(0.0) as usize;
        let max_x = (screen[0].x.max(screen[1].x).max(screen[2].x).ceil().max(0.0) as usize).min(w);
        let min_y = screen[0].y.min(screen[1].y).min(screen[2].y).max(0.0) as usize;
        let max_y = (screen[0].y.max(screen[1].y).max(screen[2].y).ceil().max(0.0) as usize).min(h);

        for y in min_y..max_y {
            for x in min_x..max_x {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;

                let (u_bary, v_bary, w_bary) = barycentric(screen, px, py);
                if u_bary < 0.0 || v_bary < 0.0 || w_bary < 0.0 {
                    continue;
                }

                let z = u_bary * screen[0].z + v_bary * screen[1].z + w_bary * screen[2].z;
                let idx = y * w + x;
                if z >= target.depth[idx] {
                    continue;
                }

                let (base, alpha) = match tri.texture {
                    Some(ref tex) => {
                        let tex_u = u_bary * tri.uvs[0][0] + v_bary * tri.uvs[1][0] + w_bary * tri.uvs[2][0];
                        let tex_v = u_bary * tri.uvs[0][1] + v_bary * tri.uvs[1][1] + w_bary * tri.uvs[2][1];
                        let sampled = tex.sample(tex_u, tex_v);
                        (
                            [
                                sampled[0] * base_color[0],
                                sampled[1] * base_color[1],
                                sampled[2] * base_color[2],
                            ],
                            sampled[3],
                        )
                    }
                    None => (base_color, 1.0),
                };

                // Alpha cutoff
                if alpha < 0.5 {
                    continue;
                }

                target.depth[idx] = z;
                let color = lit.apply(base, metallic);
                target.color[idx] = [color[0], color[1], color[2], 1.0];
            }
        }
    }
}

/// Per-triangle lighting terms, independent of the sampled base color.
struct Lit {
    diffuse: f32,
    specular: f32,
}

impl Lit {
    fn apply(&self, base: [f32; 3], metallic: f32) -> [f32; 3] {
        // Metals tint their highlights with the base color
        [0usize, 1, 2].map(|i| {
            let spec_color = 1.0 + (base[i] - 1.0) * metallic;
            (base[i] * self.diffuse + spec_color * self.specular).min(1.0)
        })
    }
}

fn shade(normal: Vec3, view_dir: Vec3, roughness: f32, metallic: f32, lighting: &Lighting) -> Lit {
    let facing = if normal.dot(view_dir) < 0.0 { -normal } else { normal };
    let shininess = 2.0 + (1.0 - roughness).powi(2) * 126.0;
    let reflectance = (0.04 + 0.96 * metallic) * (1.0 - roughness * 0.7);
    let diffuse_weight = 1.0 - metallic * 0.7;

    let mut diffuse = 0.0;
    let mut specular = 0.0;
    for light in [lighting.key, lighting.fill] {
        // Two-sided diffuse keeps back faces of open meshes readable
        diffuse += normal.dot(light.direction).abs() * light.intensity;
        let half = (light.direction + view_dir).normalize_or_zero();
        specular += facing.dot(half).max(0.0).powf(shininess) * light.intensity;
    }

    Lit {
        diffuse: lighting.ambient + diffuse * diffuse_weight,
        specular: specular * reflectance,
    }
}

fn barycentric(tri: [Vec3; 3], px: f32, py: f32) -> (f32, f32, f32) {
    let v0x = tri[1].x - tri[0].x;
    let v0y = tri[1].y - tri[0].y;
    let v1x = tri[2].x - tri[0].x;
    let v1y = tri[2].y - tri[0].y;
    let v2x = px - tri[0].x;
    let v2y = py - tri[0].y;

    let d00 = v0x * v0x + v0y * v0y;
    let d01 = v0x * v1x + v0y * v1y;
    let d11 = v1x * v1x + v1y * v1y;
    let d20 = v2x * v0x + v2y * v0y;
    let d21 = v2x * v1x + v2y * v1y;

    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-10 {
        return (-1.0, -1.0, -1.0);
    }

    let inv = 1.0 / denom;
    let v = (d11 * d20 - d01 * d21) * inv;
    let w = (d00 * d21 - d01 * d20) * inv;
    let u = 1.0 - v - w;

    (u, v, w)
}
