//! Auto-framing: bounds, re-centering and camera distance.
//!
//! Uploaded models vary by orders of magnitude in scale and often carry an
//! arbitrary authored pivot. Framing moves the model's bounding-box center to
//! the origin and backs the camera off so the largest extent fills a fixed
//! fraction of the vertical field of view.
//!
//! # Examples
//! ```
//! use huitong_thumbs::framing::camera_distance;
//!
//! let d = camera_distance(2.0, 90f32.to_radians(), 1.0);
//! assert!((d - 1.0).abs() < 1e-5);
//! ```

use glam::Vec3;

use crate::formats::{ModelData, Triangle};
use crate::scene::Camera;

/// Smallest extent used for distance computation; degenerate boxes clamp to it.
pub const MIN_EXTENT: f32 = 1e-3;
/// Largest extent used for distance computation, keeping the result finite.
pub const MAX_EXTENT: f32 = 1e18;
/// Default breathing room around the model.
pub const DEFAULT_MARGIN: f32 = 1.5;

const DEFAULT_FOV: f32 = std::f32::consts::FRAC_PI_4;
// Rotated 180° so models face the camera instead of away
const VIEW_AZIMUTH_DEG: f32 = 35.0 + 180.0;
const VIEW_ELEVATION_DEG: f32 = 25.0;

/// An axis-aligned bounding box.
///
/// # Examples
/// ```
/// use glam::Vec3;
/// use huitong_thumbs::framing::Aabb;
///
/// let aabb = Aabb::new(Vec3::ZERO, Vec3::new(2.0, 4.0, 1.0));
/// assert_eq!(aabb.center(), Vec3::new(1.0, 2.0, 0.5));
/// assert_eq!(aabb.max_dimension(), 4.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Bounds of every triangle vertex, or `None` for an empty list.
    pub fn from_triangles(triangles: &[Triangle]) -> Option<Self> {
        let mut points = triangles.iter().flat_map(|tri| tri.verts.iter());
        let first = Vec3::from_array(*points.next()?);
        let (min, max) = points.fold((first, first), |(min, max), v| {
            let p = Vec3::from_array(*v);
            (min.min(p), max.max(p))
        });
        Some(Self { min, max })
    }

    pub fn center(&self) -> Vec3 {
        self.min.lerp(self.max, 0.5)
    }

    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Largest of the three extents, clamped to `[MIN_EXTENT, MAX_EXTENT]`.
    pub fn max_dimension(&self) -> f32 {
        clamp_extent(self.extent().max_element())
    }
}

fn clamp_extent(max_dim: f32) -> f32 {
    if max_dim.is_nan() {
        return MIN_EXTENT;
    }
    max_dim.clamp(MIN_EXTENT, MAX_EXTENT)
}

/// Distance at which an object of size `max_dim` fits the vertical `fov_y`
/// (radians) with `margin` to spare.
///
/// `d = (max_dim / 2) / tan(fov_y / 2) * margin`. The result is always
/// strictly positive and finite: `max_dim` is clamped, an invalid FOV falls
/// back to 45° and a non-positive margin to [`DEFAULT_MARGIN`].
pub fn camera_distance(max_dim: f32, fov_y: f32, margin: f32) -> f32 {
    let fov = if fov_y.is_finite() && fov_y > 0.0 && fov_y < std::f32::consts::PI {
        fov_y
    } else {
        DEFAULT_FOV
    };
    let margin = if margin.is_finite() && margin > 0.0 {
        margin
    } else {
        DEFAULT_MARGIN
    };
    (clamp_extent(max_dim) * 0.5) / (fov * 0.5).tan() * margin
}

/// Result of framing a model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Framing {
    /// Bounds before re-centering.
    pub bounds: Aabb,
    /// Translation applied to the model.
    pub offset: Vec3,
    /// Clamped largest extent.
    pub max_dim: f32,
    /// Camera distance from the origin.
    pub distance: f32,
}

/// Re-centers `model` on the origin and places `camera` so the whole model
/// is visible.
///
/// An empty model is treated as a point at the origin.
pub fn frame_model(model: &mut ModelData, camera: &mut Camera, margin: f32) -> Framing {
    let bounds = Aabb::from_triangles(&model.triangles).unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));
    let offset = -bounds.center();
    model.translate(offset.to_array());

    let max_dim = bounds.max_dimension();
    let distance = camera_distance(max_dim, camera.fov_y, margin);

    let azimuth = VIEW_AZIMUTH_DEG.to_radians();
    let elevation = VIEW_ELEVATION_DEG.to_radians();
    let direction = Vec3::new(
        elevation.cos() * azimuth.sin(),
        elevation.sin(),
        elevation.cos() * azimuth.cos(),
    );

    // Half diagonal of a cube with side max_dim bounds the whole model
    let radius = max_dim * 0.5 * 3f32.sqrt();
    camera.eye = direction * distance;
    camera.target = Vec3::ZERO;
    camera.near = (distance - radius * 1.1).max(distance * 0.01);
    camera.far = distance + radius * 2.0;

    Framing {
        bounds,
        offset,
        max_dim,
        distance,
    }
}
