//! Provides the per-request off-screen scene: camera, lights and render target.
//!
//! Every thumbnail builds its own [`OffscreenScene`]; nothing is shared between
//! renders, so dropping the scene releases all of its buffers.
//!
//! # Examples
//! ```
//! use huitong_thumbs::scene::OffscreenScene;
//!
//! let scene = OffscreenScene::new(256, 256, 45.0);
//! assert_eq!(scene.target.width(), 256);
//! ```

use glam::{Mat4, Vec3};

/// A perspective camera looking at `target`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub eye: Vec3,
    pub target: Vec3,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    /// Builds a camera at `eye` looking at the origin.
    pub fn new(fov_y: f32, aspect: f32) -> Self {
        Self {
            fov_y,
            aspect,
            eye: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            near: 0.01,
            far: 100.0,
        }
    }

    /// Combined view-projection matrix (right-handed, GL clip space).
    pub fn view_proj(&self) -> Mat4 {
        let view = Mat4::look_at_rh(self.eye, self.target, Vec3::Y);
        let proj = Mat4::perspective_rh_gl(self.fov_y, self.aspect, self.near, self.far);
        proj * view
    }
}

/// A directional light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Unit vector pointing towards the light.
    pub direction: Vec3,
    pub intensity: f32,
}

/// Key + fill lighting with a flat ambient term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lighting {
    pub ambient: f32,
    pub key: Light,
    pub fill: Light,
}

impl Default for Lighting {
    fn default() -> Self {
        Self {
            ambient: 0.15,
            key: Light {
                direction: Vec3::new(0.5, 0.8, 0.3).normalize(),
                intensity: 0.60,
            },
            fill: Light {
                direction: Vec3::new(-0.3, 0.2, -0.5).normalize(),
                intensity: 0.15,
            },
        }
    }
}

/// Color and depth buffers for a single render.
pub struct RenderTarget {
    width: u32,
    height: u32,
    pub(crate) color: Vec<[f32; 4]>,
    pub(crate) depth: Vec<f32>,
}

impl RenderTarget {
    /// Allocates cleared buffers; color starts fully transparent.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![[0.0; 4]; len],
            depth: vec![f32::INFINITY; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Consumes the target and quantizes the color buffer to RGBA8.
    pub fn into_rgba8(self) -> Vec<u8> {
        self.color
            .iter()
            .flat_map(|px| px.map(|c| (c.clamp(0.0, 1.0) * 255.0) as u8))
            .collect()
    }
}

/// Everything a single off-screen render needs.
pub struct OffscreenScene {
    pub camera: Camera,
    pub lighting: Lighting,
    pub target: RenderTarget,
}

impl OffscreenScene {
    /// Creates an isolated scene with a `width`×`height` target.
    pub fn new(width: u32, height: u32, fov_degrees: f32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        Self {
            camera: Camera::new(fov_degrees.to_radians(), aspect),
            lighting: Lighting::default(),
            target: RenderTarget::new(width, height),
        }
    }
}
