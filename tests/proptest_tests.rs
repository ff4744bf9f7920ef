//! Property-based tests for framing and placeholders.
//!
//! These tests use proptest to check invariants over arbitrary model sizes,
//! positions and names.

use huitong_thumbs::fallback::{label_text, placeholder_color, LABEL_MAX_CHARS};
use huitong_thumbs::formats::{ModelData, Triangle};
use huitong_thumbs::framing::{camera_distance, frame_model, Aabb, DEFAULT_MARGIN};
use huitong_thumbs::scene::Camera;
use huitong_thumbs::storage::{sanitize_name, thumbnail_key};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

/// A finite coordinate across many orders of magnitude
fn coordinate_strategy() -> impl Strategy<Value = f32> {
    prop_oneof![-1e4f32..1e4f32, -1e-3f32..1e-3f32, -1e8f32..1e8f32]
}

fn triangle_strategy() -> impl Strategy<Value = Triangle> {
    prop::array::uniform3(prop::array::uniform3(coordinate_strategy()))
        .prop_map(|verts| Triangle::flat(verts, [1.0, 1.0, 1.0]))
}

// ============================================================================
// Framing
// ============================================================================

proptest! {
    #[test]
    fn distance_is_positive_and_finite(
        max_dim in prop_oneof![Just(0.0f32), Just(f32::NAN), Just(f32::INFINITY), any::<f32>()],
        fov in prop_oneof![Just(0.0f32), 1e-3f32..3.1f32, any::<f32>()],
        margin in prop_oneof![Just(0.0f32), Just(-1.0f32), 1.0f32..3.0f32],
    ) {
        let d = camera_distance(max_dim, fov, margin);
        prop_assert!(d > 0.0);
        prop_assert!(d.is_finite());
    }

    #[test]
    fn distance_grows_with_size(a in 1e-2f32..1e6f32, b in 1e-2f32..1e6f32) {
        let fov = 45f32.to_radians();
        let (small, large) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(camera_distance(small, fov, DEFAULT_MARGIN) <= camera_distance(large, fov, DEFAULT_MARGIN));
    }

    #[test]
    fn framing_recenters_and_keeps_camera_outside(
        triangles in prop::collection::vec(triangle_strategy(), 1..8),
    ) {
        let mut model = ModelData { triangles };
        let mut camera = Camera::new(45f32.to_radians(), 1.0);
        let framing = frame_model(&mut model, &mut camera, DEFAULT_MARGIN);

        let after = Aabb::from_triangles(&model.triangles).unwrap();
        let tolerance = after.extent().max_element().max(1.0) * 1e-3;
        prop_assert!(after.center().length() <= tolerance);
        prop_assert!(framing.distance.is_finite() && framing.distance > 0.0);
        prop_assert!(camera.near > 0.0 && camera.near < camera.far);
        prop_assert!(camera.eye.length() >= framing.max_dim * 0.5);
    }
}

// ============================================================================
// Placeholders and keys
// ============================================================================

proptest! {
    #[test]
    fn placeholder_color_is_deterministic_and_bounded(name in ".{0,40}") {
        let color = placeholder_color(&name);
        prop_assert_eq!(color, placeholder_color(&name));
        for channel in color {
            prop_assert!((55..=254).contains(&channel));
        }
    }

    #[test]
    fn label_never_exceeds_limit(name in ".{0,80}") {
        prop_assert!(label_text(&name).chars().count() <= LABEL_MAX_CHARS);
    }

    #[test]
    fn keys_are_storage_safe(name in ".{0,80}") {
        let key = thumbnail_key(&name, chrono::Utc::now());
        prop_assert!(key.starts_with("thumbnails/"));
        prop_assert!(key.ends_with(".png"));
        prop_assert_eq!(key.matches('/').count(), 1);
        let sanitized = sanitize_name(&name);
        prop_assert!(!sanitized.is_empty() && sanitized.len() <= 48);
    }
}
