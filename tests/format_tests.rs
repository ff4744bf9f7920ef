//! Integration tests for glTF loading, framing and rendering.

mod common;

use huitong_thumbs::formats::{self, ExternalResources, FormatLoader, LoadError};
use huitong_thumbs::framing::{frame_model, Aabb, DEFAULT_MARGIN};
use huitong_thumbs::renderer::{self, RenderOptions};
use huitong_thumbs::scene::Camera;

use common::{cube_glb, cube_gltf_external};

// ===========================================================================
// Format detection tests
// ===========================================================================

#[test]
fn test_gltf_loader_detection_glb_magic() {
    let loader = formats::gltf::GltfLoader;

    let glb_data = b"glTF\x02\x00\x00\x00";
    assert!(loader.can_load(glb_data, None));
    assert!(loader.can_load(glb_data, Some("glb")));
}

#[test]
fn test_gltf_loader_detection_by_extension() {
    let loader = formats::gltf::GltfLoader;

    let random_data = b"not gltf data at all";
    assert!(loader.can_load(random_data, Some("gltf")));
    assert!(loader.can_load(random_data, Some("GLB")));
    assert!(!loader.can_load(random_data, Some("obj")));
}

#[test]
fn test_unrecognized_format() {
    let result = formats::load_model(b"solid ascii stl", Some("stl"));
    assert!(matches!(result, Err(LoadError::UnrecognizedFormat)));
}

#[test]
fn test_truncated_glb_is_an_error_not_a_panic() {
    let glb = cube_glb([0.0; 3], 1.0);
    for cut in [12, 20, glb.len() / 2, glb.len() - 4] {
        assert!(formats::load_model(&glb[..cut], Some("glb")).is_err(), "cut at {cut}");
    }
}

// ===========================================================================
// Loading tests
// ===========================================================================

#[test]
fn test_glb_cube_has_twelve_triangles() {
    let model = formats::load_model(&cube_glb([0.0; 3], 1.0), Some("glb")).unwrap();
    assert_eq!(model.triangles.len(), 12);

    let bounds = Aabb::from_triangles(&model.triangles).unwrap();
    assert_eq!(bounds.min.to_array(), [-1.0; 3]);
    assert_eq!(bounds.max.to_array(), [1.0; 3]);
}

#[test]
fn test_external_buffer_from_resources() {
    let (document, bin) = cube_gltf_external([0.0; 3], 0.5, "cube.bin");
    let loader = formats::gltf::GltfLoader;
    assert_eq!(loader.external_uris(document.as_bytes()), vec!["cube.bin".to_string()]);

    let mut resources = ExternalResources::new();
    resources.insert("cube.bin".into(), bin);
    let model = formats::load_model_with_resources(document.as_bytes(), Some("gltf"), &resources).unwrap();
    assert_eq!(model.triangles.len(), 12);
}

#[test]
fn test_external_buffer_missing_yields_no_geometry() {
    let (document, _) = cube_gltf_external([0.0; 3], 0.5, "cube.bin");
    let result = formats::load_model(document.as_bytes(), Some("gltf"));
    assert!(matches!(result, Err(LoadError::NoGeometry)));
}

#[test]
fn test_load_from_path_resolves_sibling_files() {
    let dir = tempfile::tempdir().unwrap();
    let (document, bin) = cube_gltf_external([0.0; 3], 0.5, "cube.bin");
    std::fs::write(dir.path().join("cube.gltf"), document).unwrap();
    std::fs::write(dir.path().join("cube.bin"), bin).unwrap();

    let model = formats::load_model_from_path(&dir.path().join("cube.gltf")).unwrap();
    assert_eq!(model.triangles.len(), 12);
}

// ===========================================================================
// Framing and rendering tests
// ===========================================================================

#[test]
fn test_off_center_model_is_recentered() {
    let mut model = formats::load_model(&cube_glb([100.0, -50.0, 20.0], 5.0), Some("glb")).unwrap();
    let mut camera = Camera::new(45f32.to_radians(), 1.0);
    let framing = frame_model(&mut model, &mut camera, DEFAULT_MARGIN);

    assert_eq!(framing.max_dim, 10.0);
    let center = Aabb::from_triangles(&model.triangles).unwrap().center();
    assert!(center.length() < 1e-3);
    assert!(camera.eye.length() > framing.max_dim);
}

#[test]
fn test_render_glb_bytes() {
    let options = RenderOptions::default().with_size(96, 64);
    let image = renderer::render_thumbnail(&cube_glb([0.0; 3], 1.0), Some("glb"), &options).unwrap();
    assert_eq!(image.dimensions(), (96, 64));
    assert_eq!(image.get_pixel(48, 32)[3], 255);
    assert_eq!(image.get_pixel(0, 0)[3], 0);
}

#[test]
fn test_tiny_and_huge_models_cover_similar_area() {
    let coverage = |half: f32| {
        let image = renderer::render_thumbnail(
            &cube_glb([0.0; 3], half),
            Some("glb"),
            &RenderOptions::default().with_size(64, 64),
        )
        .unwrap();
        image.pixels().filter(|p| p[3] > 0).count()
    };
    let tiny = coverage(0.01);
    let huge = coverage(5000.0);
    assert!(tiny > 200);
    assert!((tiny as i64 - huge as i64).abs() <= 16, "tiny {tiny} vs huge {huge}");
}
