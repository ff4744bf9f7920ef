//! Remote storage and catalog backends against a local HTTP server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use huitong_thumbs::catalog::{CatalogError, CatalogStore, MaterialRecord, ModelRecord, RestCatalog, Rgb, ThumbnailRef};
use huitong_thumbs::loader::AssetLoader;
use huitong_thumbs::storage::{ObjectStore, RestObjectStore, StorageError};
use huitong_thumbs::{ThumbnailOutcome, ThumbnailPipeline, ThumbnailService};

use common::{cube_glb, fast_settings, Reply, TestServer};

const TIMEOUT: Duration = Duration::from_secs(5);

fn rest_store(server: &TestServer) -> RestObjectStore {
    RestObjectStore::new(&server.url("/"), "thumbs", Some("secret".into()), TIMEOUT).unwrap()
}

fn rest_catalog(server: &TestServer) -> RestCatalog {
    RestCatalog::new(&server.url(""), Some("secret".into()), TIMEOUT).unwrap()
}

fn rows<T: serde::Serialize>(rows: &[T]) -> String {
    serde_json::to_string(rows).unwrap()
}

// ===========================================================================
// Object storage
// ===========================================================================

#[tokio::test]
async fn test_upload_returns_public_url() {
    let server = TestServer::start(vec![(
        "POST /storage/v1/object/thumbs/thumbnails/a.png",
        Reply::Json(200, r#"{"Key": "thumbs/thumbnails/a.png"}"#.into()),
    )])
    .await;
    let store = rest_store(&server);

    let reference = store
        .upload("thumbnails/a.png", b"\x89PNG".to_vec(), "image/png")
        .await
        .unwrap();
    assert_eq!(reference, server.url("/storage/v1/object/public/thumbs/thumbnails/a.png"));
    assert!(store.owns(&reference));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let upload = &requests[0];
    assert_eq!(upload.method, "POST");
    assert_eq!(upload.body, b"\x89PNG");
    assert_eq!(upload.header("content-type"), Some("image/png"));
    assert_eq!(upload.header("apikey"), Some("secret"));
    assert_eq!(upload.header("authorization"), Some("Bearer secret"));
    assert_eq!(upload.header("x-upsert"), Some("false"));
}

#[tokio::test]
async fn test_rejected_upload_carries_status() {
    let server = TestServer::start(vec![(
        "/storage/v1/object/thumbs/thumbnails/big.png",
        Reply::Json(413, r#"{"error": "Payload too large"}"#.into()),
    )])
    .await;
    let result = rest_store(&server).upload("thumbnails/big.png", vec![0; 16], "image/png").await;
    match result {
        Err(StorageError::Rejected { status, body }) => {
            assert_eq!(status, 413);
            assert!(body.contains("too large"));
        }
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_delete_maps_missing_object_to_not_found() {
    let server = TestServer::start(vec![(
        "DELETE /storage/v1/object/thumbs/thumbnails/old.png",
        Reply::Json(200, "[]".into()),
    )])
    .await;
    let store = rest_store(&server);

    let old = server.url("/storage/v1/object/public/thumbs/thumbnails/old.png");
    store.delete(&old).await.unwrap();

    let gone = server.url("/storage/v1/object/public/thumbs/thumbnails/gone.png");
    assert!(matches!(store.delete(&gone).await, Err(StorageError::NotFound(_))));

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.method == "DELETE"));
    assert_eq!(requests[1].target, "/storage/v1/object/thumbs/thumbnails/gone.png");
}

#[tokio::test]
async fn test_delete_of_foreign_reference_sends_nothing() {
    let server = TestServer::start(vec![]).await;
    let result = rest_store(&server).delete("https://cdn.example.com/a.png").await;
    assert!(matches!(result, Err(StorageError::ForeignReference(_))));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_ensure_bucket_creates_public_bucket() {
    let server = TestServer::start(vec![("POST /storage/v1/bucket", Reply::Json(200, r#"{"name": "thumbs"}"#.into()))]).await;
    assert!(rest_store(&server).ensure_bucket().await.unwrap());

    let body = server.requests()[0].json();
    assert_eq!(body["id"], "thumbs");
    assert_eq!(body["public"], true);
}

#[tokio::test]
async fn test_ensure_bucket_accepts_existing_bucket() {
    let conflict = TestServer::start(vec![("/storage/v1/bucket", Reply::Status(409))]).await;
    assert!(!rest_store(&conflict).ensure_bucket().await.unwrap());

    let worded = TestServer::start(vec![(
        "/storage/v1/bucket",
        Reply::Json(400, r#"{"message": "The resource already exists"}"#.into()),
    )])
    .await;
    assert!(!rest_store(&worded).ensure_bucket().await.unwrap());

    let broken = TestServer::start(vec![("/storage/v1/bucket", Reply::Status(500))]).await;
    assert!(matches!(
        rest_store(&broken).ensure_bucket().await,
        Err(StorageError::Rejected { status: 500, .. })
    ));
}

// ===========================================================================
// Catalog
// ===========================================================================

#[tokio::test]
async fn test_get_model_filters_by_id() {
    let record = ModelRecord::new("duck.glb", "https://cdn.example.com/duck.glb").with_description("yellow");
    let server = TestServer::start(vec![("GET /rest/v1/models", Reply::Json(200, rows(&[record.clone()])))]).await;

    let fetched = rest_catalog(&server).get_model(&record.id).await.unwrap();
    assert_eq!(fetched, Some(record.clone()));

    let request = &server.requests()[0];
    assert!(request.target.contains(&format!("id=eq.{}", record.id)), "{}", request.target);
    assert!(request.target.contains("order=created_at.asc"));
    assert_eq!(request.header("authorization"), Some("Bearer secret"));
}

#[tokio::test]
async fn test_list_models_has_no_id_filter() {
    let server = TestServer::start(vec![("/rest/v1/models", Reply::Json(200, "[]".into()))]).await;
    assert!(rest_catalog(&server).list_models().await.unwrap().is_empty());
    assert!(!server.requests()[0].target.contains("id=eq."));
}

#[tokio::test]
async fn test_set_thumbnail_patches_row() {
    let mut record = ModelRecord::new("lamp", "https://cdn.example.com/lamp.glb");
    let reference = ThumbnailRef::Image("https://cdn.example.com/lamp.png".into());
    record.thumbnail = Some(reference.clone());
    let server = TestServer::start(vec![("PATCH /rest/v1/models", Reply::Json(200, rows(&[record.clone()])))]).await;

    let updated = rest_catalog(&server).set_thumbnail(&record.id, reference).await.unwrap();
    assert_eq!(updated.thumbnail, record.thumbnail);

    let request = &server.requests()[0];
    assert_eq!(request.method, "PATCH");
    assert!(request.target.contains(&format!("id=eq.{}", record.id)));
    assert_eq!(request.header("prefer"), Some("return=representation"));
    let body = request.json();
    assert_eq!(body["thumbnail"]["kind"], "image");
    assert_eq!(body["thumbnail"]["reference"], "https://cdn.example.com/lamp.png");
}

#[tokio::test]
async fn test_set_thumbnail_on_missing_row_is_not_found() {
    let server = TestServer::start(vec![("PATCH /rest/v1/models", Reply::Json(200, "[]".into()))]).await;
    let result = rest_catalog(&server)
        .set_thumbnail("ghost", ThumbnailRef::Placeholder("x".into()))
        .await;
    assert!(matches!(result, Err(CatalogError::NotFound { kind: "model", .. })));
}

#[tokio::test]
async fn test_insert_conflict_is_duplicate() {
    let server = TestServer::start(vec![
        ("POST /rest/v1/models", Reply::Status(409)),
        ("POST /rest/v1/materials", Reply::Status(409)),
    ])
    .await;
    let catalog = rest_catalog(&server);

    let model = ModelRecord::new("chair", "chair.glb");
    match catalog.insert_model(model.clone()).await {
        Err(CatalogError::Duplicate { kind, id }) => assert_eq!((kind, id), ("model", model.id)),
        other => panic!("expected a duplicate, got {other:?}"),
    }

    let material = MaterialRecord::new("oak", Rgb([150, 110, 70]), 0.8, 0.0).unwrap();
    assert!(matches!(
        catalog.insert_material(material).await,
        Err(CatalogError::Duplicate { kind: "material", .. })
    ));
    assert_eq!(server.requests()[0].header("prefer"), Some("return=representation"));
}

#[tokio::test]
async fn test_insert_returns_stored_row() {
    let material = MaterialRecord::new("oak", Rgb([150, 110, 70]), 0.8, 0.0).unwrap();
    let server = TestServer::start(vec![("POST /rest/v1/materials", Reply::Json(201, rows(&[material.clone()])))]).await;

    let stored = rest_catalog(&server).insert_material(material.clone()).await.unwrap();
    assert_eq!(stored.id, material.id);
    assert_eq!(server.requests()[0].json()["color"], "#966e46");
}

#[tokio::test]
async fn test_delete_without_row_is_none_and_errors_are_rejections() {
    let server = TestServer::start(vec![
        ("DELETE /rest/v1/models", Reply::Json(200, "[]".into())),
        ("GET /rest/v1/materials", Reply::Json(500, r#"{"message": "boom"}"#.into())),
    ])
    .await;
    let catalog = rest_catalog(&server);

    assert_eq!(catalog.delete_model("ghost").await.unwrap(), None);
    assert!(matches!(
        catalog.list_materials().await,
        Err(CatalogError::Rejected { status: 500, .. })
    ));
}

// ===========================================================================
// Service over both remote backends
// ===========================================================================

#[tokio::test]
async fn test_process_over_remote_backends() {
    let assets = TestServer::start(vec![("/duck.glb", Reply::Body(cube_glb([0.0; 3], 1.0)))]).await;
    let record = ModelRecord::new("duck.glb", assets.url("/duck.glb"));

    let server = TestServer::start(vec![
        ("GET /rest/v1/models", Reply::Json(200, rows(&[record.clone()]))),
        ("PATCH /rest/v1/models", Reply::Json(200, rows(&[record.clone()]))),
        ("POST /storage/v1/object/thumbs/thumbnails/*", Reply::Json(200, "{}".into())),
    ])
    .await;
    let settings = fast_settings();
    let store = Arc::new(rest_store(&server));
    let pipeline = ThumbnailPipeline::new(settings.clone(), AssetLoader::new(&settings).unwrap(), store);
    let service = ThumbnailService::new(Arc::new(rest_catalog(&server)), pipeline);

    let outcome = service.process(&record.id).await.unwrap();
    let reference = match outcome {
        ThumbnailOutcome::Rendered(thumbnail) => thumbnail.reference,
        other => panic!("expected a rendered thumbnail, got {other:?}"),
    };
    let public = server.url("/storage/v1/object/public/thumbs/thumbnails/");
    assert!(reference.reference().starts_with(&public), "{}", reference.reference());

    let requests = server.requests();
    let upload = requests.iter().find(|r| r.method == "POST").unwrap();
    assert_eq!(&upload.body[..4], b"\x89PNG");
    assert_eq!(upload.header("content-type"), Some("image/png"));

    let patch = requests.iter().find(|r| r.method == "PATCH").unwrap();
    assert_eq!(patch.json()["thumbnail"]["kind"], "image");
    assert_eq!(patch.json()["thumbnail"]["reference"], reference.reference());
}
