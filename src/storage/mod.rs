//! Object storage for thumbnail artifacts and locally uploaded models.
//!
//! The pipeline only sees [`ObjectStore`]; which backend sits behind it is a
//! configuration choice:
//!
//! - [`MemoryObjectStore`] keeps bytes in process under `blob:` references.
//! - [`FsObjectStore`] writes into a directory and hands out `file://` URLs.
//! - [`RestObjectStore`] talks to a remote object storage REST API.

pub mod fs;
pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;
pub use rest::RestObjectStore;

/// Content type of every thumbnail artifact.
pub const PNG_CONTENT_TYPE: &str = "image/png";

const KEY_PREFIX: &str = "thumbnails";
const MODEL_PREFIX: &str = "models";
const MAX_NAME_LEN: usize = 48;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("reference {0} does not belong to this store")]
    ForeignReference(String),
    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("storage rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid storage endpoint: {0}")]
    InvalidEndpoint(String),
}

/// A place to put encoded artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Stores `bytes` under `key` and returns a durable reference.
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError>;

    /// Reads back the bytes behind a reference returned by [`upload`](Self::upload).
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes the object behind `reference`.
    async fn delete(&self, reference: &str) -> Result<(), StorageError>;

    /// Whether `reference` was issued by this store.
    fn owns(&self, reference: &str) -> bool;
}

/// Reduces a model name to a storage-safe fragment.
///
/// ASCII alphanumerics, `-`, `_` and `.` are kept; everything else becomes
/// `_`. The result is at most 48 characters and never empty.
///
/// # Examples
/// ```
/// use huitong_thumbs::storage::sanitize_name;
///
/// assert_eq!(sanitize_name("duck.glb"), "duck.glb");
/// assert_eq!(sanitize_name("红色 椅子/v2"), "______v2");
/// assert_eq!(sanitize_name(""), "model");
/// ```
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect();
    if cleaned.is_empty() {
        "model".to_string()
    } else {
        cleaned
    }
}

/// Generates a unique storage key for a thumbnail of `name`.
///
/// Keys look like `thumbnails/{unix_millis}_{nonce}_{name}.png`. The nonce
/// keeps two models with the same name rendered in the same millisecond
/// from sharing an object.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use huitong_thumbs::storage::thumbnail_key;
///
/// let key = thumbnail_key("duck.glb", Utc::now());
/// assert!(key.starts_with("thumbnails/"));
/// assert!(key.ends_with("_duck.glb.png"));
/// ```
pub fn thumbnail_key(name: &str, at: DateTime<Utc>) -> String {
    format!("{}.png", object_key(KEY_PREFIX, name, at))
}

/// Generates a unique storage key for an uploaded model source.
///
/// Keys look like `models/{unix_millis}_{nonce}_{name}`; the name keeps its
/// extension so the loader can pick a format.
///
/// # Examples
/// ```
/// use chrono::Utc;
/// use huitong_thumbs::storage::model_key;
///
/// let key = model_key("红色 chair.glb", Utc::now());
/// assert!(key.starts_with("models/"));
/// assert!(key.ends_with("_chair.glb"));
/// ```
pub fn model_key(name: &str, at: DateTime<Utc>) -> String {
    object_key(MODEL_PREFIX, name, at)
}

fn object_key(prefix: &str, name: &str, at: DateTime<Utc>) -> String {
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}/{}_{}_{}",
        at.timestamp_millis(),
        &nonce[..8],
        sanitize_name(name)
    )
}
