//! In-process object store.
//!
//! Doubles as the blob registry the asset loader resolves `blob:` sources
//! against, without touching the network. Nothing here outlives the
//! process, so only the in-memory catalog may hold these references.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{sanitize_name, ObjectStore, StorageError};

/// Prefix of every reference issued by [`MemoryObjectStore`].
pub const BLOB_PREFIX: &str = "blob:memory/";

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// A [`HashMap`]-backed store handing out `blob:memory/...` references.
///
/// # Examples
/// ```
/// use huitong_thumbs::storage::MemoryObjectStore;
///
/// let store = MemoryObjectStore::new();
/// let reference = store.insert_blob("duck.glb", b"glTF".to_vec(), "model/gltf-binary");
/// assert_eq!(store.get(&reference).as_deref(), Some(&b"glTF"[..]));
/// ```
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model source and returns its `blob:` reference.
    pub fn insert_blob(&self, name: &str, bytes: Vec<u8>, content_type: &str) -> String {
        let key = format!("models/{}_{}", Uuid::new_v4().simple(), sanitize_name(name));
        self.put(&key, bytes, content_type)
    }

    /// Returns a copy of the bytes behind `reference`.
    pub fn get(&self, reference: &str) -> Option<Vec<u8>> {
        let key = reference.strip_prefix(BLOB_PREFIX)?;
        self.objects.read().get(key).map(|o| o.bytes.clone())
    }

    /// Content type recorded at upload.
    pub fn content_type(&self, reference: &str) -> Option<String> {
        let key = reference.strip_prefix(BLOB_PREFIX)?;
        self.objects.read().get(key).map(|o| o.content_type.clone())
    }

    /// Drops the object behind `reference`; returns whether it existed.
    pub fn remove(&self, reference: &str) -> bool {
        match reference.strip_prefix(BLOB_PREFIX) {
            Some(key) => self.objects.write().remove(key).is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> String {
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        format!("{BLOB_PREFIX}{key}")
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        Ok(self.put(key, bytes, content_type))
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, StorageError> {
        if !self.owns(reference) {
            return Err(StorageError::ForeignReference(reference.to_string()));
        }
        self.get(reference)
            .ok_or_else(|| StorageError::NotFound(reference.to_string()))
    }

    async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        if !self.owns(reference) {
            return Err(StorageError::ForeignReference(reference.to_string()));
        }
        if self.remove(reference) {
            Ok(())
        } else {
            Err(StorageError::NotFound(reference.to_string()))
        }
    }

    fn owns(&self, reference: &str) -> bool {
        reference.starts_with(BLOB_PREFIX)
    }
}
