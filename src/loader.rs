//! Fetches and parses model sources under a hard timeout.
//!
//! A source is a remote URL, an inline `data:` URI, a `blob:` reference into
//! the in-process blob registry, or a local path. Remote fetches are retried
//! on transport errors and 5xx/429 answers; the load timeout bounds the whole
//! sequence, retries and sibling resources included, so a source that never
//! answers costs at most `load_timeout`.
//!
//! Parsing runs on the blocking pool so a large document does not stall the
//! runtime; a parser panic surfaces as [`LoadError::InvalidData`].

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::{Client, Url};

use crate::config::PipelineSettings;
use crate::error::{Stage, ThumbnailError};
use crate::formats::{self, gltf::decode_data_uri, ExternalResources, LoadError, LoadResult, ModelData};
use crate::storage::memory::BLOB_PREFIX;
use crate::storage::MemoryObjectStore;

/// Where a model's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Remote(Url),
    /// A `data:` URI carrying the whole document.
    Inline(String),
    /// A reference into the in-process blob registry.
    Blob(String),
    File(PathBuf),
}

impl ModelSource {
    /// Classifies a stored source string.
    ///
    /// # Errors
    /// Returns [`LoadError::MissingResource`] for an empty source.
    ///
    /// # Examples
    /// ```
    /// use huitong_thumbs::loader::ModelSource;
    ///
    /// let remote = ModelSource::parse("https://cdn.example.com/duck.glb").unwrap();
    /// assert_eq!(remote.extension().as_deref(), Some("glb"));
    /// assert!(!remote.is_local());
    ///
    /// assert!(ModelSource::parse("blob:memory/models/1_duck.glb").unwrap().is_local());
    /// assert!(ModelSource::parse("  ").is_err());
    /// ```
    pub fn parse(source: &str) -> Result<Self, LoadError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(LoadError::MissingResource("empty model source".into()));
        }
        if source.starts_with("data:") {
            return Ok(ModelSource::Inline(source.to_string()));
        }
        if source.starts_with(BLOB_PREFIX) {
            return Ok(ModelSource::Blob(source.to_string()));
        }
        if let Ok(url) = Url::parse(source) {
            match url.scheme() {
                "http" | "https" => return Ok(ModelSource::Remote(url)),
                "file" => {
                    let path = url
                        .to_file_path()
                        .map_err(|()| LoadError::InvalidData(format!("bad file URL {source}")))?;
                    return Ok(ModelSource::File(path));
                }
                "blob" => return Ok(ModelSource::Blob(source.to_string())),
                _ => {}
            }
        }
        Ok(ModelSource::File(PathBuf::from(source)))
    }

    /// Whether loading never touches the network.
    pub fn is_local(&self) -> bool {
        !matches!(self, ModelSource::Remote(_))
    }

    /// Lowercase file extension hint, if the source carries one.
    pub fn extension(&self) -> Option<String> {
        let name = match self {
            ModelSource::Remote(url) => url.path_segments()?.last()?.to_string(),
            ModelSource::Blob(reference) => reference.rsplit('/').next()?.to_string(),
            ModelSource::File(path) => path.file_name()?.to_str()?.to_string(),
            ModelSource::Inline(uri) => {
                let mime = uri.strip_prefix("data:")?.split([';', ',']).next()?;
                return match mime {
                    "model/gltf-binary" => Some("glb".into()),
                    "model/gltf+json" => Some("gltf".into()),
                    _ => None,
                };
            }
        };
        let (_, ext) = name.rsplit_once('.')?;
        Some(ext.to_lowercase()).filter(|e| !e.is_empty())
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Remote(url) => write!(f, "{url}"),
            ModelSource::Inline(uri) => {
                let head: String = uri.chars().take(32).collect();
                write!(f, "{head}...")
            }
            ModelSource::Blob(reference) => f.write_str(reference),
            ModelSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Turns a [`ModelSource`] into parsed geometry.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    client: Client,
    blobs: Arc<MemoryObjectStore>,
    load_timeout: Duration,
    max_attempts: u32,
    retry_delay: Duration,
}

impl AssetLoader {
    /// Builds a loader with its own empty blob registry.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn new(settings: &PipelineSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(settings.fetch_timeout()).build()?;
        Ok(Self {
            client,
            blobs: Arc::new(MemoryObjectStore::new()),
            load_timeout: settings.load_timeout(),
            max_attempts: settings.max_attempts.max(1),
            retry_delay: settings.retry_delay(),
        })
    }

    /// Resolves `blob:` sources against `blobs`.
    pub fn with_blobs(mut self, blobs: Arc<MemoryObjectStore>) -> Self {
        self.blobs = blobs;
        self
    }

    pub fn blobs(&self) -> &Arc<MemoryObjectStore> {
        &self.blobs
    }

    pub fn load_timeout(&self) -> Duration {
        self.load_timeout
    }

    /// Loads `source` within the load timeout.
    ///
    /// # Errors
    /// [`ThumbnailError::Timeout`] when the bound is hit, otherwise
    /// [`ThumbnailError::Load`].
    pub async fn load(&self, source: &ModelSource) -> Result<ModelData, ThumbnailError> {
        debug!("loading {source}");
        match tokio::time::timeout(self.load_timeout, self.load_unbounded(source)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ThumbnailError::Timeout {
                stage: Stage::Load,
                after: self.load_timeout,
            }),
        }
    }

    async fn load_unbounded(&self, source: &ModelSource) -> LoadResult {
        let extension = source.extension();
        match source {
            ModelSource::Remote(url) => {
                let bytes = self.fetch_with_retry(url).await?;
                let resources = self.fetch_resources(url, &bytes, extension.as_deref()).await?;
                parse_blocking(bytes, extension, resources).await
            }
            ModelSource::Inline(uri) => {
                let bytes = decode_data_uri(uri)
                    .ok_or_else(|| LoadError::InvalidData("undecodable data URI".into()))?;
                parse_blocking(bytes, extension, ExternalResources::new()).await
            }
            ModelSource::Blob(reference) => {
                let bytes = self
                    .blobs
                    .get(reference)
                    .ok_or_else(|| LoadError::MissingResource(reference.clone()))?;
                parse_blocking(bytes, extension, ExternalResources::new()).await
            }
            ModelSource::File(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || formats::load_model_from_path(&path))
                    .await
                    .map_err(|e| LoadError::InvalidData(format!("parser task failed: {e}")))?
            }
        }
    }

    async fn fetch_with_retry(&self, url: &Url) -> Result<Vec<u8>, LoadError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!("attempt {attempt}/{} for {url} failed: {e}", self.max_attempts);
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Vec<u8>, LoadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| LoadError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| LoadError::Fetch(e.to_string()))?;
        debug!("fetched {} bytes from {url}", bytes.len());
        Ok(bytes.to_vec())
    }

    /// Fetches the `.bin` and image files a JSON glTF references, relative
    /// to the document URL.
    async fn fetch_resources(
        &self,
        base: &Url,
        data: &[u8],
        extension: Option<&str>,
    ) -> Result<ExternalResources, LoadError> {
        let uris = formats::find_loader(data, extension)
            .map(|loader| loader.external_uris(data))
            .unwrap_or_default();
        let mut resources = ExternalResources::new();
        for uri in uris {
            let url = base
                .join(&uri)
                .map_err(|e| LoadError::InvalidData(format!("bad resource URI {uri}: {e}")))?;
            let bytes = self.fetch_with_retry(&url).await?;
            resources.insert(uri, bytes);
        }
        Ok(resources)
    }
}

async fn parse_blocking(bytes: Vec<u8>, extension: Option<String>, resources: ExternalResources) -> LoadResult {
    tokio::task::spawn_blocking(move || {
        formats::load_model_with_resources(&bytes, extension.as_deref(), &resources)
    })
    .await
    .map_err(|e| LoadError::InvalidData(format!("parser task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> AssetLoader {
        AssetLoader::new(&PipelineSettings::default()).unwrap()
    }

    #[test]
    fn test_parse_classifies_sources() {
        assert!(matches!(
            ModelSource::parse("http://localhost:8080/a.gltf").unwrap(),
            ModelSource::Remote(_)
        ));
        assert!(matches!(
            ModelSource::parse("data:model/gltf+json;base64,e30=").unwrap(),
            ModelSource::Inline(_)
        ));
        assert_eq!(
            ModelSource::parse("models/chair.GLB").unwrap(),
            ModelSource::File(PathBuf::from("models/chair.GLB"))
        );
        assert_eq!(
            ModelSource::parse("models/chair.GLB").unwrap().extension().as_deref(),
            Some("glb")
        );
    }

    #[test]
    fn test_inline_extension_from_mime() {
        let source = ModelSource::parse("data:model/gltf-binary;base64,AAAA").unwrap();
        assert_eq!(source.extension().as_deref(), Some("glb"));
        let source = ModelSource::parse("data:application/octet-stream;base64,AAAA").unwrap();
        assert_eq!(source.extension(), None);
    }

    #[tokio::test]
    async fn test_unknown_blob_is_load_failure() {
        let source = ModelSource::parse("blob:memory/models/missing.glb").unwrap();
        let err = loader().load(&source).await.unwrap_err();
        assert!(matches!(err, ThumbnailError::Load(LoadError::MissingResource(_))));
    }

    #[tokio::test]
    async fn test_garbage_blob_is_unrecognized() {
        let loader = loader();
        let reference = loader.blobs().insert_blob("junk.bin", b"not a model".to_vec(), "application/octet-stream");
        let source = ModelSource::parse(&reference).unwrap();
        let err = loader.load(&source).await.unwrap_err();
        assert!(matches!(err, ThumbnailError::Load(LoadError::UnrecognizedFormat)));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let source = ModelSource::File(PathBuf::from("/definitely/not/here.glb"));
        let err = loader().load(&source).await.unwrap_err();
        assert!(matches!(err, ThumbnailError::Load(LoadError::Io(_))));
    }
}
