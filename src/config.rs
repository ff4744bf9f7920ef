//! TOML configuration and backend wiring.
//!
//! Every section and field is optional; a missing file yields the defaults
//! (in-memory storage and catalog, 256×256 thumbnails).
//!
//! ```toml
//! [pipeline]
//! load_timeout_ms = 15000
//! render_timeout_ms = 10000
//! max_attempts = 3
//!
//! [storage]
//! backend = "rest"
//! endpoint = "https://project.example.com"
//! bucket = "thumbnails"
//!
//! [catalog]
//! backend = "json"
//! path = "catalog.json"
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{CatalogError, CatalogStore, JsonCatalog, MemoryCatalog, RestCatalog};
use crate::framing::DEFAULT_MARGIN;
use crate::loader::AssetLoader;
use crate::pipeline::ThumbnailPipeline;
use crate::renderer::{RenderOptions, MAX_DIMENSION};
use crate::service::ThumbnailService;
use crate::storage::{FsObjectStore, MemoryObjectStore, ObjectStore, RestObjectStore, StorageError};

/// Environment variable consulted when no `api_key` is configured.
pub const API_KEY_ENV: &str = "HUITONG_API_KEY";

/// Errors raised while loading configuration or building backends.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Rendering, timeout and retry parameters.
    #[serde(default)]
    pub pipeline: PipelineSettings,
    /// Where thumbnail artifacts go.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Where model and material records live.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Tunables of the thumbnail pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Output width in pixels.
    #[serde(default = "default_size")]
    pub width: u32,
    /// Output height in pixels.
    #[serde(default = "default_size")]
    pub height: u32,
    /// Vertical field of view in degrees.
    #[serde(default = "default_fov")]
    pub fov_degrees: f32,
    /// Framing margin applied to the camera distance.
    #[serde(default = "default_margin")]
    pub margin: f32,
    /// Hard bound on loading a model, retries included.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,
    /// Bound on rasterizing and encoding one thumbnail.
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,
    /// Per-request timeout of the HTTP client.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    /// Attempts per remote fetch, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Pause between attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            width: default_size(),
            height: default_size(),
            fov_degrees: default_fov(),
            margin: default_margin(),
            load_timeout_ms: default_load_timeout_ms(),
            render_timeout_ms: default_render_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl PipelineSettings {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Render options for a default (material-less) thumbnail.
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            width: self.width,
            height: self.height,
            fov_degrees: self.fov_degrees,
            margin: self.margin,
            material: None,
        }
    }

    /// # Errors
    /// Describes the first out-of-range field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let size_ok = |v: u32| (1..=MAX_DIMENSION).contains(&v);
        if !size_ok(self.width) || !size_ok(self.height) {
            return Err(ConfigError::Invalid(format!(
                "pipeline size {}x{} must be within 1..={MAX_DIMENSION}",
                self.width, self.height
            )));
        }
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.fov_degrees {} must be within (0, 180)",
                self.fov_degrees
            )));
        }
        if !(self.margin.is_finite() && self.margin >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.margin {} must be at least 1",
                self.margin
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("pipeline.max_attempts must be at least 1".into()));
        }
        for (field, value) in [
            ("load_timeout_ms", self.load_timeout_ms),
            ("render_timeout_ms", self.render_timeout_ms),
            ("fetch_timeout_ms", self.fetch_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("pipeline.{field} must be positive")));
            }
        }
        Ok(())
    }
}

fn default_size() -> u32 {
    256
}

fn default_fov() -> f32 {
    45.0
}

fn default_margin() -> f32 {
    DEFAULT_MARGIN
}

fn default_load_timeout_ms() -> u64 {
    15_000
}

fn default_render_timeout_ms() -> u64 {
    10_000
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

/// Which object store holds thumbnails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Fs,
    Rest,
}

/// Object storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the `fs` backend.
    #[serde(default = "default_storage_directory")]
    pub directory: String,
    /// Base URL for the `rest` backend.
    pub endpoint: Option<String>,
    /// Bucket for the `rest` backend.
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// API key; falls back to `HUITONG_API_KEY`.
    pub api_key: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            directory: default_storage_directory(),
            endpoint: None,
            bucket: default_bucket(),
            api_key: None,
        }
    }
}

fn default_storage_directory() -> String {
    "thumbnails".to_owned()
}

fn default_bucket() -> String {
    "thumbnails".to_owned()
}

/// Which catalog backend holds records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogBackend {
    #[default]
    Memory,
    Json,
    Rest,
}

/// Catalog configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub backend: CatalogBackend,
    /// Document path for the `json` backend.
    #[serde(default = "default_catalog_path")]
    pub path: String,
    /// Base URL for the `rest` backend.
    pub endpoint: Option<String>,
    /// API key; falls back to `HUITONG_API_KEY`.
    pub api_key: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            backend: CatalogBackend::default(),
            path: default_catalog_path(),
            endpoint: None,
            api_key: None,
        }
    }
}

fn default_catalog_path() -> String {
    "catalog.json".to_owned()
}

/// The configured API key, else `HUITONG_API_KEY`; empty keys count as unset.
pub fn api_key(configured: &Option<String>) -> Option<String> {
    configured
        .clone()
        .or_else(|| std::env::var(API_KEY_ENV).ok())
        .filter(|k| !k.is_empty())
}

impl Config {
    /// Loads `path`, or the defaults if the file does not exist.
    ///
    /// # Errors
    /// Fails when the file exists but cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                info!("loaded configuration from {}", path.display());
                Self::from_toml_str(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    /// Fails on malformed TOML or out-of-range values.
    ///
    /// # Examples
    /// ```
    /// use huitong_thumbs::config::{Config, StorageBackend};
    ///
    /// let config = Config::from_toml_str("[storage]\nbackend = \"fs\"\n").unwrap();
    /// assert_eq!(config.storage.backend, StorageBackend::Fs);
    /// assert_eq!(config.pipeline.max_attempts, 3);
    /// ```
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Describes the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        if self.storage.backend == StorageBackend::Rest && self.storage.endpoint.is_none() {
            return Err(ConfigError::Invalid("storage.endpoint is required for the rest backend".into()));
        }
        if self.catalog.backend == CatalogBackend::Rest && self.catalog.endpoint.is_none() {
            return Err(ConfigError::Invalid("catalog.endpoint is required for the rest backend".into()));
        }
        // Memory references die with the process
        if self.catalog.backend != CatalogBackend::Memory && self.storage.backend == StorageBackend::Memory {
            return Err(ConfigError::Invalid(
                "a persistent catalog needs storage.backend = \"fs\" or \"rest\"".into(),
            ));
        }
        Ok(())
    }

    /// Builds the configured object store.
    ///
    /// The in-memory blob registry is returned alongside so locally uploaded
    /// models resolve regardless of where thumbnails go.
    ///
    /// # Errors
    /// Fails if a backend cannot be constructed.
    pub fn build_store(&self) -> Result<(Arc<dyn ObjectStore>, Arc<MemoryObjectStore>), ConfigError> {
        let blobs = Arc::new(MemoryObjectStore::new());
        let store: Arc<dyn ObjectStore> = match self.storage.backend {
            StorageBackend::Memory => blobs.clone(),
            StorageBackend::Fs => Arc::new(FsObjectStore::new(&self.storage.directory)?),
            StorageBackend::Rest => {
                let endpoint = self
                    .storage
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| ConfigError::Invalid("storage.endpoint is required".into()))?;
                Arc::new(RestObjectStore::new(
                    endpoint,
                    &self.storage.bucket,
                    api_key(&self.storage.api_key),
                    self.pipeline.fetch_timeout(),
                )?)
            }
        };
        debug!("using {} object store", store.name());
        Ok((store, blobs))
    }

    /// Builds the configured catalog.
    ///
    /// # Errors
    /// Fails if a backend cannot be constructed or its document is corrupt.
    pub async fn build_catalog(&self) -> Result<Arc<dyn CatalogStore>, ConfigError> {
        let catalog: Arc<dyn CatalogStore> = match self.catalog.backend {
            CatalogBackend::Memory => Arc::new(MemoryCatalog::new()),
            CatalogBackend::Json => Arc::new(JsonCatalog::open(&self.catalog.path).await?),
            CatalogBackend::Rest => {
                let endpoint = self
                    .catalog
                    .endpoint
                    .as_deref()
                    .ok_or_else(|| ConfigError::Invalid("catalog.endpoint is required".into()))?;
                Arc::new(RestCatalog::new(
                    endpoint,
                    api_key(&self.catalog.api_key),
                    self.pipeline.fetch_timeout(),
                )?)
            }
        };
        debug!("using {} catalog", catalog.name());
        Ok(catalog)
    }

    /// Wires catalog, loader, store and pipeline into a service.
    ///
    /// # Errors
    /// See [`build_store`](Self::build_store) and [`build_catalog`](Self::build_catalog).
    pub async fn build_service(&self) -> Result<ThumbnailService, ConfigError> {
        let (store, blobs) = self.build_store()?;
        let catalog = self.build_catalog().await?;
        let loader = AssetLoader::new(&self.pipeline)
            .map_err(|e| ConfigError::Invalid(format!("cannot build HTTP client: {e}")))?
            .with_blobs(blobs);
        let pipeline = ThumbnailPipeline::new(self.pipeline.clone(), loader, store);
        Ok(ThumbnailService::new(catalog, pipeline))
    }
}
