//! Failure taxonomy of the thumbnail pipeline.
//!
//! None of these escape the pipeline boundary as hard errors: load, timeout
//! and render failures become a placeholder, upload failures leave the model
//! without a new thumbnail. They are kept as values so callers can log and
//! report why a fallback happened.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::formats::LoadError;
use crate::renderer::RenderError;
use crate::storage::StorageError;

/// Pipeline stage bounded by a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => f.write_str("load"),
            Stage::Render => f.write_str("render"),
        }
    }
}

/// Why a thumbnail could not be produced as requested.
///
/// # Examples
/// ```
/// use std::time::Duration;
///
/// use huitong_thumbs::error::{Stage, ThumbnailError};
///
/// let err = ThumbnailError::Timeout { stage: Stage::Load, after: Duration::from_secs(15) };
/// assert_eq!(err.to_string(), "load timed out after 15s");
/// ```
#[derive(Debug, Error)]
pub enum ThumbnailError {
    /// Network, parse or format failure.
    #[error("load failed: {0}")]
    Load(#[from] LoadError),
    /// A stage exceeded its configured bound.
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
    /// Rasterizer or encoder failure.
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
    /// The storage backend rejected the artifact.
    #[error("upload failed: {0}")]
    Upload(#[from] StorageError),
}

impl ThumbnailError {
    /// Whether the pipeline substitutes a placeholder for this failure.
    pub fn falls_back_to_placeholder(&self) -> bool {
        !matches!(self, ThumbnailError::Upload(_))
    }
}
