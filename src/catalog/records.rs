//! Catalog records: models, materials and thumbnail references.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::CatalogError;
use crate::renderer::SurfaceMaterial;

/// What a model's thumbnail field points at.
///
/// # Examples
/// ```
/// use huitong_thumbs::catalog::ThumbnailRef;
///
/// let thumb = ThumbnailRef::Placeholder("blob:memory/thumbnails/1_b.png".into());
/// assert!(thumb.is_placeholder());
/// assert_eq!(thumb.reference(), "blob:memory/thumbnails/1_b.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reference", rename_all = "snake_case")]
pub enum ThumbnailRef {
    /// A rendered thumbnail.
    Image(String),
    /// A name-derived placeholder stored in place of a render.
    Placeholder(String),
}

impl ThumbnailRef {
    pub fn reference(&self) -> &str {
        match self {
            ThumbnailRef::Image(r) | ThumbnailRef::Placeholder(r) => r,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ThumbnailRef::Placeholder(_))
    }
}

/// Lifecycle of a model's thumbnail.
///
/// `Absent → Generating → Ready | Placeholder`, and back to `Generating` on
/// an explicit regenerate. Only deleting the model clears the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailState {
    Absent,
    Generating,
    Ready,
    Placeholder,
}

impl ThumbnailState {
    /// State of `record`, given whether the queue is working on it right now.
    pub fn of(record: &ModelRecord, generating: bool) -> Self {
        if generating {
            return ThumbnailState::Generating;
        }
        match record.thumbnail {
            None => ThumbnailState::Absent,
            Some(ThumbnailRef::Image(_)) => ThumbnailState::Ready,
            Some(ThumbnailRef::Placeholder(_)) => ThumbnailState::Placeholder,
        }
    }
}

/// A catalog model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// URL, `blob:` reference or local path of the GLB/GLTF file.
    pub source: String,
    #[serde(default)]
    pub thumbnail: Option<ThumbnailRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ModelRecord {
    /// A fresh record with a random id and no thumbnail.
    ///
    /// # Examples
    /// ```
    /// use huitong_thumbs::catalog::ModelRecord;
    ///
    /// let a = ModelRecord::new("duck.glb", "https://example.com/duck.glb");
    /// let b = ModelRecord::new("duck.glb", "https://example.com/duck.glb");
    /// assert_ne!(a.id, b.id);
    /// assert!(a.thumbnail.is_none());
    /// ```
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            source: source.into(),
            thumbnail: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Returned when a color string is not `#rrggbb`.
#[derive(Debug, Error)]
#[error("invalid color {0:?}, expected #rrggbb")]
pub struct ParseColorError(String);

/// An sRGB base color, serialized as `#rrggbb`.
///
/// # Examples
/// ```
/// use huitong_thumbs::catalog::Rgb;
///
/// let red: Rgb = "#ff0000".parse().unwrap();
/// assert_eq!(red, Rgb([255, 0, 0]));
/// assert_eq!(red.to_string(), "#ff0000");
/// assert!("#ff00".parse::<Rgb>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb(pub [u8; 3]);

impl FromStr for Rgb {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ParseColorError(s.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ParseColorError(s.to_string()))
        };
        Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl TryFrom<String> for Rgb {
    type Error = ParseColorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

/// A PBR material the viewer can apply to any model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: Rgb,
    pub roughness: f32,
    pub metallic: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MaterialRecord {
    /// Creates a validated material with a random id.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidMaterial`] for an empty name or factors
    /// outside `0..=1`.
    ///
    /// # Examples
    /// ```
    /// use huitong_thumbs::catalog::{MaterialRecord, Rgb};
    ///
    /// assert!(MaterialRecord::new("steel", Rgb([180, 180, 190]), 0.3, 1.0).is_ok());
    /// assert!(MaterialRecord::new("bad", Rgb([0, 0, 0]), 1.5, 0.0).is_err());
    /// ```
    pub fn new(name: impl Into<String>, color: Rgb, roughness: f32, metallic: f32) -> Result<Self, CatalogError> {
        let now = Utc::now();
        let record = Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            color,
            roughness,
            metallic,
            created_at: now,
            updated_at: now,
        };
        record.validate()?;
        Ok(record)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Checks the name and factor ranges.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidMaterial`] describing the first problem.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::InvalidMaterial("name must not be empty".into()));
        }
        for (field, value) in [("roughness", self.roughness), ("metallic", self.metallic)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CatalogError::InvalidMaterial(format!(
                    "{field} must be within 0..=1, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Surface parameters for the rasterizer.
    pub fn surface(&self) -> SurfaceMaterial {
        SurfaceMaterial::from_rgb8(self.color.0, self.roughness, self.metallic)
    }
}
