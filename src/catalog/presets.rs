//! Built-in material presets.

use chrono::{DateTime, Utc};

use super::{MaterialRecord, Rgb};

// (id, name, color, roughness, metallic)
const PRESETS: &[(&str, &str, [u8; 3], f32, f32)] = &[
    ("preset-matte-white", "Matte White", [245, 245, 240], 0.90, 0.0),
    ("preset-glossy-red", "Glossy Red", [200, 30, 40], 0.15, 0.0),
    ("preset-brushed-steel", "Brushed Steel", [180, 182, 186], 0.35, 1.0),
    ("preset-gold", "Gold", [255, 200, 80], 0.25, 1.0),
    ("preset-rubber-black", "Rubber Black", [25, 25, 25], 0.95, 0.0),
    ("preset-ceramic-blue", "Ceramic Blue", [40, 90, 180], 0.20, 0.0),
    ("preset-copper", "Copper", [184, 115, 51], 0.30, 1.0),
    ("preset-frosted-green", "Frosted Green", [90, 170, 110], 0.60, 0.0),
];

/// The presets shipped with the catalog, with stable ids.
///
/// # Examples
/// ```
/// use huitong_thumbs::catalog::presets;
///
/// let all = presets();
/// assert_eq!(all.len(), 8);
/// assert!(all.iter().all(|m| m.validate().is_ok()));
/// ```
pub fn presets() -> Vec<MaterialRecord> {
    PRESETS
        .iter()
        .map(|&(id, name, color, roughness, metallic)| MaterialRecord {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            color: Rgb(color),
            roughness,
            metallic,
            created_at: DateTime::<Utc>::UNIX_EPOCH,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        })
        .collect()
}

/// Looks a preset up by id or case-insensitive name.
///
/// # Examples
/// ```
/// use huitong_thumbs::catalog::find_preset;
///
/// assert_eq!(find_preset("gold").unwrap().id, "preset-gold");
/// assert_eq!(find_preset("preset-copper").unwrap().name, "Copper");
/// assert!(find_preset("plaid").is_none());
/// ```
pub fn find_preset(key: &str) -> Option<MaterialRecord> {
    let key = key.trim();
    presets()
        .into_iter()
        .find(|m| m.id == key || m.name.eq_ignore_ascii_case(key))
}
