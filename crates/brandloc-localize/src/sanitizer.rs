//! Attribute sanitizer
//!
//! Attribute analysis produces free-form text ("low angle shot", "soft
//! natural light"). The generator only understands a fixed vocabulary, so
//! tracked categories are normalized through a [`MappingTable`]:
//!
//! 1. exact match of the lower-cased, trimmed value
//! 2. substring match in either direction, longest key first
//! 3. otherwise the raw value passes through unchanged
//!
//! Sanitizing never fails. Unknown input is always representable as output.

use brandloc_core::{get_path, get_path_mut, AttributeMap, AttributeValue, LocalizerError, Result, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

/// A tracked attribute category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeCategory {
    CameraAngle,
    LightingCondition,
    StyleMedium,
    FocalLength,
}

impl AttributeCategory {
    pub const ALL: [AttributeCategory; 4] = [
        AttributeCategory::CameraAngle,
        AttributeCategory::LightingCondition,
        AttributeCategory::StyleMedium,
        AttributeCategory::FocalLength,
    ];

    /// Attribute paths (dotted for nested maps) where this category lives
    pub fn paths(self) -> &'static [&'static str] {
        match self {
            AttributeCategory::CameraAngle => {
                &["camera_angle", "photographic_characteristics.camera_angle"]
            }
            AttributeCategory::LightingCondition => &["lighting_type", "lighting.conditions"],
            AttributeCategory::StyleMedium => &["style_medium"],
            AttributeCategory::FocalLength => &[
                "focal_length",
                "lens_focal_length",
                "photographic_characteristics.lens_focal_length",
            ],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AttributeCategory::CameraAngle => "camera_angle",
            AttributeCategory::LightingCondition => "lighting_condition",
            AttributeCategory::StyleMedium => "style_medium",
            AttributeCategory::FocalLength => "focal_length",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for AttributeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const CAMERA_ANGLES: &[(&str, &str)] = &[
    ("eye level", "eye_level"),
    ("eye-level", "eye_level"),
    ("eye_level", "eye_level"),
    ("straight on", "eye_level"),
    ("front view", "eye_level"),
    ("low angle", "low_angle"),
    ("low_angle", "low_angle"),
    ("looking up", "low_angle"),
    ("high angle", "high_angle"),
    ("high_angle", "high_angle"),
    ("looking down", "high_angle"),
    ("bird's eye", "birds_eye"),
    ("birds eye", "birds_eye"),
    ("birds_eye", "birds_eye"),
    ("overhead", "birds_eye"),
    ("top down", "birds_eye"),
    ("worm's eye", "worms_eye"),
    ("worms eye", "worms_eye"),
    ("worms_eye", "worms_eye"),
    ("dutch angle", "dutch_angle"),
    ("dutch_angle", "dutch_angle"),
    ("tilted", "dutch_angle"),
];

const LIGHTING: &[(&str, &str)] = &[
    ("soft natural", "soft_natural"),
    ("soft_natural", "soft_natural"),
    ("natural light", "soft_natural"),
    ("daylight", "soft_natural"),
    ("diffused", "soft_natural"),
    ("studio", "studio_lighting"),
    ("studio_lighting", "studio_lighting"),
    ("softbox", "studio_lighting"),
    ("golden hour", "golden_hour"),
    ("golden_hour", "golden_hour"),
    ("sunset", "golden_hour"),
    ("warm evening", "golden_hour"),
    ("dramatic", "dramatic"),
    ("high contrast", "dramatic"),
    ("chiaroscuro", "dramatic"),
    ("backlit", "backlit"),
    ("rim light", "backlit"),
    ("silhouette", "backlit"),
    ("neon", "neon"),
    ("fluorescent", "neon"),
    ("overcast", "overcast"),
    ("cloudy", "overcast"),
];

const STYLE_MEDIA: &[(&str, &str)] = &[
    ("photograph", "photograph"),
    ("photo", "photograph"),
    ("photorealistic", "photograph"),
    ("product shot", "photograph"),
    ("3d render", "3d_render"),
    ("3d_render", "3d_render"),
    ("cgi", "3d_render"),
    ("rendered", "3d_render"),
    ("illustration", "illustration"),
    ("drawing", "illustration"),
    ("vector", "illustration"),
    ("painting", "painting"),
    ("oil paint", "painting"),
    ("watercolor", "painting"),
];

const FOCAL_LENGTHS: &[(&str, &str)] = &[
    ("macro", "macro"),
    ("ultra wide", "14mm"),
    ("fisheye", "14mm"),
    ("wide", "24mm"),
    ("wide angle", "24mm"),
    ("standard", "50mm"),
    ("normal", "50mm"),
    ("portrait", "85mm"),
    ("telephoto", "200mm"),
    ("zoom", "200mm"),
];

/// Immutable lookup table from free-form text to canonical values
#[derive(Debug, Clone, PartialEq)]
pub struct MappingTable {
    entries: BTreeMap<AttributeCategory, BTreeMap<String, String>>,
}

impl MappingTable {
    /// The built-in vocabulary
    pub fn builtin() -> Self {
        let mut entries = BTreeMap::new();
        for (category, pairs) in [
            (AttributeCategory::CameraAngle, CAMERA_ANGLES),
            (AttributeCategory::LightingCondition, LIGHTING),
            (AttributeCategory::StyleMedium, STYLE_MEDIA),
            (AttributeCategory::FocalLength, FOCAL_LENGTHS),
        ] {
            let map: BTreeMap<String, String> = pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            entries.insert(category, map);
        }
        Self { entries }
    }

    /// Load a table from TOML: one table per category name.
    ///
    /// ```toml
    /// [camera_angle]
    /// "low angle" = "low_angle"
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| {
            LocalizerError::Validation(format!(
                "Failed to parse mapping table {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: BTreeMap<String, BTreeMap<String, String>> = toml::from_str(content)?;
        let mut entries = BTreeMap::new();
        for (name, pairs) in raw {
            let category = AttributeCategory::from_name(&name).ok_or_else(|| {
                LocalizerError::Validation(format!("unknown attribute category '{}'", name))
            })?;
            let normalized: BTreeMap<String, String> = pairs
                .into_iter()
                .map(|(k, v)| (normalize(&k), v))
                .filter(|(k, _)| !k.is_empty())
                .collect();
            entries.insert(category, normalized);
        }
        Ok(Self { entries })
    }

    /// Canonical value for `raw`, if the table knows it
    pub fn lookup(&self, category: AttributeCategory, raw: &str) -> Option<&str> {
        let table = self.entries.get(&category)?;
        let needle = normalize(raw);
        if needle.is_empty() {
            return None;
        }
        if let Some(exact) = table.get(&needle) {
            return Some(exact);
        }

        let mut best: Option<(&String, &String)> = None;
        for (key, value) in table {
            if needle.contains(key.as_str()) || key.contains(needle.as_str()) {
                match best {
                    Some((current, _)) if current.len() >= key.len() => {}
                    _ => best = Some((key, value)),
                }
            }
        }
        best.map(|(_, value)| value.as_str())
    }

    /// Every canonical value defined for a category
    pub fn enumeration_values(&self, category: AttributeCategory) -> BTreeSet<&str> {
        self.entries
            .get(&category)
            .map(|table| table.values().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Every raw key defined for a category
    pub fn keys(&self, category: AttributeCategory) -> impl Iterator<Item = &str> {
        self.entries
            .get(&category)
            .into_iter()
            .flat_map(|table| table.keys().map(String::as_str))
    }
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Normalizes tracked attribute categories to the canonical vocabulary
#[derive(Debug, Clone, Default)]
pub struct AttributeSanitizer {
    table: MappingTable,
}

impl AttributeSanitizer {
    pub fn new(table: MappingTable) -> Self {
        Self { table }
    }

    pub fn builtin() -> Self {
        Self::new(MappingTable::builtin())
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// Canonical form of one raw value in a category
    pub fn sanitize_value(&self, category: AttributeCategory, raw: &str) -> String {
        if raw.trim().is_empty() {
            return raw.to_string();
        }
        if category == AttributeCategory::FocalLength && raw.to_lowercase().contains("mm") {
            return raw.to_string();
        }
        match self.table.lookup(category, raw) {
            Some(canonical) => canonical.to_string(),
            None => raw.to_string(),
        }
    }

    /// Return a copy of `raw` with every tracked text attribute normalized
    pub fn sanitize(&self, raw: &AttributeMap) -> AttributeMap {
        let mut out = raw.clone();
        for category in AttributeCategory::ALL {
            for path in category.paths() {
                if let Some(slot) = get_path_mut(&mut out, path) {
                    if let AttributeValue::Scalar(Scalar::Text(text)) = slot {
                        let canonical = self.sanitize_value(category, text);
                        if canonical != *text {
                            tracing::debug!(
                                category = %category,
                                path = *path,
                                from = %text,
                                to = %canonical,
                                "Normalized attribute"
                            );
                        }
                        *text = canonical;
                    }
                }
            }
        }
        out
    }

    /// Locked subset of a sanitized attribute set, see [`PartitionPolicy`]
    pub fn extract_locked(&self, attrs: &AttributeMap) -> AttributeMap {
        PartitionPolicy::extract_locked(attrs)
    }

    /// Variable subset of a sanitized attribute set, see [`PartitionPolicy`]
    pub fn extract_variable(&self, attrs: &AttributeMap) -> AttributeMap {
        PartitionPolicy::extract_variable(attrs)
    }
}

/// Static locked/variable partition of an analysed attribute set.
///
/// This is a fixed key-name policy, not a per-deployment setting.
/// Photographic, composition and object descriptors are locked (they
/// describe the product and how it is framed). Background, lighting and
/// colour/mood descriptors are variable (they describe the setting).
/// Keys that match neither rule are dropped from both sets.
pub struct PartitionPolicy;

impl PartitionPolicy {
    /// Sub-keys of `photographic_characteristics` that are locked
    pub const LOCKED_PHOTOGRAPHIC: &'static [&'static str] =
        &["camera_angle", "lens_focal_length", "depth_of_field", "focus"];

    /// Top-level keys copied verbatim into the locked set
    pub const LOCKED_KEYS: &'static [&'static str] = &[
        "objects",
        "camera_angle",
        "focal_length",
        "lens_focal_length",
        "aspect_ratio",
        "product_geometry",
        "composition",
        "style_medium",
    ];

    /// Top-level keys copied verbatim into the variable set
    pub const VARIABLE_KEYS: &'static [&'static str] = &[
        "background_setting",
        "background",
        "environment",
        "mood",
        "lighting",
        "lighting_type",
        "color_scheme",
        "mood_atmosphere",
    ];

    /// Sub-keys of `aesthetics` that are variable
    pub const VARIABLE_AESTHETICS: &'static [&'static str] = &["color_scheme", "mood_atmosphere"];

    pub fn extract_locked(attrs: &AttributeMap) -> AttributeMap {
        let mut locked = AttributeMap::new();

        if let Some(photo) = attrs.get("photographic_characteristics") {
            let value = match photo.as_map() {
                Some(map) => AttributeValue::Map(pick(map, Self::LOCKED_PHOTOGRAPHIC)),
                None => photo.clone(),
            };
            locked.insert("photographic_characteristics".to_string(), value);
        }

        if let Some(composition) = get_path(attrs, "aesthetics.composition") {
            locked.insert("composition".to_string(), composition.clone());
        }

        // flat keys last so an explicit top-level `composition` wins
        locked.extend(pick(attrs, Self::LOCKED_KEYS));
        locked
    }

    pub fn extract_variable(attrs: &AttributeMap) -> AttributeMap {
        let mut variable = pick(attrs, Self::VARIABLE_KEYS);

        if let Some(aesthetics) = attrs.get("aesthetics").and_then(AttributeValue::as_map) {
            let moods = pick(aesthetics, Self::VARIABLE_AESTHETICS);
            if !moods.is_empty() {
                variable.insert("aesthetics".to_string(), AttributeValue::Map(moods));
            }
        }
        variable
    }
}

fn pick(map: &AttributeMap, keys: &[&str]) -> AttributeMap {
    keys.iter()
        .filter_map(|k| map.get(*k).map(|v| (k.to_string(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(json: &str) -> AttributeMap {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_exact_and_substring_match() {
        let s = AttributeSanitizer::builtin();
        assert_eq!(s.sanitize_value(AttributeCategory::CameraAngle, " Low Angle "), "low_angle");
        assert_eq!(
            s.sanitize_value(AttributeCategory::CameraAngle, "dramatic low angle shot"),
            "low_angle"
        );
        assert_eq!(
            s.sanitize_value(AttributeCategory::LightingCondition, "soft natural window light"),
            "soft_natural"
        );
        assert_eq!(s.sanitize_value(AttributeCategory::StyleMedium, "photo"), "photograph");
    }

    #[test]
    fn test_longest_key_wins() {
        let s = AttributeSanitizer::builtin();
        // "wide" and "wide angle" both match; the longer one decides
        assert_eq!(s.sanitize_value(AttributeCategory::FocalLength, "wide angle lens"), "24mm");
        assert_eq!(s.sanitize_value(AttributeCategory::FocalLength, "ultra wide"), "14mm");
    }

    #[test]
    fn test_passthrough_cases() {
        let s = AttributeSanitizer::builtin();
        assert_eq!(s.sanitize_value(AttributeCategory::CameraAngle, "xyzzy"), "xyzzy");
        assert_eq!(s.sanitize_value(AttributeCategory::CameraAngle, ""), "");
        assert_eq!(s.sanitize_value(AttributeCategory::CameraAngle, "   "), "   ");
        assert_eq!(s.sanitize_value(AttributeCategory::FocalLength, "85mm"), "85mm");
        assert_eq!(s.sanitize_value(AttributeCategory::FocalLength, "35MM prime"), "35MM prime");
    }

    #[test]
    fn test_sanitize_nested_and_flat_paths() {
        let s = AttributeSanitizer::builtin();
        let raw = attrs(
            r#"{
                "short_description": "A product photo",
                "photographic_characteristics": {
                    "camera_angle": "low angle",
                    "lens_focal_length": "portrait lens",
                    "depth_of_field": "shallow"
                },
                "lighting": {"conditions": "soft natural"},
                "style_medium": "photograph",
                "focal_length": 50
            }"#,
        );
        let out = s.sanitize(&raw);
        assert_eq!(
            get_path(&out, "photographic_characteristics.camera_angle").unwrap().as_str(),
            Some("low_angle")
        );
        assert_eq!(
            get_path(&out, "photographic_characteristics.lens_focal_length").unwrap().as_str(),
            Some("85mm")
        );
        assert_eq!(get_path(&out, "lighting.conditions").unwrap().as_str(), Some("soft_natural"));
        // non-text values are left alone
        assert_eq!(out["focal_length"], AttributeValue::from(50i64));
        // untracked keys are preserved
        assert_eq!(out["short_description"].as_str(), Some("A product photo"));
        // input is untouched
        assert_eq!(
            get_path(&raw, "photographic_characteristics.camera_angle").unwrap().as_str(),
            Some("low angle")
        );
    }

    #[test]
    fn test_partition() {
        let sanitized = attrs(
            r#"{
                "photographic_characteristics": {"camera_angle": "eye_level", "focus": "sharp", "iso": 100},
                "objects": [{"description": "watch"}],
                "aesthetics": {"composition": "centered", "color_scheme": "warm", "mood_atmosphere": "calm"},
                "background_setting": "studio",
                "lighting": {"conditions": "soft_natural"},
                "short_description": "ignored"
            }"#,
        );
        let locked = PartitionPolicy::extract_locked(&sanitized);
        let variable = PartitionPolicy::extract_variable(&sanitized);

        let photo = locked["photographic_characteristics"].as_map().unwrap();
        assert!(photo.contains_key("camera_angle"));
        assert!(!photo.contains_key("iso"));
        assert!(locked.contains_key("objects"));
        assert_eq!(locked["composition"].as_str(), Some("centered"));

        assert_eq!(variable["background_setting"].as_str(), Some("studio"));
        assert!(variable.contains_key("lighting"));
        let aesthetics = variable["aesthetics"].as_map().unwrap();
        assert_eq!(aesthetics.len(), 2);
        assert!(!aesthetics.contains_key("composition"));

        assert!(!locked.contains_key("short_description"));
        assert!(!variable.contains_key("short_description"));
    }

    #[test]
    fn test_load_table_from_toml() {
        let table = MappingTable::from_toml_str(
            r#"
[camera_angle]
" Hero Shot " = "low_angle"

[style_medium]
"claymation" = "3d_render"
"#,
        )
        .unwrap();
        let s = AttributeSanitizer::new(table);
        assert_eq!(s.sanitize_value(AttributeCategory::CameraAngle, "hero shot"), "low_angle");
        assert_eq!(s.sanitize_value(AttributeCategory::StyleMedium, "Claymation"), "3d_render");
        // categories absent from the file pass everything through
        assert_eq!(s.sanitize_value(AttributeCategory::LightingCondition, "neon"), "neon");
    }

    #[test]
    fn test_unknown_category_rejected() {
        assert!(MappingTable::from_toml_str("[shutter_speed]\nfast = \"1/1000\"\n").is_err());
    }

    #[test]
    fn test_enumeration_values() {
        let table = MappingTable::builtin();
        let values = table.enumeration_values(AttributeCategory::CameraAngle);
        assert!(values.contains("eye_level"));
        assert!(values.contains("dutch_angle"));
        assert!(!values.contains("eye level"));
    }
}
