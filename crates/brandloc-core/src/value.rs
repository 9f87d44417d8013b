//! Attribute values carried by master configurations and region profiles
//!
//! Values are an explicit tagged variant rather than loosely typed JSON, so
//! the override merge can be written as a total function over variant pairs.
//! They serialize untagged, i.e. as plain JSON/TOML values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered attribute map. Ordering keeps serialization deterministic.
pub type AttributeMap = BTreeMap<String, AttributeValue>;

/// A leaf attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// An attribute value: a scalar, a list, or a nested map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Scalar(Scalar),
    List(Vec<AttributeValue>),
    Map(AttributeMap),
}

impl AttributeValue {
    /// Build a text value
    pub fn text(s: impl Into<String>) -> Self {
        AttributeValue::Scalar(Scalar::Text(s.into()))
    }

    /// Build a map value from key/value pairs
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, AttributeValue)>,
    {
        AttributeValue::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The text content, if this is a text scalar
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::Scalar(Scalar::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&AttributeMap> {
        match self {
            AttributeValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut AttributeMap> {
        match self {
            AttributeValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, AttributeValue::Map(_))
    }

    /// Short name of the variant, for diagnostics
    pub fn shape(&self) -> &'static str {
        match self {
            AttributeValue::Scalar(Scalar::Null) => "null",
            AttributeValue::Scalar(Scalar::Bool(_)) => "bool",
            AttributeValue::Scalar(Scalar::Int(_)) => "int",
            AttributeValue::Scalar(Scalar::Float(_)) => "float",
            AttributeValue::Scalar(Scalar::Text(_)) => "text",
            AttributeValue::List(_) => "list",
            AttributeValue::Map(_) => "map",
        }
    }

    /// Apply a region override to this value.
    ///
    /// Map onto map merges one level deep: override keys replace, other
    /// keys are retained. Every other pairing replaces the value outright.
    pub fn apply_override(&mut self, over: AttributeValue) {
        match (self, over) {
            (AttributeValue::Map(base), AttributeValue::Map(patch)) => base.extend(patch),
            // map/scalar, map/list, scalar/any, list/any
            (slot, over) => *slot = over,
        }
    }

    /// Structural equality that compares floats by bit pattern.
    ///
    /// Unlike `==`, a NaN is identical to itself, so a value always
    /// matches its own clone.
    pub fn identical(&self, other: &AttributeValue) -> bool {
        match (self, other) {
            (AttributeValue::Scalar(Scalar::Float(a)), AttributeValue::Scalar(Scalar::Float(b))) => {
                a.to_bits() == b.to_bits()
            }
            (AttributeValue::Scalar(a), AttributeValue::Scalar(b)) => a == b,
            (AttributeValue::List(a), AttributeValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.identical(y))
            }
            (AttributeValue::Map(a), AttributeValue::Map(b)) => maps_identical(a, b),
            _ => false,
        }
    }

    /// Convert to a `serde_json::Value`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttributeValue::Scalar(Scalar::Null) => serde_json::Value::Null,
            AttributeValue::Scalar(Scalar::Bool(b)) => serde_json::Value::Bool(*b),
            AttributeValue::Scalar(Scalar::Int(i)) => serde_json::Value::from(*i),
            AttributeValue::Scalar(Scalar::Float(f)) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            AttributeValue::Scalar(Scalar::Text(s)) => serde_json::Value::String(s.clone()),
            AttributeValue::List(items) => {
                serde_json::Value::Array(items.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::Map(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// [`AttributeValue::identical`] lifted to whole maps
pub fn maps_identical(a: &AttributeMap, b: &AttributeMap) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|((ka, va), (kb, vb))| ka == kb && va.identical(vb))
}

/// Look up a dotted path (`"lighting.conditions"`) in an attribute map
pub fn get_path<'a>(map: &'a AttributeMap, path: &str) -> Option<&'a AttributeValue> {
    let mut parts = path.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = current.as_map()?.get(part)?;
    }
    Some(current)
}

/// Mutable variant of [`get_path`]
pub fn get_path_mut<'a>(map: &'a mut AttributeMap, path: &str) -> Option<&'a mut AttributeValue> {
    let mut parts = path.split('.');
    let mut current = map.get_mut(parts.next()?)?;
    for part in parts {
        current = current.as_map_mut()?.get_mut(part)?;
    }
    Some(current)
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::text(s)
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::text(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Scalar(Scalar::Int(i))
    }
}

impl From<f64> for AttributeValue {
    fn from(f: f64) -> Self {
        AttributeValue::Scalar(Scalar::Float(f))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Scalar(Scalar::Bool(b))
    }
}

impl From<AttributeMap> for AttributeValue {
    fn from(m: AttributeMap) -> Self {
        AttributeValue::Map(m)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Scalar(Scalar::Text(s)) => write!(f, "{}", s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json_roundtrip() {
        let json = r#"{"angle":"eye_level","focal":50,"ratio":1.5,"hdr":true,"pos":[0.5,0.5],"geo":{"scale":1.0},"none":null}"#;
        let map: AttributeMap = serde_json::from_str(json).unwrap();
        assert_eq!(map["angle"], AttributeValue::text("eye_level"));
        assert_eq!(map["focal"], AttributeValue::from(50i64));
        assert_eq!(map["ratio"], AttributeValue::from(1.5));
        assert_eq!(map["hdr"], AttributeValue::from(true));
        assert!(matches!(map["pos"], AttributeValue::List(ref v) if v.len() == 2));
        assert!(map["geo"].is_map());
        assert_eq!(map["none"], AttributeValue::Scalar(Scalar::Null));

        let back = serde_json::to_string(&map).unwrap();
        let again: AttributeMap = serde_json::from_str(&back).unwrap();
        assert_eq!(map, again);
    }

    #[test]
    fn test_toml_values_parse() {
        let map: AttributeMap = toml::from_str(
            r#"
background = "neutral"
[lighting]
conditions = "soft natural"
"#,
        )
        .unwrap();
        assert_eq!(
            get_path(&map, "lighting.conditions").and_then(|v| v.as_str()),
            Some("soft natural")
        );
    }

    #[test]
    fn test_override_map_onto_map_is_one_level() {
        let mut base = AttributeValue::map([
            ("conditions", AttributeValue::text("soft")),
            ("shadows", AttributeValue::text("subtle")),
            (
                "nested",
                AttributeValue::map([("keep", AttributeValue::text("me"))]),
            ),
        ]);
        base.apply_override(AttributeValue::map([
            ("conditions", AttributeValue::text("neon")),
            (
                "nested",
                AttributeValue::map([("other", AttributeValue::text("x"))]),
            ),
        ]));

        let m = base.as_map().unwrap();
        assert_eq!(m["conditions"].as_str(), Some("neon"));
        assert_eq!(m["shadows"].as_str(), Some("subtle"));
        // second level is replaced, not merged
        let nested = m["nested"].as_map().unwrap();
        assert!(nested.get("keep").is_none());
        assert_eq!(nested["other"].as_str(), Some("x"));
    }

    #[test]
    fn test_override_shape_change_replaces() {
        let mut base = AttributeValue::map([("a", AttributeValue::from(1i64))]);
        base.apply_override(AttributeValue::text("flat"));
        assert_eq!(base, AttributeValue::text("flat"));

        let mut scalar = AttributeValue::text("neutral");
        scalar.apply_override(AttributeValue::map([("x", AttributeValue::from(true))]));
        assert!(scalar.is_map());
    }

    #[test]
    fn test_identical_treats_nan_as_itself() {
        let nan = AttributeValue::map([("scale", AttributeValue::from(f64::NAN))]);
        assert_ne!(nan, nan.clone());
        assert!(nan.identical(&nan.clone()));
        assert!(!AttributeValue::from(0.0).identical(&AttributeValue::from(-0.0)));
        assert!(!AttributeValue::from(f64::NAN).identical(&AttributeValue::Scalar(Scalar::Null)));
        assert!(!AttributeValue::from(1i64).identical(&AttributeValue::from(1.0)));
    }

    #[test]
    fn test_get_path_mut() {
        let mut map: AttributeMap = serde_json::from_str(r#"{"a":{"b":"c"}}"#).unwrap();
        *get_path_mut(&mut map, "a.b").unwrap() = AttributeValue::text("d");
        assert_eq!(get_path(&map, "a.b").unwrap().as_str(), Some("d"));
        assert!(get_path(&map, "a.b.c").is_none());
        assert!(get_path(&map, "missing").is_none());
    }
}
