//! Region catalog
//!
//! Market profiles are plain data. The built-in set is embedded at compile
//! time; deployments can load their own from a TOML file with the same
//! `[[regions]]` layout.

use crate::model::RegionProfile;
use brandloc_core::{LocalizerError, Result};
use serde::Deserialize;
use std::path::Path;

const BUILTIN_REGIONS: &str = include_str!("../regions/builtin.regions.toml");

#[derive(Debug, Deserialize)]
struct RegionsFile {
    #[serde(default)]
    regions: Vec<RegionProfile>,
}

/// An ordered, id-unique collection of region profiles
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    regions: Vec<RegionProfile>,
}

impl RegionCatalog {
    /// The profiles shipped with the crate
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_REGIONS)
    }

    /// Load profiles from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| {
            LocalizerError::Validation(format!(
                "Failed to load regions {}: {}",
                path.display(),
                e
            ))
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RegionsFile = toml::from_str(content)?;
        Self::from_profiles(file.regions)
    }

    /// Build a catalog, rejecting invalid profiles and duplicate ids
    pub fn from_profiles(regions: Vec<RegionProfile>) -> Result<Self> {
        let mut catalog = Self::default();
        for region in regions {
            region.validate()?;
            if catalog.contains(&region.region_id) {
                return Err(LocalizerError::Validation(format!(
                    "duplicate region id '{}'",
                    region.region_id
                )));
            }
            catalog.regions.push(region);
        }
        Ok(catalog)
    }

    pub fn contains(&self, region_id: &str) -> bool {
        self.regions.iter().any(|r| r.region_id == region_id)
    }

    pub fn get(&self, region_id: &str) -> Result<&RegionProfile> {
        self.regions
            .iter()
            .find(|r| r.region_id == region_id)
            .ok_or_else(|| {
                LocalizerError::Validation(format!(
                    "Region '{}' not found. Available regions: {}",
                    region_id,
                    self.ids().join(", ")
                ))
            })
    }

    /// Profiles for `ids`, in the requested order
    pub fn select<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<RegionProfile>> {
        ids.iter()
            .map(|id| self.get(id.as_ref()).cloned())
            .collect()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.region_id.as_str()).collect()
    }

    pub fn all(&self) -> &[RegionProfile] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
