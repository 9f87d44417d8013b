//! Configuration data model
//!
//! `MasterConfig` is the campaign's canonical product description and is
//! immutable once built: its fields are private and there is no accessor
//! that hands out a mutable view of the locked attributes. `RegionRequest`
//! is only produced by the merger, which is what makes lock preservation a
//! structural property instead of a runtime check.

use crate::sanitizer::{AttributeSanitizer, PartitionPolicy};
use brandloc_core::{is_safe_segment, AttributeMap, AttributeValue, LocalizerError, Result, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MASTER_VERSION: &str = "1.0";

/// Named metadata fields of masters and requests. Extra metadata is
/// flattened next to them, so these keys cannot be used as extras.
pub const RESERVED_METADATA_KEYS: &[&str] = &[
    "campaign_id",
    "source_ref",
    "region_id",
    "display_name",
    "region_name",
    "locale",
    "localized_at",
    "cultural_context",
    "forbidden_elements",
    "required_elements",
];

/// Campaign-level metadata carried by a master configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterMetadata {
    pub campaign_id: String,
    /// Where the product description came from (source image, brief, ...)
    #[serde(default)]
    pub source_ref: Option<String>,
    /// Free-form extra metadata
    #[serde(flatten)]
    pub extra: AttributeMap,
}

/// The canonical product description for a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterConfig {
    version: String,
    metadata: MasterMetadata,
    #[serde(default, alias = "locked_parameters")]
    locked_attributes: AttributeMap,
    #[serde(default, alias = "variable_parameters")]
    variable_attributes: AttributeMap,
}

impl MasterConfig {
    /// Create a master configuration
    pub fn new(campaign_id: &str, locked: AttributeMap, variable: AttributeMap) -> Self {
        Self {
            version: MASTER_VERSION.to_string(),
            metadata: MasterMetadata {
                campaign_id: campaign_id.to_string(),
                source_ref: None,
                extra: AttributeMap::new(),
            },
            locked_attributes: locked,
            variable_attributes: variable,
        }
    }

    /// Attach a source reference (only meaningful while building)
    pub fn with_source_ref(mut self, source_ref: &str) -> Self {
        self.metadata.source_ref = Some(source_ref.to_string());
        self
    }

    /// Attach an extra metadata entry (only meaningful while building).
    /// Keys naming a metadata field are rejected.
    pub fn with_metadata(mut self, key: &str, value: AttributeValue) -> Result<Self> {
        check_extra_key(key)?;
        self.metadata.extra.insert(key.to_string(), value);
        Ok(self)
    }

    /// Build a master from raw analysed attributes.
    ///
    /// Raw attributes are sanitized, then split into locked and variable
    /// sets by the static [`PartitionPolicy`].
    pub fn from_attributes(
        campaign_id: &str,
        source_ref: Option<&str>,
        raw: &AttributeMap,
        sanitizer: &AttributeSanitizer,
    ) -> Self {
        let sanitized = sanitizer.sanitize(raw);
        let mut master = Self::new(
            campaign_id,
            PartitionPolicy::extract_locked(&sanitized),
            PartitionPolicy::extract_variable(&sanitized),
        );
        master.metadata.source_ref = source_ref.map(str::to_string);
        master
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &MasterMetadata {
        &self.metadata
    }

    pub fn campaign_id(&self) -> &str {
        &self.metadata.campaign_id
    }

    pub fn locked_attributes(&self) -> &AttributeMap {
        &self.locked_attributes
    }

    pub fn variable_attributes(&self) -> &AttributeMap {
        &self.variable_attributes
    }

    /// Reject malformed masters before any region work starts
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(LocalizerError::Validation(
                "master config has an empty version".to_string(),
            ));
        }
        if !is_safe_segment(&self.metadata.campaign_id) {
            return Err(LocalizerError::Validation(format!(
                "invalid campaign id '{}' (use letters, digits, '_', '-', '.')",
                self.metadata.campaign_id
            )));
        }
        for key in self.metadata.extra.keys() {
            check_extra_key(key)?;
        }
        Ok(())
    }

    /// Load a master configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let master: MasterConfig = serde_json::from_str(&content).map_err(|e| {
            LocalizerError::Validation(format!(
                "Failed to parse master config {}: {}",
                path.display(),
                e
            ))
        })?;
        master.validate()?;
        Ok(master)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Static per-market reference data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionProfile {
    pub region_id: String,
    pub display_name: String,
    pub locale: String,
    /// Overrides applied to variable attributes (possibly nested)
    #[serde(default, alias = "environment_overrides")]
    pub attribute_overrides: AttributeMap,
    /// Cultural notes passed through to the request for reviewers
    #[serde(default)]
    pub cultural_context: AttributeMap,
}

impl RegionProfile {
    pub fn new(region_id: &str, display_name: &str, locale: &str) -> Self {
        Self {
            region_id: region_id.to_string(),
            display_name: display_name.to_string(),
            locale: locale.to_string(),
            attribute_overrides: AttributeMap::new(),
            cultural_context: AttributeMap::new(),
        }
    }

    /// Add an override (builder style)
    pub fn with_override(mut self, key: &str, value: AttributeValue) -> Self {
        self.attribute_overrides.insert(key.to_string(), value);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !is_safe_segment(&self.region_id) {
            return Err(LocalizerError::Validation(format!(
                "invalid region id '{}'",
                self.region_id
            )));
        }
        if self.locale.trim().is_empty() {
            return Err(LocalizerError::Validation(format!(
                "region '{}' has no locale",
                self.region_id
            )));
        }
        Ok(())
    }
}

fn check_extra_key(key: &str) -> Result<()> {
    if RESERVED_METADATA_KEYS.contains(&key) {
        return Err(LocalizerError::Validation(format!(
            "metadata key '{}' is reserved",
            key
        )));
    }
    Ok(())
}

/// Metadata of a region request: the master's metadata plus region stamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub campaign_id: String,
    #[serde(default)]
    pub source_ref: Option<String>,
    pub region_id: String,
    #[serde(alias = "region_name")]
    pub display_name: String,
    pub locale: String,
    pub localized_at: Timestamp,
    #[serde(default)]
    pub cultural_context: AttributeMap,
    /// Advisory: elements a reviewer should make sure are absent
    #[serde(default)]
    pub forbidden_elements: Vec<String>,
    /// Advisory: elements a reviewer should make sure are present
    #[serde(default)]
    pub required_elements: Vec<String>,
    #[serde(flatten)]
    pub extra: AttributeMap,
}

/// A region-specific generation request, produced by `ConfigMerger`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRequest {
    version: String,
    metadata: RequestMetadata,
    locked_attributes: AttributeMap,
    variable_attributes: AttributeMap,
    #[serde(default)]
    negative_prompts: Vec<String>,
}

impl RegionRequest {
    pub(crate) fn from_parts(
        version: String,
        metadata: RequestMetadata,
        locked_attributes: AttributeMap,
        variable_attributes: AttributeMap,
        negative_prompts: Vec<String>,
    ) -> Self {
        Self {
            version,
            metadata,
            locked_attributes,
            variable_attributes,
            negative_prompts,
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn region_id(&self) -> &str {
        &self.metadata.region_id
    }

    pub fn locale(&self) -> &str {
        &self.metadata.locale
    }

    pub fn campaign_id(&self) -> &str {
        &self.metadata.campaign_id
    }

    pub fn locked_attributes(&self) -> &AttributeMap {
        &self.locked_attributes
    }

    pub fn variable_attributes(&self) -> &AttributeMap {
        &self.variable_attributes
    }

    pub fn negative_prompts(&self) -> &[String] {
        &self.negative_prompts
    }

    /// The structured prompt document sent to the generation collaborator.
    ///
    /// Variable attributes are laid down first and locked attributes on top,
    /// so a locked key always wins if a region override reused its name.
    pub fn prompt_payload(&self) -> serde_json::Value {
        let mut prompt = serde_json::Map::new();
        for (key, value) in &self.variable_attributes {
            prompt.insert(key.clone(), value.to_json());
        }
        for (key, value) in &self.locked_attributes {
            prompt.insert(key.clone(), value.to_json());
        }
        if !self.negative_prompts.is_empty() {
            prompt.insert(
                "negative_prompt".to_string(),
                serde_json::Value::String(self.negative_prompts.join(", ")),
            );
        }
        serde_json::Value::Object(prompt)
    }

    /// Save as pretty JSON (e.g. `regions/region_<id>.json`)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load a previously saved request
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
