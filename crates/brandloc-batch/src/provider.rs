//! Generation provider trait and request/result types

use brandloc_core::{AttributeMap, Result};
use brandloc_localize::RegionRequest;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Input to attribute analysis
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisSource {
    /// A product image on disk
    Image(PathBuf),
    /// A free-text product brief
    Text(String),
}

/// Sampling parameters for one generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub seed: u64,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_guidance")]
    pub guidance: f64,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
}

fn default_steps() -> u32 {
    50
}

fn default_guidance() -> f64 {
    5.0
}

fn default_aspect_ratio() -> String {
    "1:1".to_string()
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            seed: 42,
            steps: default_steps(),
            guidance: default_guidance(),
            aspect_ratio: default_aspect_ratio(),
        }
    }
}

impl GenerationParams {
    /// Width/height ratio parsed from `"W:H"`, if well formed
    pub fn aspect(&self) -> Option<f64> {
        let (w, h) = self.aspect_ratio.split_once(':')?;
        let w: f64 = w.trim().parse().ok()?;
        let h: f64 = h.trim().parse().ok()?;
        if w > 0.0 && h > 0.0 {
            Some(w / h)
        } else {
            None
        }
    }
}

/// A generated image plus the context it was produced in
#[derive(Debug, Clone)]
pub struct GeneratedAsset {
    pub image: DynamicImage,
    /// The structured prompt that was sent to the provider
    pub prompt_used: serde_json::Value,
    /// Provider name
    pub provider: String,
    pub seed: u64,
    /// Generation time in seconds
    pub duration_secs: f64,
    /// Any provider-specific metadata
    pub metadata: BTreeMap<String, String>,
}

/// Status returned by a provider health check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Available,
    Unavailable(String),
    NoApiKey,
}

/// Trait implemented by each generation provider (Bria, Mock)
pub trait GenerationProvider: Send + Sync {
    /// Provider name (e.g. "bria", "mock")
    fn name(&self) -> &str;

    /// Check if the provider is available (API key set, service reachable)
    fn health_check(&self) -> Result<ProviderStatus>;

    /// Infer raw, unsanitized attributes from an image or a text brief
    fn analyze(&self, source: &AnalysisSource) -> Result<AttributeMap>;

    /// Generate an image for a region request (blocks until complete)
    fn generate(&self, request: &RegionRequest, params: &GenerationParams)
        -> Result<GeneratedAsset>;
}
