//! Mock provider for testing
//!
//! Renders a deterministic placeholder image without any network calls: the
//! background colour comes from the variable attributes and seed, and a
//! centred product block comes from the locked attributes. Requests that
//! share a master therefore share an identical product block.

use crate::provider::*;
use brandloc_core::{
    canonical_json, AttributeMap, AttributeValue, ContentHash, LocalizerError, Result,
};
use brandloc_localize::RegionRequest;
use image::{DynamicImage, Rgb, RgbImage};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

const DEFAULT_BASE_SIZE: u32 = 256;

/// A mock provider that renders placeholder images locally
#[derive(Debug, Clone)]
pub struct MockProvider {
    base_size: u32,
    failing: HashSet<String>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            base_size: DEFAULT_BASE_SIZE,
            failing: HashSet::new(),
        }
    }

    /// Length of the longer image side
    pub fn with_base_size(mut self, base_size: u32) -> Self {
        self.base_size = base_size.max(1);
        self
    }

    /// Make `generate` fail for these region ids
    pub fn failing_for<I, S>(mut self, region_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(region_ids.into_iter().map(Into::into));
        self
    }

    fn dimensions(&self, params: &GenerationParams) -> (u32, u32) {
        let aspect = params.aspect().unwrap_or(1.0);
        let base = self.base_size as f64;
        let (w, h) = if aspect >= 1.0 {
            (base, base / aspect)
        } else {
            (base * aspect, base)
        };
        ((w.round() as u32).max(1), (h.round() as u32).max(1))
    }
}

impl GenerationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn health_check(&self) -> Result<ProviderStatus> {
        Ok(ProviderStatus::Available)
    }

    fn analyze(&self, source: &AnalysisSource) -> Result<AttributeMap> {
        let mut attrs = placeholder_attributes();
        match source {
            AnalysisSource::Image(path) => {
                let (w, h) = image::image_dimensions(path)?;
                attrs.insert(
                    "aspect_ratio".to_string(),
                    AttributeValue::text(ratio_label(w, h)),
                );
                attrs.insert(
                    "short_description".to_string(),
                    AttributeValue::text(format!("Product photo from {}", file_label(path))),
                );
            }
            AnalysisSource::Text(brief) => {
                attrs.insert("short_description".to_string(), AttributeValue::text(brief.trim()));
            }
        }
        Ok(attrs)
    }

    fn generate(
        &self,
        request: &RegionRequest,
        params: &GenerationParams,
    ) -> Result<GeneratedAsset> {
        let start = std::time::Instant::now();

        if self.failing.contains(request.region_id()) {
            return Err(LocalizerError::ExternalService(format!(
                "mock provider configured to fail for region '{}'",
                request.region_id()
            )));
        }

        let background = color_of(request.variable_attributes(), params.seed);
        let product = color_of(request.locked_attributes(), 0);
        let (width, height) = self.dimensions(params);

        let (x0, x1) = (width / 4, width - width / 4);
        let (y0, y1) = (height / 4, height - height / 4);
        let img = RgbImage::from_fn(width, height, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                product
            } else {
                background
            }
        });

        let mut metadata = BTreeMap::new();
        metadata.insert("seed".to_string(), params.seed.to_string());
        metadata.insert("steps".to_string(), params.steps.to_string());

        Ok(GeneratedAsset {
            image: DynamicImage::ImageRgb8(img),
            prompt_used: request.prompt_payload(),
            provider: "mock".to_string(),
            seed: params.seed,
            duration_secs: start.elapsed().as_secs_f64(),
            metadata,
        })
    }
}

/// Free-form attributes in the shape a vision model would return
fn placeholder_attributes() -> AttributeMap {
    [
        ("camera_angle", AttributeValue::text("eye level")),
        ("focal_length", AttributeValue::text("standard lens")),
        ("aspect_ratio", AttributeValue::text("1:1")),
        (
            "product_geometry",
            AttributeValue::text("centered, upright, full product visible"),
        ),
        ("background", AttributeValue::text("neutral")),
        ("lighting_type", AttributeValue::text("soft natural light")),
        ("environment", AttributeValue::text("studio")),
        ("mood", AttributeValue::text("professional")),
        ("style_medium", AttributeValue::text("photo")),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn color_of(attrs: &AttributeMap, salt: u64) -> Rgb<u8> {
    let json = AttributeValue::Map(attrs.clone()).to_json();
    let hash = ContentHash::from_text(&format!("{}:{}", canonical_json(&json), salt));
    let bytes = hash.as_bytes();
    Rgb([bytes[0], bytes[1], bytes[2]])
}

fn ratio_label(w: u32, h: u32) -> String {
    fn gcd(a: u32, b: u32) -> u32 {
        if b == 0 {
            a
        } else {
            gcd(b, a % b)
        }
    }
    let d = gcd(w, h).max(1);
    format!("{}:{}", w / d, h / d)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
