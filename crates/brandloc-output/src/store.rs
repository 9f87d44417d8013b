//! Output persistence
//!
//! `OutputStore::persist` writes every artifact for one generated asset
//! under `<root>/<region_id>/`:
//!
//! - `<region>_<seed>_<stamp>.tif` - 16-bit RGB master
//! - `<region>_<seed>_<stamp>.png` - 8-bit RGB preview
//! - `<region>_<seed>_<stamp>.heatmap.png` - consistency heatmap (with a reference)
//! - `<region>_<seed>_<stamp>.json` - audit record
//!
//! `<stamp>` has microsecond resolution and is bumped past any stem already
//! on disk, so persisting the same region and seed twice never overwrites.
//!
//! Each write is retried independently. A write that still fails is
//! recorded as `None` in the `OutputRecord`; persist itself never fails.

use crate::audit::{AuditFiles, AuditRecord, ConsistencyCheck, GenerationInfo, ProvenanceSection};
use crate::authenticity::{attest, AuthenticityTool, ProvenanceStatus};
use crate::consistency::{consistency_score, render_heatmap};
use crate::provenance::ProvenanceManifest;
use crate::retry::{save_with_retry, RetryPolicy};
use brandloc_batch::{GeneratedAsset, LocalizerConfig};
use brandloc_core::{now_utc, precise_file_stamp, Result, Timestamp};
use brandloc_localize::RegionRequest;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Knobs for persistence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputOptions {
    pub retry: RetryPolicy,
    /// Scores above this flag the asset for review
    pub consistency_threshold: f64,
    /// Longer side of the preview
    pub preview_max_dimension: u32,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            consistency_threshold: 0.05,
            preview_max_dimension: 1024,
        }
    }
}

impl OutputOptions {
    pub fn from_config(config: &LocalizerConfig) -> Self {
        Self {
            retry: RetryPolicy::new(
                config.output.max_attempts,
                Duration::from_millis(config.output.retry_base_ms),
            ),
            consistency_threshold: config.output.consistency_threshold,
            preview_max_dimension: config.output.preview_max_dimension.max(1),
        }
    }
}

/// What was written for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub region_id: String,
    pub seed: u64,
    pub timestamp: Timestamp,
    pub primary_path: Option<PathBuf>,
    pub preview_path: Option<PathBuf>,
    pub heatmap_path: Option<PathBuf>,
    pub audit_path: Option<PathBuf>,
    pub consistency_score: Option<f64>,
    pub flagged_for_review: bool,
    pub provenance_status: ProvenanceStatus,
}

impl OutputRecord {
    /// True when every artifact that was attempted got written
    pub fn all_saved(&self) -> bool {
        self.primary_path.is_some()
            && self.preview_path.is_some()
            && self.audit_path.is_some()
            && (self.consistency_score.is_none() || self.heatmap_path.is_some())
    }
}

/// File counts under the output root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSummary {
    pub regions: usize,
    pub primary: usize,
    pub preview: usize,
    pub heatmap: usize,
    pub audit: usize,
}

/// Writes generated assets and their audit trail to disk
#[derive(Clone)]
pub struct OutputStore {
    root: PathBuf,
    options: OutputOptions,
    authenticity: Option<Arc<dyn AuthenticityTool>>,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>, options: OutputOptions) -> Self {
        Self {
            root: root.into(),
            options,
            authenticity: None,
        }
    }

    pub fn from_config(config: &LocalizerConfig) -> Self {
        Self::new(&config.output.dir, OutputOptions::from_config(config))
    }

    /// Sign primary artifacts with this tool
    pub fn with_authenticity(mut self, tool: Arc<dyn AuthenticityTool>) -> Self {
        self.authenticity = Some(tool);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &OutputOptions {
        &self.options
    }

    /// Persist one asset. Never fails: unsaved artifacts are `None`.
    pub fn persist(
        &self,
        asset: &GeneratedAsset,
        request: &RegionRequest,
        seed: u64,
        reference: Option<&DynamicImage>,
        manifest: Option<&ProvenanceManifest>,
    ) -> OutputRecord {
        let region_id = request.region_id();
        let dir = self.root.join(region_id);
        let (stem, timestamp) = unused_stem(&dir, region_id, seed, now_utc());
        let policy = &self.options.retry;

        let primary = dir.join(format!("{}.tif", stem));
        let primary_path = save_with_retry("primary", policy, || {
            write_primary(&asset.image, &primary)
        })
        .then_some(primary);

        let preview = dir.join(format!("{}.png", stem));
        let max_dim = self.options.preview_max_dimension;
        let preview_path = save_with_retry("preview", policy, || {
            write_preview(&asset.image, &preview, max_dim)
        })
        .then_some(preview);

        let threshold = self.options.consistency_threshold;
        let mut heatmap_path = None;
        let consistency = match reference {
            None => ConsistencyCheck::NotComputed {
                reason: "no reference image supplied".to_string(),
            },
            Some(reference) => match consistency_score(&asset.image, reference) {
                Ok(report) => {
                    let heatmap = dir.join(format!("{}.heatmap.png", stem));
                    let rendered = render_heatmap(&report.diff_map);
                    heatmap_path = save_with_retry("heatmap", policy, || {
                        std::fs::create_dir_all(&dir)?;
                        rendered.save_with_format(&heatmap, ImageFormat::Png)?;
                        Ok(())
                    })
                    .then_some(heatmap);
                    ConsistencyCheck::from_score(report.score, threshold)
                }
                Err(e) => {
                    tracing::warn!(region = region_id, error = %e, "Consistency scoring skipped");
                    ConsistencyCheck::NotComputed {
                        reason: e.to_string(),
                    }
                }
            },
        };
        if consistency.is_flagged() {
            tracing::warn!(
                region = region_id,
                score = consistency.score().unwrap_or_default(),
                threshold,
                "Asset flagged for review"
            );
        }

        let provenance_status = match &primary_path {
            Some(path) => attest(self.authenticity.as_deref(), path, manifest),
            None if self.authenticity.is_some() && manifest.is_some() => ProvenanceStatus::Failed {
                reason: "primary artifact was not saved".to_string(),
            },
            None => ProvenanceStatus::NotAvailable,
        };

        let meta = request.metadata();
        let audit = AuditRecord {
            generation: GenerationInfo {
                campaign_id: meta.campaign_id.clone(),
                region_id: region_id.to_string(),
                region_name: meta.display_name.clone(),
                locale: meta.locale.clone(),
                seed,
                timestamp,
                provider: asset.provider.clone(),
                duration_secs: asset.duration_secs,
            },
            files: AuditFiles {
                primary: file_name(primary_path.as_deref()),
                preview: file_name(preview_path.as_deref()),
                heatmap: file_name(heatmap_path.as_deref()),
            },
            flagged_for_review: consistency.is_flagged(),
            consistency: consistency.clone(),
            locked_attributes: request.locked_attributes().clone(),
            variable_attributes: request.variable_attributes().clone(),
            negative_prompts: request.negative_prompts().to_vec(),
            cultural_context: meta.cultural_context.clone(),
            forbidden_elements: meta.forbidden_elements.clone(),
            required_elements: meta.required_elements.clone(),
            prompt: asset.prompt_used.clone(),
            provenance: ProvenanceSection {
                status: provenance_status.clone(),
                manifest: manifest.cloned(),
            },
        };
        let audit_file = dir.join(format!("{}.json", stem));
        let audit_path = save_with_retry("audit", policy, || {
            std::fs::create_dir_all(&dir)?;
            std::fs::write(&audit_file, audit.to_json()?)?;
            Ok(())
        })
        .then_some(audit_file);

        let record = OutputRecord {
            region_id: region_id.to_string(),
            seed,
            timestamp,
            primary_path,
            preview_path,
            heatmap_path,
            audit_path,
            consistency_score: consistency.score(),
            flagged_for_review: consistency.is_flagged(),
            provenance_status,
        };
        tracing::info!(
            region = region_id,
            seed,
            all_saved = record.all_saved(),
            provenance = %record.provenance_status,
            "Outputs persisted"
        );
        record
    }

    /// Count persisted artifacts, optionally for a single region
    pub fn summary(&self, region_id: Option<&str>) -> Result<OutputSummary> {
        let mut summary = OutputSummary::default();
        if !self.root.exists() {
            return Ok(summary);
        }
        let dirs: Vec<PathBuf> = match region_id {
            Some(id) => {
                let dir = self.root.join(id);
                if dir.is_dir() {
                    vec![dir]
                } else {
                    Vec::new()
                }
            }
            None => std::fs::read_dir(&self.root)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_dir())
                .collect(),
        };

        for dir in dirs {
            summary.regions += 1;
            for entry in std::fs::read_dir(&dir)? {
                let name = entry?.file_name().to_string_lossy().to_string();
                if name.ends_with(".heatmap.png") {
                    summary.heatmap += 1;
                } else if name.ends_with(".png") {
                    summary.preview += 1;
                } else if name.ends_with(".tif") || name.ends_with(".tiff") {
                    summary.primary += 1;
                } else if name.ends_with(".json") {
                    summary.audit += 1;
                }
            }
        }
        Ok(summary)
    }
}

fn write_primary(image: &DynamicImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    DynamicImage::ImageRgb16(image.to_rgb16()).save_with_format(path, ImageFormat::Tiff)?;
    Ok(())
}

fn write_preview(image: &DynamicImage, path: &Path, max_dimension: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let (w, h) = image.dimensions();
    let preview = if w.max(h) > max_dimension {
        image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        image.clone()
    };
    DynamicImage::ImageRgb8(preview.to_rgb8()).save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

fn file_name(path: Option<&Path>) -> Option<String> {
    path.and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
}

fn unused_stem(dir: &Path, region_id: &str, seed: u64, mut timestamp: Timestamp) -> (String, Timestamp) {
    loop {
        let stem = format!("{}_{}_{}", region_id, seed, precise_file_stamp(&timestamp));
        let taken = ["tif", "png", "json"]
            .iter()
            .any(|ext| dir.join(format!("{}.{}", stem, ext)).exists());
        if !taken {
            return (stem, timestamp);
        }
        timestamp += chrono::Duration::microseconds(1);
    }
}
