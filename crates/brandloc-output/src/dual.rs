//! Dual-output verification
//!
//! Checks that a primary/preview pair describes the same picture: the
//! preview is never larger, the aspect ratios agree, and each file is the
//! container type its role requires.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Largest aspect ratio difference still considered a match
pub const ASPECT_TOLERANCE: f64 = 0.01;

/// A single check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

/// Status of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Fail,
}

/// Details of a dual-output verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualOutputReport {
    pub primary: String,
    pub preview: String,
    pub primary_dimensions: Option<(u32, u32)>,
    pub preview_dimensions: Option<(u32, u32)>,
    pub aspect_difference: Option<f64>,
    pub checks: Vec<OutputCheck>,
    pub passed: bool,
}

impl DualOutputReport {
    pub fn failures(&self) -> impl Iterator<Item = &OutputCheck> {
        self.checks.iter().filter(|c| c.status == CheckStatus::Fail)
    }
}

/// Verify a primary (TIFF) and preview (PNG) pair
pub fn verify_dual_output_consistency(primary: &Path, preview: &Path) -> (bool, DualOutputReport) {
    let mut checks = Vec::new();

    checks.push(container_check("primary format", primary, ImageFormat::Tiff));
    checks.push(container_check("preview format", preview, ImageFormat::Png));

    let primary_dimensions = dimensions_check("primary dimensions", primary, &mut checks);
    let preview_dimensions = dimensions_check("preview dimensions", preview, &mut checks);

    let mut aspect_difference = None;
    if let (Some((pw, ph)), Some((vw, vh))) = (primary_dimensions, preview_dimensions) {
        let fits = vw <= pw && vh <= ph;
        checks.push(OutputCheck {
            name: "preview size".to_string(),
            status: if fits { CheckStatus::Pass } else { CheckStatus::Fail },
            detail: format!("{}x{} within {}x{}", vw, vh, pw, ph),
        });

        let diff = (pw as f64 / ph as f64 - vw as f64 / vh as f64).abs();
        aspect_difference = Some(diff);
        checks.push(OutputCheck {
            name: "aspect ratio".to_string(),
            status: if diff < ASPECT_TOLERANCE {
                CheckStatus::Pass
            } else {
                CheckStatus::Fail
            },
            detail: format!("difference {:.4}", diff),
        });
    }

    let passed = checks.iter().all(|c| c.status == CheckStatus::Pass);
    if !passed {
        tracing::warn!(
            primary = %primary.display(),
            preview = %preview.display(),
            "Dual output verification failed"
        );
    }

    let report = DualOutputReport {
        primary: primary.display().to_string(),
        preview: preview.display().to_string(),
        primary_dimensions,
        preview_dimensions,
        aspect_difference,
        checks,
        passed,
    };
    (passed, report)
}

fn container_check(name: &str, path: &Path, expected: ImageFormat) -> OutputCheck {
    let by_extension = ImageFormat::from_path(path).ok();
    let by_content = sniff_format(path);
    let status = if by_extension == Some(expected) && by_content == Some(expected) {
        CheckStatus::Pass
    } else {
        CheckStatus::Fail
    };
    OutputCheck {
        name: name.to_string(),
        status,
        detail: format!(
            "expected {:?}, extension {:?}, content {:?}",
            expected, by_extension, by_content
        ),
    }
}

fn sniff_format(path: &Path) -> Option<ImageFormat> {
    let mut header = [0u8; 16];
    let mut file = std::fs::File::open(path).ok()?;
    let n = file.read(&mut header).ok()?;
    image::guess_format(&header[..n]).ok()
}

fn dimensions_check(name: &str, path: &Path, checks: &mut Vec<OutputCheck>) -> Option<(u32, u32)> {
    match image::image_dimensions(path) {
        Ok((w, h)) if w > 0 && h > 0 => {
            checks.push(OutputCheck {
                name: name.to_string(),
                status: CheckStatus::Pass,
                detail: format!("{}x{}", w, h),
            });
            Some((w, h))
        }
        Ok((w, h)) => {
            checks.push(OutputCheck {
                name: name.to_string(),
                status: CheckStatus::Fail,
                detail: format!("degenerate size {}x{}", w, h),
            });
            None
        }
        Err(e) => {
            checks.push(OutputCheck {
                name: name.to_string(),
                status: CheckStatus::Fail,
                detail: format!("unreadable: {}", e),
            });
            None
        }
    }
}
