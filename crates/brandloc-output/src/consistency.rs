//! Consistency scoring between a generated asset and a reference image
//!
//! Both images are brought into a common RGB space at the reference's
//! aspect, capped at `SCORE_MAX_DIMENSION` on the longer side. The score is
//! the mean per-pixel Euclidean RGB distance divided by the largest
//! possible distance, so it lives in `[0.0, 1.0]`: identical content scores
//! 0.0 and pure black against pure white scores 1.0.

use brandloc_core::{LocalizerError, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};

/// Longer side of the common comparison space
pub const SCORE_MAX_DIMENSION: u32 = 512;

const MAX_DISTANCE: f64 = 441.672_955_930_063_7; // 255 * sqrt(3)

/// Outcome of comparing an asset to a reference
#[derive(Debug, Clone)]
pub struct ConsistencyReport {
    /// Normalized divergence in `[0.0, 1.0]`
    pub score: f64,
    /// Per-pixel divergence, 0 = identical, 255 = maximal
    pub diff_map: GrayImage,
}

impl ConsistencyReport {
    /// Whether the score exceeds the review threshold
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.score > threshold
    }
}

/// Score `generated` against `reference`
pub fn consistency_score(
    generated: &DynamicImage,
    reference: &DynamicImage,
) -> Result<ConsistencyReport> {
    let (rw, rh) = reference.dimensions();
    let (gw, gh) = generated.dimensions();
    if rw == 0 || rh == 0 || gw == 0 || gh == 0 {
        return Err(LocalizerError::Validation(
            "cannot score an empty image".to_string(),
        ));
    }

    let (width, height) = comparison_size(rw, rh);
    let a = to_common_space(generated, width, height);
    let b = to_common_space(reference, width, height);

    let mut diff_map = GrayImage::new(width, height);
    let mut total = 0.0f64;
    for ((x, y, pa), pb) in a.enumerate_pixels().zip(b.pixels()) {
        let d = pixel_distance(pa, pb);
        total += d;
        diff_map.put_pixel(x, y, Luma([(d * 255.0).round().min(255.0) as u8]));
    }

    let score = (total / (width as f64 * height as f64)).clamp(0.0, 1.0);
    Ok(ConsistencyReport { score, diff_map })
}

/// Render a difference map as a blue -> green -> red colour ramp
pub fn render_heatmap(diff_map: &GrayImage) -> RgbImage {
    RgbImage::from_fn(diff_map.width(), diff_map.height(), |x, y| {
        ramp(diff_map.get_pixel(x, y)[0])
    })
}

fn comparison_size(width: u32, height: u32) -> (u32, u32) {
    let longer = width.max(height);
    if longer <= SCORE_MAX_DIMENSION {
        return (width, height);
    }
    let scale = SCORE_MAX_DIMENSION as f64 / longer as f64;
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

fn to_common_space(img: &DynamicImage, width: u32, height: u32) -> RgbImage {
    let rgb = img.to_rgb8();
    if rgb.dimensions() == (width, height) {
        rgb
    } else {
        image::imageops::resize(&rgb, width, height, FilterType::Triangle)
    }
}

fn pixel_distance(a: &Rgb<u8>, b: &Rgb<u8>) -> f64 {
    let sum: f64 = a
        .0
        .iter()
        .zip(b.0.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum();
    sum.sqrt() / MAX_DISTANCE
}

fn ramp(value: u8) -> Rgb<u8> {
    let v = value as u16;
    if v < 128 {
        let t = (v * 2) as u8;
        Rgb([0, t, 255 - t])
    } else {
        let t = ((v - 128) * 2).min(255) as u8;
        Rgb([t, 255 - t, 0])
    }
}
