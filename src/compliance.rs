//! Compliance Engine - Pixel-Level Brand Checks
//!
//! Two rules run against every rendered variant:
//! - logo presence, by normalized cross-correlation template matching
//! - brand colour presence, by counting pixels near a fan of shades
//!
//! The engine never returns an error. Unreadable inputs become failing
//! results with a violation describing the cause.

use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error, warn};

use crate::brief::{Brand, Rgb};

pub const LOGO_MATCH_THRESHOLD: f64 = 0.7;
/// 0.1% of pixels.
pub const COLOR_PRESENCE_THRESHOLD: f64 = 0.001;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceResult {
    pub logo_detected: bool,
    pub logo_confidence: f64,
    pub primary_color_present: bool,
    pub primary_color_percentage: f64,
    pub secondary_color_present: bool,
    pub secondary_color_percentage: f64,
    pub passed: bool,
    pub violations: Vec<String>,
    /// Set when the engine could not measure the variant at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ComplianceResult {
    /// All-false result carrying a single synthetic violation.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            logo_detected: false,
            logo_confidence: 0.0,
            primary_color_present: false,
            primary_color_percentage: 0.0,
            secondary_color_present: false,
            secondary_color_percentage: 0.0,
            passed: false,
            violations: vec![format!("Compliance check failed: {}", reason)],
            failure: Some(reason.to_string()),
        }
    }
}

/// Shade fan and match radius used for colour presence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorTolerance {
    /// Shades generated on each side of the target.
    pub shade_steps: u32,
    /// Per-channel offset between neighbouring shades.
    pub shade_step: i32,
    /// Euclidean RGB radius around each shade.
    pub distance: f64,
}

impl Default for ColorTolerance {
    fn default() -> Self {
        Self {
            shade_steps: 5,
            shade_step: 15,
            distance: 40.0,
        }
    }
}

impl ColorTolerance {
    /// `target + i * step` on every channel for i in `-steps..=steps`, clamped.
    pub fn shades(&self, target: Rgb) -> Vec<[u8; 3]> {
        let steps = self.shade_steps as i32;
        (-steps..=steps)
            .map(|i| {
                let offset = i * self.shade_step;
                target.0.map(|c| (c as i32 + offset).clamp(0, 255) as u8)
            })
            .collect()
    }
}

pub struct ComplianceEngine {
    logo_threshold: f64,
    presence_threshold: f64,
    tolerance: ColorTolerance,
}

impl Default for ComplianceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ComplianceEngine {
    pub fn new() -> Self {
        Self {
            logo_threshold: LOGO_MATCH_THRESHOLD,
            presence_threshold: COLOR_PRESENCE_THRESHOLD,
            tolerance: ColorTolerance::default(),
        }
    }

    pub fn check(&self, variant_path: &Path, brand: &Brand) -> ComplianceResult {
        let variant = match image::open(variant_path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                error!(path = %variant_path.display(), error = %e, "Compliance check error");
                return ComplianceResult::failed(e);
            }
        };

        let (Some(primary), Some(secondary)) = (brand.primary_rgb(), brand.secondary_rgb()) else {
            return ComplianceResult::failed("brand colors are not #RRGGBB");
        };

        let mut violations = vec![];

        let logo_confidence = self.logo_confidence(&variant, Path::new(&brand.logo_path));
        let logo_detected = logo_confidence >= self.logo_threshold;
        if !logo_detected {
            violations.push(format!("Logo not detected (confidence: {:.2})", logo_confidence));
        }

        let primary_pct = color_presence(&variant, primary, &self.tolerance);
        let primary_present = primary_pct >= self.presence_threshold;
        if !primary_present {
            violations.push(self.color_violation("Primary", &brand.primary_color, primary_pct));
        }

        let secondary_pct = color_presence(&variant, secondary, &self.tolerance);
        let secondary_present = secondary_pct >= self.presence_threshold;
        if !secondary_present {
            violations.push(self.color_violation(
                "Secondary",
                &brand.secondary_color,
                secondary_pct,
            ));
        }

        debug!(
            path = %variant_path.display(),
            logo_confidence,
            primary_pct,
            secondary_pct,
            "Compliance measured"
        );

        ComplianceResult {
            logo_detected,
            logo_confidence,
            primary_color_present: primary_present,
            primary_color_percentage: primary_pct,
            secondary_color_present: secondary_present,
            secondary_color_percentage: secondary_pct,
            passed: violations.is_empty(),
            violations,
            failure: None,
        }
    }

    fn color_violation(&self, which: &str, hex: &str, pct: f64) -> String {
        format!(
            "{} color {} not present ({:.1}% < {:.1}%)",
            which,
            hex,
            pct * 100.0,
            self.presence_threshold * 100.0
        )
    }

    /// Missing or unreadable logos score 0.0.
    fn logo_confidence(&self, variant: &RgbImage, logo_path: &Path) -> f64 {
        let logo = match image::open(logo_path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!(path = %logo_path.display(), error = %e, "Failed to load logo for detection");
                return 0.0;
            }
        };
        match match_template(&GrayPlane::from_rgb(variant), &GrayPlane::from_rgb(&logo)) {
            Some(score) => score.clamp(0.0, 1.0),
            None => {
                warn!("Logo is larger than the variant; skipping detection");
                0.0
            }
        }
    }
}

// --- Template matching ---

/// Single-channel f64 luminance plane (ITU-R BT.601 weights).
pub struct GrayPlane {
    width: usize,
    height: usize,
    data: Vec<f64>,
}

impl GrayPlane {
    pub fn from_rgb(img: &RgbImage) -> Self {
        let data = img
            .pixels()
            .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
            .collect();
        Self {
            width: img.width() as usize,
            height: img.height() as usize,
            data,
        }
    }
}

/// Summed-area tables of values and squared values, one row/column padded.
struct Integral {
    stride: usize,
    sum: Vec<f64>,
    sq: Vec<f64>,
}

impl Integral {
    fn new(plane: &GrayPlane) -> Self {
        let stride = plane.width + 1;
        let mut sum = vec![0.0; stride * (plane.height + 1)];
        let mut sq = vec![0.0; stride * (plane.height + 1)];
        for y in 0..plane.height {
            let mut row_sum = 0.0;
            let mut row_sq = 0.0;
            for x in 0..plane.width {
                let v = plane.data[y * plane.width + x];
                row_sum += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row_sum;
                sq[i] = sq[i - stride] + row_sq;
            }
        }
        Self { stride, sum, sq }
    }

    fn window(&self, table: &[f64], x: usize, y: usize, w: usize, h: usize) -> f64 {
        let s = self.stride;
        table[(y + h) * s + x + w] - table[y * s + x + w] - table[(y + h) * s + x]
            + table[y * s + x]
    }
}

/// Maximum `TM_CCOEFF_NORMED` score over every placement of `template`
/// inside `image`, or `None` if the template does not fit.
pub fn match_template(image: &GrayPlane, template: &GrayPlane) -> Option<f64> {
    let (tw, th) = (template.width, template.height);
    if tw == 0 || th == 0 || tw > image.width || th > image.height {
        return None;
    }

    let n = (tw * th) as f64;
    let t_mean = template.data.iter().sum::<f64>() / n;
    let t_centered: Vec<f64> = template.data.iter().map(|v| v - t_mean).collect();
    let t_norm = t_centered.iter().map(|v| v * v).sum::<f64>().sqrt();

    let integral = Integral::new(image);
    let iw = image.width;

    let best = (0..=image.height - th)
        .into_par_iter()
        .map(|y| {
            let mut row_best = f64::NEG_INFINITY;
            for x in 0..=iw - tw {
                let mut num = 0.0;
                for ty in 0..th {
                    let img_row = &image.data[(y + ty) * iw + x..(y + ty) * iw + x + tw];
                    let tpl_row = &t_centered[ty * tw..(ty + 1) * tw];
                    num += img_row.iter().zip(tpl_row).map(|(a, b)| a * b).sum::<f64>();
                }
                let w_sum = integral.window(&integral.sum, x, y, tw, th);
                let w_sq = integral.window(&integral.sq, x, y, tw, th);
                let w_var = (w_sq - w_sum * w_sum / n).max(0.0);
                let denom = w_var.sqrt() * t_norm;
                row_best = row_best.max(normalize(num, denom));
            }
            row_best
        })
        .reduce(|| f64::NEG_INFINITY, f64::max);

    Some(best)
}

/// Degenerate denominators (flat window or flat template) resolve to ±1 when
/// the numerator is within rounding of it, otherwise 0.
fn normalize(num: f64, denom: f64) -> f64 {
    if num.abs() < denom {
        num / denom
    } else if num.abs() < denom * 1.125 {
        num.signum()
    } else {
        0.0
    }
}

// --- Colour presence ---

/// Fraction of pixels matching any shade of `target`, summed per shade and
/// capped at 1.0. A pixel near several shades is counted once per shade.
pub fn color_presence(img: &RgbImage, target: Rgb, tolerance: &ColorTolerance) -> f64 {
    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let radius_sq = tolerance.distance * tolerance.distance;
    let raw: &[u8] = img.as_raw();

    let matching: u64 = tolerance
        .shades(target)
        .par_iter()
        .map(|shade| {
            raw.chunks_exact(3)
                .filter(|px| {
                    let d: i32 = (0..3)
                        .map(|c| {
                            let diff = px[c] as i32 - shade[c] as i32;
                            diff * diff
                        })
                        .sum();
                    d as f64 <= radius_sq
                })
                .count() as u64
        })
        .sum();

    (matching as f64 / total as f64).min(1.0)
}
