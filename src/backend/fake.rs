//! Scripted in-process backend.
//!
//! Produces small deterministic PNGs and tagged translations, with hooks to
//! inject failures per operation, product or aspect ratio.

use image::{ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::io::Cursor;

use super::{BackendError, BaseAssetRequest, GenerativeBackend, TranslationRequest, VariantRequest};

pub const BASE_ASSET_SIZE: u32 = 64;
const VARIANT_LONG_EDGE: u32 = 160;

#[derive(Default)]
struct Script {
    generate: VecDeque<Result<Vec<u8>, BackendError>>,
    translate: VecDeque<Result<String, BackendError>>,
    compose: VecDeque<Result<Vec<u8>, BackendError>>,
    failing_products: HashSet<String>,
    failing_descriptions: HashSet<String>,
    failing_ratios: HashSet<String>,
    calls: Vec<&'static str>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot result for the next base-asset call.
    pub fn push_generate(&self, result: Result<Vec<u8>, BackendError>) {
        self.script.lock().generate.push_back(result);
    }

    pub fn push_translate(&self, result: Result<String, BackendError>) {
        self.script.lock().translate.push_back(result);
    }

    pub fn push_compose(&self, result: Result<Vec<u8>, BackendError>) {
        self.script.lock().compose.push_back(result);
    }

    /// Every base-asset call for `product_name` fails.
    pub fn fail_generate_for(&self, product_name: &str) {
        self.script.lock().failing_products.insert(product_name.to_string());
    }

    /// Every compose call whose product description equals `description` fails.
    pub fn fail_compose_for(&self, description: &str) {
        self.script.lock().failing_descriptions.insert(description.to_string());
    }

    pub fn fail_aspect_ratio(&self, ratio: &str) {
        self.script.lock().failing_ratios.insert(ratio.to_string());
    }

    /// Operation names in call order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.script.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.script.lock().calls.iter().filter(|c| **c == operation).count()
    }
}

impl GenerativeBackend for ScriptedBackend {
    fn generate_base_asset(&self, request: &BaseAssetRequest) -> Result<Vec<u8>, BackendError> {
        let mut script = self.script.lock();
        script.calls.push("generate_base_asset");
        if let Some(result) = script.generate.pop_front() {
            return result;
        }
        if script.failing_products.contains(&request.product_name) {
            return Err(BackendError::Failed(format!(
                "generation refused for {}",
                request.product_name
            )));
        }
        drop(script);

        let shade = (request.product_name.len() as u8).wrapping_mul(37);
        let img = RgbImage::from_pixel(
            BASE_ASSET_SIZE,
            BASE_ASSET_SIZE,
            Rgb([shade, 128, 255 - shade]),
        );
        encode_png(&img)
    }

    fn translate_text(&self, request: &TranslationRequest) -> Result<String, BackendError> {
        let mut script = self.script.lock();
        script.calls.push("translate_text");
        if let Some(result) = script.translate.pop_front() {
            return result;
        }
        Ok(format!("[{}] {}", request.target_language, request.message))
    }

    fn compose_variant(&self, request: &VariantRequest) -> Result<Vec<u8>, BackendError> {
        let mut script = self.script.lock();
        script.calls.push("compose_variant");
        if let Some(result) = script.compose.pop_front() {
            return result;
        }
        if script.failing_descriptions.contains(&request.product_description)
            || script.failing_ratios.contains(&request.aspect_ratio)
        {
            return Err(BackendError::Failed(format!(
                "composition refused ({})",
                request.aspect_ratio
            )));
        }
        drop(script);

        let (width, height) = variant_size(&request.aspect_ratio);
        let primary = parse_hex(&request.primary_color);
        let secondary = parse_hex(&request.secondary_color);

        // Primary band on top, secondary below.
        let img = RgbImage::from_fn(width, height, |_, y| {
            if y < height / 3 {
                Rgb(primary)
            } else {
                Rgb(secondary)
            }
        });
        encode_png(&img)
    }
}

fn variant_size(ratio: &str) -> (u32, u32) {
    let mut parts = ratio.split(':').filter_map(|p| p.parse::<u32>().ok());
    match (parts.next(), parts.next()) {
        (Some(w), Some(h)) if w > 0 && h > 0 => {
            if w >= h {
                (VARIANT_LONG_EDGE, VARIANT_LONG_EDGE * h / w)
            } else {
                (VARIANT_LONG_EDGE * w / h, VARIANT_LONG_EDGE)
            }
        }
        _ => (VARIANT_LONG_EDGE, VARIANT_LONG_EDGE),
    }
}

fn parse_hex(hex: &str) -> [u8; 3] {
    crate::brief::Rgb::from_hex(hex).map(|c| c.0).unwrap_or([0, 0, 0])
}

pub fn encode_png(img: &RgbImage) -> Result<Vec<u8>, BackendError> {
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| BackendError::Failed(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_sizes_follow_ratio() {
        assert_eq!(variant_size("1:1"), (160, 160));
        assert_eq!(variant_size("9:16"), (90, 160));
        assert_eq!(variant_size("16:9"), (160, 90));
    }

    #[test]
    fn test_scripted_results_take_priority() {
        let backend = ScriptedBackend::new();
        backend.push_translate(Err(BackendError::RateLimited("429".into())));
        let request = TranslationRequest {
            message: "hi".into(),
            target_language: "French".into(),
            region: "france".into(),
            target_audience: "all".into(),
        };
        assert!(backend.translate_text(&request).unwrap_err().is_rate_limited());
        assert_eq!(backend.translate_text(&request).unwrap(), "[French] hi");
        assert_eq!(backend.call_count("translate_text"), 2);
    }
}
