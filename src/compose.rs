//! Composition Orchestrator - Aspect-Ratio Fan-Out
//!
//! One product becomes one variant per [`AspectRatio`]. Each ratio is
//! independent: a failed ratio is reported and skipped, the others proceed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

use crate::assets::safe_file_stem;
use crate::backend::{mime_for_path, VariantRequest};
use crate::brief::{Brand, Product};
use crate::compliance::ComplianceResult;
use crate::gateway::{Gateway, GatewayError};
use crate::overlay;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("composition request failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("composed image could not be processed: {0}")]
    Image(#[from] image::ImageError),

    #[error("composition storage error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AspectRatio {
    Square,
    Portrait,
    Landscape,
}

impl AspectRatio {
    /// Fixed processing order.
    pub const ALL: [AspectRatio; 3] = [
        AspectRatio::Square,
        AspectRatio::Portrait,
        AspectRatio::Landscape,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "9:16",
            AspectRatio::Landscape => "16:9",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }

    /// `1x1.png`, `9x16.png`, `16x9.png`.
    pub fn file_name(&self) -> String {
        format!("{}.png", self.as_str().replace(':', "x"))
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for AspectRatio {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AspectRatio {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AspectRatio::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown aspect ratio '{}'", s)))
    }
}

/// One rendered variant of one product.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignOutput {
    pub campaign_id: String,
    pub product_name: String,
    pub aspect_ratio: AspectRatio,
    pub output_path: PathBuf,
    pub language: String,
    pub translated_message: String,
    pub asset_generated: bool,
    pub compliance_passed: bool,
    pub legal_flags: Vec<String>,
    pub generation_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceResult>,
}

impl CampaignOutput {
    /// Record the compliance verdict and campaign-wide legal flags.
    pub fn attach_checks(&mut self, compliance: ComplianceResult, legal_flags: &[String]) {
        self.compliance_passed = compliance.passed;
        self.compliance = Some(compliance);
        self.legal_flags = legal_flags.to_vec();
    }
}

#[derive(Debug, Clone)]
pub struct CompositionRequest<'a> {
    pub campaign_id: &'a str,
    pub product: &'a Product,
    pub base_path: &'a Path,
    pub brand: &'a Brand,
    pub original_message: &'a str,
    pub translated_message: &'a str,
    pub language: &'a str,
    pub was_generated: bool,
}

#[derive(Debug)]
pub struct VariantFailure {
    pub aspect_ratio: AspectRatio,
    pub error: ComposeError,
}

#[derive(Debug, Default)]
pub struct Composition {
    pub outputs: Vec<CampaignOutput>,
    pub failures: Vec<VariantFailure>,
}

pub struct CompositionOrchestrator {
    gateway: Arc<Gateway>,
    output_dir: PathBuf,
}

impl CompositionOrchestrator {
    pub fn new(gateway: Arc<Gateway>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            gateway,
            output_dir: output_dir.into(),
        }
    }

    pub fn product_dir(&self, campaign_id: &str, product_name: &str) -> PathBuf {
        self.output_dir.join(campaign_id).join(safe_file_stem(product_name))
    }

    /// Fails as a whole only when the product directory or base image is
    /// unusable; per-ratio failures are returned in [`Composition::failures`].
    pub fn compose(&self, request: &CompositionRequest<'_>) -> Result<Composition, ComposeError> {
        let dir = self.product_dir(request.campaign_id, &request.product.name);
        fs::create_dir_all(&dir)?;
        let base_image = fs::read(request.base_path)?;

        let mut composition = Composition::default();
        for ratio in AspectRatio::ALL {
            let output_path = dir.join(ratio.file_name());
            info!(
                product = %request.product.name,
                aspect = %ratio,
                output = %output_path.display(),
                "Generating variant"
            );

            let started = Instant::now();
            match self.compose_variant(request, &base_image, ratio, &output_path) {
                Ok(sha256) => composition.outputs.push(CampaignOutput {
                    campaign_id: request.campaign_id.to_string(),
                    product_name: request.product.name.clone(),
                    aspect_ratio: ratio,
                    output_path,
                    language: request.language.to_string(),
                    translated_message: request.translated_message.to_string(),
                    asset_generated: request.was_generated,
                    compliance_passed: false,
                    legal_flags: vec![],
                    generation_time_seconds: started.elapsed().as_secs_f64(),
                    sha256,
                    compliance: None,
                }),
                Err(e) => {
                    error!(
                        product = %request.product.name,
                        aspect = %ratio,
                        error = %e,
                        "Composition failed"
                    );
                    composition.failures.push(VariantFailure {
                        aspect_ratio: ratio,
                        error: e,
                    });
                }
            }
        }

        Ok(composition)
    }

    fn compose_variant(
        &self,
        request: &CompositionRequest<'_>,
        base_image: &[u8],
        ratio: AspectRatio,
        output_path: &Path,
    ) -> Result<Option<String>, ComposeError> {
        let bytes = self.gateway.compose(VariantRequest {
            base_image: base_image.to_vec(),
            base_mime_type: mime_for_path(request.base_path).to_string(),
            aspect_ratio: ratio.as_str().to_string(),
            original_message: request.original_message.to_string(),
            translated_message: request.translated_message.to_string(),
            primary_color: request.brand.primary_color.clone(),
            secondary_color: request.brand.secondary_color.clone(),
            font_name: request.brand.font_name.clone(),
            domain: request.brand.domain.clone(),
            product_description: request.product.description.clone(),
        })?;

        let composed = image::load_from_memory(&bytes)?;
        overlay::write_with_logo(&composed, Path::new(&request.brand.logo_path), output_path)?;

        Ok(crate::hashing::file_sha256(output_path).ok())
    }
}
