//! Generative Asset Service - Capability Boundary
//!
//! The pipeline only ever talks to the generative backend through the three
//! operations below. `vertex` is the production adapter, `fake` a scripted
//! one for tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod fake;
pub mod vertex;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Quota/429 class failure; the only class the gateway retries.
    #[error("Rate limited by backend: {0}")]
    RateLimited(String),

    #[error("Backend request timed out: {0}")]
    Timeout(String),

    #[error("Backend returned no content: {0}")]
    Empty(String),

    #[error("Backend request failed: {0}")]
    Failed(String),
}

impl BackendError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackendError::RateLimited(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BaseAssetRequest {
    pub product_name: String,
    pub product_description: String,
    pub brand_theme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranslationRequest {
    pub message: String,
    pub target_language: String,
    pub region: String,
    pub target_audience: String,
}

/// Everything the backend needs to lay out one aspect-ratio variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantRequest {
    /// Encoded base product image (PNG/JPEG bytes).
    #[serde(skip)]
    pub base_image: Vec<u8>,
    pub base_mime_type: String,
    pub aspect_ratio: String,
    pub original_message: String,
    pub translated_message: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub font_name: String,
    pub domain: String,
    pub product_description: String,
}

/// A single call routed through the gateway.
#[derive(Debug, Clone)]
pub enum Operation {
    GenerateBaseAsset(BaseAssetRequest),
    TranslateText(TranslationRequest),
    ComposeVariant(VariantRequest),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::GenerateBaseAsset(_) => "generate_base_asset",
            Operation::TranslateText(_) => "translate_text",
            Operation::ComposeVariant(_) => "compose_variant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    /// Encoded image bytes.
    Image(Vec<u8>),
    Text(String),
}

/// Narrow capability interface over the Generative Asset Service.
pub trait GenerativeBackend: Send + Sync {
    fn generate_base_asset(&self, request: &BaseAssetRequest) -> Result<Vec<u8>, BackendError>;

    fn translate_text(&self, request: &TranslationRequest) -> Result<String, BackendError>;

    fn compose_variant(&self, request: &VariantRequest) -> Result<Vec<u8>, BackendError>;

    /// Dispatch an [`Operation`] to the matching capability.
    fn execute(&self, operation: &Operation) -> Result<OperationOutput, BackendError> {
        match operation {
            Operation::GenerateBaseAsset(r) => {
                self.generate_base_asset(r).map(OperationOutput::Image)
            }
            Operation::TranslateText(r) => self.translate_text(r).map(OperationOutput::Text),
            Operation::ComposeVariant(r) => self.compose_variant(r).map(OperationOutput::Image),
        }
    }
}

/// Best-effort MIME type for an image path, used when sending it upstream.
pub fn mime_for_path(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}
