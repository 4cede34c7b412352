//! Campaign Brief - Input Contract
//!
//! A brief is loaded once, validated as a whole, and never mutated.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub const MAX_MESSAGE_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum BriefError {
    #[error("Campaign brief file not found: {0}")]
    NotFound(String),

    #[error("Failed to read campaign brief: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in campaign brief: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Campaign brief validation failed: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub asset_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Brand {
    pub logo_path: String,
    pub primary_color: String,
    pub secondary_color: String,
    pub font_name: String,
    pub theme: String,
    pub domain: String,
}

impl Brand {
    pub fn primary_rgb(&self) -> Option<Rgb> {
        Rgb::from_hex(&self.primary_color)
    }

    pub fn secondary_rgb(&self) -> Option<Rgb> {
        Rgb::from_hex(&self.secondary_color)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CampaignBrief {
    pub campaign_id: String,
    pub products: Vec<Product>,
    pub region: String,
    pub target_audience: String,
    pub campaign_message: String,
    pub brand: Brand,
}

impl CampaignBrief {
    /// Read, trim and validate a brief from disk.
    pub fn load(path: &Path) -> Result<Self, BriefError> {
        if !path.exists() {
            return Err(BriefError::NotFound(path.display().to_string()));
        }
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, BriefError> {
        let mut brief: CampaignBrief = serde_json::from_str(raw)?;
        brief.trim();
        brief.validate()?;
        Ok(brief)
    }

    fn trim(&mut self) {
        trim_in_place(&mut self.campaign_id);
        trim_in_place(&mut self.region);
        trim_in_place(&mut self.target_audience);
        trim_in_place(&mut self.campaign_message);
        for product in &mut self.products {
            trim_in_place(&mut product.name);
            trim_in_place(&mut product.description);
            if let Some(path) = product.asset_path.as_mut() {
                trim_in_place(path);
            }
        }
        let brand = &mut self.brand;
        for field in [
            &mut brand.logo_path,
            &mut brand.primary_color,
            &mut brand.secondary_color,
            &mut brand.font_name,
            &mut brand.theme,
            &mut brand.domain,
        ] {
            trim_in_place(field);
        }
    }

    /// Collects every field violation instead of stopping at the first.
    pub fn validate(&self) -> Result<(), BriefError> {
        let mut problems = vec![];

        if self.campaign_id.is_empty() {
            problems.push("campaign_id must not be empty".to_string());
        }
        if self.products.is_empty() {
            problems.push("products must contain at least one product".to_string());
        }
        for (i, product) in self.products.iter().enumerate() {
            if product.name.is_empty() {
                problems.push(format!("products[{}].name must not be empty", i));
            }
            if product.description.is_empty() {
                problems.push(format!("products[{}].description must not be empty", i));
            }
        }
        if self.region.is_empty() {
            problems.push("region must not be empty".to_string());
        }
        if self.target_audience.is_empty() {
            problems.push("target_audience must not be empty".to_string());
        }

        let message_len = self.campaign_message.chars().count();
        if message_len == 0 || message_len > MAX_MESSAGE_CHARS {
            problems.push(format!(
                "campaign_message must be 1-{} characters (got {})",
                MAX_MESSAGE_CHARS, message_len
            ));
        }

        for (field, value) in [
            ("brand.primary_color", &self.brand.primary_color),
            ("brand.secondary_color", &self.brand.secondary_color),
        ] {
            if Rgb::from_hex(value).is_none() {
                problems.push(format!("{} must match #RRGGBB (got '{}')", field, value));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(BriefError::Invalid(problems))
        }
    }
}

fn trim_in_place(s: &mut String) {
    let trimmed = s.trim();
    if trimmed.len() != s.len() {
        *s = trimmed.to_string();
    }
}

/// An sRGB colour parsed from `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    /// Strict `^#[0-9A-Fa-f]{6}$`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let digits = hex.strip_prefix('#')?;
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.0[0], self.0[1], self.0[2])
    }
}
