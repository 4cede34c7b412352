//! Report Aggregator
//!
//! Rolls every variant record and accumulated error into one JSON document
//! and a condensed console summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::assets::safe_file_stem;
use crate::compose::{AspectRatio, CampaignOutput};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize report: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    pub total_campaigns_generated: usize,
    pub total_products: usize,
    pub aspect_ratios: Vec<AspectRatio>,
    pub assets_generated: usize,
    pub assets_reused: usize,
    pub compliance_passed: usize,
    pub compliance_failed: usize,
    pub total_legal_flags: usize,
    pub total_execution_time_seconds: f64,
    pub average_time_per_campaign: f64,
    pub total_variant_time_seconds: f64,
    pub average_variant_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariantRecord {
    pub aspect_ratio: AspectRatio,
    pub output_path: PathBuf,
    pub language: String,
    pub translated_message: String,
    pub asset_generated: bool,
    pub compliance_passed: bool,
    #[serde(default)]
    pub compliance_violations: Vec<String>,
    pub legal_flags: Vec<String>,
    pub generation_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl From<&CampaignOutput> for VariantRecord {
    fn from(output: &CampaignOutput) -> Self {
        Self {
            aspect_ratio: output.aspect_ratio,
            output_path: output.output_path.clone(),
            language: output.language.clone(),
            translated_message: output.translated_message.clone(),
            asset_generated: output.asset_generated,
            compliance_passed: output.compliance_passed,
            compliance_violations: output
                .compliance
                .as_ref()
                .map(|c| c.violations.clone())
                .unwrap_or_default(),
            legal_flags: output.legal_flags.clone(),
            generation_time_seconds: output.generation_time_seconds,
            sha256: output.sha256.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignReport {
    pub campaign_id: String,
    pub run_id: Uuid,
    pub engine_version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brief_hash: Option<String>,
    pub summary: ReportSummary,
    pub products: BTreeMap<String, Vec<VariantRecord>>,
    pub errors: Vec<String>,
}

impl CampaignReport {
    pub fn file_name(&self) -> String {
        format!(
            "campaign_{}_{}.json",
            safe_file_stem(&self.campaign_id),
            self.timestamp.format("%Y%m%d_%H%M%S")
        )
    }
}

pub struct ReportAggregator {
    reports_dir: PathBuf,
}

impl ReportAggregator {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn build(
        campaign_id: &str,
        outputs: &[CampaignOutput],
        errors: &[String],
        total_time: Duration,
    ) -> CampaignReport {
        let total = outputs.len();
        let assets_generated = outputs.iter().filter(|o| o.asset_generated).count();
        let compliance_passed = outputs.iter().filter(|o| o.compliance_passed).count();
        let total_legal_flags = outputs.iter().map(|o| o.legal_flags.len()).sum();
        let distinct: BTreeSet<&str> = outputs.iter().map(|o| o.product_name.as_str()).collect();
        let total_secs = total_time.as_secs_f64();
        let variant_secs: f64 = outputs.iter().map(|o| o.generation_time_seconds).sum();
        let per_variant = |secs: f64| if total > 0 { secs / total as f64 } else { 0.0 };

        let mut products: BTreeMap<String, Vec<VariantRecord>> = BTreeMap::new();
        for output in outputs {
            products
                .entry(output.product_name.clone())
                .or_default()
                .push(VariantRecord::from(output));
        }

        CampaignReport {
            campaign_id: campaign_id.to_string(),
            run_id: Uuid::new_v4(),
            engine_version: ENGINE_VERSION.to_string(),
            timestamp: Utc::now(),
            brief_hash: None,
            summary: ReportSummary {
                total_campaigns_generated: total,
                total_products: distinct.len(),
                aspect_ratios: AspectRatio::ALL.to_vec(),
                assets_generated,
                assets_reused: total - assets_generated,
                compliance_passed,
                compliance_failed: total - compliance_passed,
                total_legal_flags,
                total_execution_time_seconds: total_secs,
                average_time_per_campaign: per_variant(total_secs),
                total_variant_time_seconds: variant_secs,
                average_variant_time_seconds: per_variant(variant_secs),
            },
            products,
            errors: errors.to_vec(),
        }
    }

    pub fn write(&self, report: &CampaignReport) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.reports_dir)?;
        let path = self.reports_dir.join(report.file_name());
        fs::write(&path, serde_json::to_string_pretty(report)?)?;
        info!(path = %path.display(), "Report written");
        Ok(path)
    }
}

/// Human-readable block printed at the end of a run.
pub fn render_summary(report: &CampaignReport, report_path: Option<&Path>) -> String {
    let s = &report.summary;
    let rule = "=".repeat(60);
    let mut out = String::new();

    let _ = writeln!(out, "\n{}", rule);
    let _ = writeln!(out, "CAMPAIGN EXECUTION REPORT: {}", report.campaign_id);
    let _ = writeln!(out, "{}", rule);
    let _ = writeln!(out, "Campaigns Generated:    {}", s.total_campaigns_generated);
    let _ = writeln!(out, "Products:               {}", s.total_products);
    let _ = writeln!(out, "Assets Generated:       {}", s.assets_generated);
    let _ = writeln!(out, "Assets Reused:          {}", s.assets_reused);
    let _ = writeln!(out, "Compliance Passed:      {}", s.compliance_passed);
    let _ = writeln!(out, "Compliance Failed:      {}", s.compliance_failed);
    let _ = writeln!(out, "Legal Flags:            {}", s.total_legal_flags);
    let _ = writeln!(out, "Total Time:             {:.2}s", s.total_execution_time_seconds);
    let _ = writeln!(out, "Avg Time/Campaign:      {:.2}s", s.average_time_per_campaign);
    let _ = writeln!(out, "{}", rule);

    if !report.errors.is_empty() {
        let _ = writeln!(out, "\n[WARN] ERRORS ({}):", report.errors.len());
        for error in &report.errors {
            let _ = writeln!(out, "  - {}", error);
        }
    }

    if let Some(path) = report_path {
        let _ = writeln!(out, "\nFull report: {}", path.display());
    }
    out
}
