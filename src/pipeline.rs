//! Campaign Pipeline - Single Entry Point
//!
//! Brief in, report out. The legal gate runs before any asset work and is
//! the only check that stops a run; every product afterwards succeeds or
//! fails on its own.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::assets::AssetResolver;
use crate::backend::TranslationRequest;
use crate::brief::{BriefError, CampaignBrief, Product};
use crate::compliance::ComplianceEngine;
use crate::compose::{CampaignOutput, ComposeError, CompositionOrchestrator, CompositionRequest};
use crate::distribution::{uploaded_count, Distributor};
use crate::gateway::Gateway;
use crate::hashing::fingerprint;
use crate::legal::{LegalCheckResult, LegalScanner};
use crate::locale;
use crate::report::{render_summary, CampaignReport, ReportAggregator};
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Brief(#[from] BriefError),

    #[error("Campaign blocked by legal check: {}", .0.details)]
    LegalBlocked(LegalCheckResult),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Loaded,
    LegalGate,
    Translating,
    PerProductLoop,
    Reporting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub state: RunState,
    pub report_path: Option<PathBuf>,
    pub report: CampaignReport,
    pub errors: Vec<String>,
    pub success: bool,
}

/// The campaign the per-product loop works from, fixed once translation is done.
struct CampaignCopy {
    language: &'static str,
    translated: String,
    legal: LegalCheckResult,
}

pub struct PipelineOrchestrator {
    gateway: Arc<Gateway>,
    resolver: AssetResolver,
    composer: CompositionOrchestrator,
    compliance: ComplianceEngine,
    legal: LegalScanner,
    reports: ReportAggregator,
    distributor: Arc<dyn Distributor>,
    print_summary: bool,
}

impl PipelineOrchestrator {
    pub fn new(
        gateway: Arc<Gateway>,
        settings: &Settings,
        legal: LegalScanner,
        distributor: Arc<dyn Distributor>,
    ) -> Self {
        Self {
            resolver: AssetResolver::new(gateway.clone(), &settings.assets_dir),
            composer: CompositionOrchestrator::new(gateway.clone(), &settings.output_dir),
            compliance: ComplianceEngine::new(),
            reports: ReportAggregator::new(&settings.reports_dir),
            gateway,
            legal,
            distributor,
            print_summary: true,
        }
    }

    /// Suppress the stderr summary.
    pub fn quiet(mut self) -> Self {
        self.print_summary = false;
        self
    }

    pub fn run_path(&self, brief_path: &Path) -> Result<RunOutcome, PipelineError> {
        info!(brief = %brief_path.display(), "Loading campaign brief");
        let brief = CampaignBrief::load(brief_path).map_err(|e| {
            error!(error = %e, "Campaign brief rejected");
            e
        })?;
        self.run(&brief)
    }

    pub fn run(&self, brief: &CampaignBrief) -> Result<RunOutcome, PipelineError> {
        let started = Instant::now();
        let mut state = RunState::Loaded;
        brief.validate().map_err(|e| {
            error!(error = %e, "Campaign brief rejected");
            e
        })?;
        info!(
            campaign = %brief.campaign_id,
            products = brief.products.len(),
            region = %brief.region,
            "Campaign loaded"
        );

        advance(&mut state, RunState::LegalGate);
        let gate = self.legal.check(&brief.campaign_message, &brief.campaign_message);
        if gate.blocked {
            advance(&mut state, RunState::Failed);
            return Err(PipelineError::LegalBlocked(gate));
        }

        advance(&mut state, RunState::Translating);
        let copy = self.translate(brief);

        advance(&mut state, RunState::PerProductLoop);
        let mut outputs = vec![];
        let mut errors = vec![];
        for product in &brief.products {
            match self.process_product(brief, product, &copy, &mut errors) {
                Ok(produced) => outputs.extend(produced),
                Err(e) => {
                    error!(product = %product.name, error = %e, "Product failed");
                    errors.push(format!("Error processing product {}: {}", product.name, e));
                }
            }
        }

        advance(&mut state, RunState::Reporting);
        let mut report =
            ReportAggregator::build(&brief.campaign_id, &outputs, &errors, started.elapsed());
        report.brief_hash = fingerprint(brief).ok();

        let report_path = match self.reports.write(&report) {
            Ok(path) => Some(path),
            Err(e) => {
                error!(error = %e, "Report could not be written");
                errors.push(format!("Failed to write report: {}", e));
                None
            }
        };
        if self.print_summary {
            eprintln!("{}", render_summary(&report, report_path.as_deref()));
        }
        if let Some(path) = &report_path {
            self.distributor.upload_report(&brief.campaign_id, path);
        }

        let success = report_path.is_some() && errors.is_empty();
        advance(&mut state, if success { RunState::Done } else { RunState::Failed });
        let stats = self.gateway.stats();
        info!(
            campaign = %brief.campaign_id,
            variants = outputs.len(),
            errors = errors.len(),
            service_attempts = stats.attempts,
            service_retries = stats.retries,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Campaign finished"
        );

        Ok(RunOutcome {
            state,
            report_path,
            report,
            errors,
            success,
        })
    }

    fn translate(&self, brief: &CampaignBrief) -> CampaignCopy {
        let original = &brief.campaign_message;
        let language = locale::language_for_region(&brief.region);

        let translated = match locale::translation_target(&brief.region) {
            None => {
                info!(region = %brief.region, "No translation needed");
                original.clone()
            }
            Some(target) => {
                info!(target = %target, "Translating campaign message");
                let request = TranslationRequest {
                    message: original.clone(),
                    target_language: target.to_string(),
                    region: brief.region.clone(),
                    target_audience: brief.target_audience.clone(),
                };
                match self.gateway.translate(request) {
                    Ok(text) => text,
                    Err(e) => {
                        error!(error = %e, "Translation failed, using original message");
                        original.clone()
                    }
                }
            }
        };

        let legal = self.legal.check(original, &translated);
        if legal.blocked {
            warn!(details = %legal.details, "Translated message carries blocking terms");
        }
        CampaignCopy {
            language,
            translated,
            legal,
        }
    }

    /// Asset failures are recorded and yield no outputs; compose failures
    /// that prevent every ratio are returned.
    fn process_product(
        &self,
        brief: &CampaignBrief,
        product: &Product,
        copy: &CampaignCopy,
        errors: &mut Vec<String>,
    ) -> Result<Vec<CampaignOutput>, ComposeError> {
        info!(product = %product.name, "Processing product");

        let asset = match self.resolver.resolve(product, &brief.brand.theme) {
            Ok(asset) => asset,
            Err(e) => {
                error!(product = %product.name, error = %e, "No base asset");
                errors.push(format!("Failed to obtain asset for {}: {}", product.name, e));
                return Ok(vec![]);
            }
        };

        let composition = self.composer.compose(&CompositionRequest {
            campaign_id: &brief.campaign_id,
            product,
            base_path: &asset.path,
            brand: &brief.brand,
            original_message: &brief.campaign_message,
            translated_message: &copy.translated,
            language: copy.language,
            was_generated: asset.was_generated,
        })?;

        for failure in &composition.failures {
            errors.push(format!(
                "Failed to compose {} ({}): {}",
                product.name, failure.aspect_ratio, failure.error
            ));
        }

        let mut outputs = composition.outputs;
        for output in &mut outputs {
            let result = self.compliance.check(&output.output_path, &brief.brand);
            if !result.passed {
                warn!(
                    product = %product.name,
                    aspect = %output.aspect_ratio,
                    violations = ?result.violations,
                    "Compliance check failed"
                );
            }
            if let Some(cause) = &result.failure {
                errors.push(format!(
                    "Compliance check failed for {} ({}): {}",
                    product.name, output.aspect_ratio, cause
                ));
            }
            output.attach_checks(result, &copy.legal.prohibited_words_found);
        }

        let mut files = vec![asset.path.clone()];
        files.extend(outputs.iter().map(|o| o.output_path.clone()));
        let uploads = self
            .distributor
            .upload_campaign_assets(&brief.campaign_id, &product.name, &files);
        if !uploads.is_empty() {
            info!(
                product = %product.name,
                uploaded = uploaded_count(&uploads),
                total = uploads.len(),
                "Distribution finished"
            );
        }

        Ok(outputs)
    }
}

fn advance(state: &mut RunState, next: RunState) {
    info!(from = %state, to = %next, "Run state");
    *state = next;
}
