//! Pipeline Invariant Tests
//!
//! End-to-end runs against the scripted backend and a manual clock.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use campaignforge_core::backend::fake::ScriptedBackend;
use campaignforge_core::compliance::{ComplianceEngine, LOGO_MATCH_THRESHOLD};
use campaignforge_core::{
    BackendError, Brand, CampaignBrief, Gateway, LegalScanner, ManualClock, NoopDistributor,
    PipelineError, PipelineOrchestrator, Product, RateLimiter, RetryPolicy, RunState, Settings,
};

struct Harness {
    dir: tempfile::TempDir,
    settings: Settings,
    backend: Arc<ScriptedBackend>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            output_dir: dir.path().join("outputs"),
            reports_dir: dir.path().join("reports"),
            assets_dir: dir.path().join("assets"),
            prohibited_words_path: dir.path().join("prohibited_words.json"),
            ..Settings::default()
        };
        Self {
            dir,
            settings,
            backend: Arc::new(ScriptedBackend::new()),
            clock: Arc::new(ManualClock::new()),
        }
    }

    fn pipeline(&self, rpm_limit: u32) -> PipelineOrchestrator {
        let gateway = Gateway::new(
            self.backend.clone(),
            RateLimiter::per_minute(rpm_limit, self.clock.clone()),
            RetryPolicy::default(),
            self.clock.clone(),
        );
        let legal = LegalScanner::from_path(&self.settings.prohibited_words_path);
        let distributor = Arc::new(NoopDistributor);
        PipelineOrchestrator::new(Arc::new(gateway), &self.settings, legal, distributor).quiet()
    }

    fn write_rules(&self, json: &str) {
        fs::write(&self.settings.prohibited_words_path, json).unwrap();
    }

    fn brief(&self, message: &str) -> CampaignBrief {
        let logo = self.dir.path().join("logo.png");
        image::RgbImage::from_pixel(40, 20, image::Rgb([250, 10, 10])).save(&logo).unwrap();
        CampaignBrief {
            campaign_id: "summer_2025".into(),
            products: vec![
                Product {
                    name: "Eco Bottle".into(),
                    description: "Reusable steel bottle".into(),
                    asset_path: None,
                },
                Product {
                    name: "Trail Shoe".into(),
                    description: "Lightweight running shoe".into(),
                    asset_path: None,
                },
            ],
            region: "france".into(),
            target_audience: "Urban commuters".into(),
            campaign_message: message.into(),
            brand: Brand {
                logo_path: logo.display().to_string(),
                primary_color: "#112233".into(),
                secondary_color: "#AABBCC".into(),
                font_name: "Inter".into(),
                theme: "minimal".into(),
                domain: "example.com".into(),
            },
        }
    }
}

#[test]
fn invariant_full_run_produces_three_variants_per_product() {
    let h = Harness::new();
    let outcome = h.pipeline(60).run(&h.brief("Summer is here")).unwrap();

    assert!(outcome.success, "errors: {:?}", outcome.errors);
    assert_eq!(outcome.state, RunState::Done);
    assert_eq!(outcome.report.summary.total_campaigns_generated, 6);
    assert_eq!(outcome.report.summary.total_products, 2);
    assert_eq!(outcome.report.summary.assets_generated, 6);

    for stem in ["Eco_Bottle", "Trail_Shoe"] {
        for file in ["1x1.png", "9x16.png", "16x9.png"] {
            assert!(h.settings.output_dir.join("summer_2025").join(stem).join(file).is_file());
        }
    }

    let variants = &outcome.report.products["Trail Shoe"];
    assert!(variants.iter().all(|v| v.language == "French"));
    assert!(variants.iter().all(|v| v.translated_message != "Summer is here"));
    assert!(variants.iter().all(|v| v.sha256.is_some()));
}

#[test]
fn invariant_report_written_as_json() {
    let h = Harness::new();
    let outcome = h.pipeline(60).run(&h.brief("Summer is here")).unwrap();

    let path = outcome.report_path.unwrap();
    assert!(path.starts_with(&h.settings.reports_dir));
    let parsed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(parsed["campaign_id"], "summer_2025");
    assert_eq!(parsed["summary"]["total_campaigns_generated"], 6);
    assert_eq!(parsed["errors"], serde_json::json!([]));
    assert_eq!(parsed["brief_hash"].as_str().unwrap().len(), 64);
}

#[test]
fn invariant_product_failure_is_isolated() {
    let h = Harness::new();
    h.backend.fail_compose_for("Lightweight running shoe");
    let outcome = h.pipeline(60).run(&h.brief("Summer is here")).unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.state, RunState::Failed);
    assert!(outcome.report_path.is_some());
    assert_eq!(outcome.report.products["Eco Bottle"].len(), 3);
    assert!(!outcome.report.products.contains_key("Trail Shoe"));
    assert_eq!(outcome.errors.len(), 3);
    assert!(outcome.errors.iter().all(|e| e.starts_with("Failed to compose Trail Shoe (")));
}

#[test]
fn invariant_legal_block_produces_nothing() {
    let h = Harness::new();
    h.write_rules(r#"{"medical_claims": {"severity": "ERROR", "words": ["cure"]}}"#);
    let err = h.pipeline(60).run(&h.brief("The CURE for summer heat")).unwrap_err();

    match err {
        PipelineError::LegalBlocked(result) => {
            assert!(result.blocked);
            assert_eq!(result.prohibited_words_found.len(), 2);
        }
        other => panic!("expected legal block, got {other}"),
    }
    assert!(h.backend.calls().is_empty());
    assert!(!h.settings.output_dir.exists());
    assert!(!h.settings.reports_dir.exists());
}

#[test]
fn invariant_warning_words_flag_but_do_not_block() {
    let h = Harness::new();
    h.write_rules(r#"{"superlatives": {"severity": "WARNING", "words": ["best"]}}"#);
    let outcome = h.pipeline(60).run(&h.brief("The best summer yet")).unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.report.summary.total_legal_flags, 12);
}

#[test]
fn invariant_missing_rules_file_never_blocks() {
    let h = Harness::new();
    assert!(!Path::new(&h.settings.prohibited_words_path).exists());
    let outcome = h.pipeline(60).run(&h.brief("The cure for summer heat")).unwrap();
    assert!(outcome.success);
}

#[test]
fn invariant_rerun_reuses_base_assets() {
    let h = Harness::new();
    let brief = h.brief("Summer is here");
    let first = h.pipeline(60).run(&brief).unwrap();
    let second = h.pipeline(60).run(&brief).unwrap();

    assert_eq!(first.report.summary.assets_generated, 6);
    assert_eq!(second.report.summary.assets_generated, 0);
    assert_eq!(second.report.summary.assets_reused, 6);
    assert_eq!(h.backend.call_count("generate_base_asset"), 2);
}

#[test]
fn invariant_quota_paces_service_calls() {
    let h = Harness::new();
    // 2 generations + 1 translation + 6 compositions = 9 calls at 3 per minute.
    let outcome = h.pipeline(3).run(&h.brief("Summer is here")).unwrap();

    assert!(outcome.success);
    assert_eq!(h.backend.calls().len(), 9);
    assert!(h.clock.elapsed().as_secs() >= 120);
}

#[test]
fn invariant_rate_limited_translation_is_retried() {
    let h = Harness::new();
    h.backend.push_translate(Err(BackendError::RateLimited("429".into())));
    let outcome = h.pipeline(60).run(&h.brief("Summer is here")).unwrap();

    assert!(outcome.success);
    assert_eq!(h.backend.call_count("translate_text"), 2);
    assert!(h.clock.sleeps().contains(&std::time::Duration::from_secs(10)));
    let variants = &outcome.report.products["Eco Bottle"];
    assert!(variants.iter().all(|v| v.translated_message == "[French] Summer is here"));
}

#[test]
fn invariant_logo_crop_is_detected() {
    let dir = tempfile::tempdir().unwrap();
    let variant = image::RgbImage::from_fn(200, 120, |x, y| {
        if y < 10 {
            image::Rgb([0x11, 0x22, 0x33])
        } else {
            let v = ((x * 7 + y * 13) % 200) as u8;
            image::Rgb([v, 255 - v, v / 2])
        }
    });
    let variant_path = dir.path().join("1x1.png");
    variant.save(&variant_path).unwrap();
    let logo_path = dir.path().join("logo.png");
    image::imageops::crop_imm(&variant, 150, 20, 30, 15).to_image().save(&logo_path).unwrap();

    let brand = Brand {
        logo_path: logo_path.display().to_string(),
        primary_color: "#112233".into(),
        secondary_color: "#112233".into(),
        font_name: "Inter".into(),
        theme: "minimal".into(),
        domain: "example.com".into(),
    };
    let result = ComplianceEngine::new().check(&variant_path, &brand);

    assert!(result.logo_detected);
    assert!(result.logo_confidence >= LOGO_MATCH_THRESHOLD);
    assert!(result.primary_color_present);
    assert!(result.primary_color_percentage >= 0.001);
    assert!(result.passed, "violations: {:?}", result.violations);
}
