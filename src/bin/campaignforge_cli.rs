//! CampaignForge CLI
//!
//! Commands: run, validate, legal
//! Machine-readable results go to stdout as JSON; logs and the run summary go to stderr.
//! Exit codes: 0 success, 1 failure, 2 legal block

use clap::{Parser, Subcommand};
use serde_json::json;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use campaignforge_core::backend::vertex::VertexBackend;
use campaignforge_core::prompts::PromptLibrary;
use campaignforge_core::{
    distribution, CampaignBrief, Gateway, LegalScanner, PipelineError, PipelineOrchestrator,
    Settings,
};

const EXIT_LEGAL_BLOCK: u8 = 2;

#[derive(Parser)]
#[command(name = "campaignforge-cli")]
#[command(about = "CampaignForge CLI - Creative Automation Pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ./campaignforge.toml if present)
    #[arg(short, long, global = true, env = "CAMPAIGNFORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Also append logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for a campaign brief
    Run {
        /// Path to the campaign brief (JSON)
        brief: PathBuf,

        /// Skip remote distribution even if enabled in settings
        #[arg(long)]
        no_upload: bool,
    },

    /// Validate a campaign brief without generating anything
    Validate {
        brief: PathBuf,
    },

    /// Scan a brief's campaign message against the prohibited-word rules
    Legal {
        brief: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            print_json(&json!({
                "success": false,
                "error": format!("Failed to load settings: {}", e),
            }));
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&settings.log_level, cli.json_logs, cli.log_file.as_deref()) {
        eprintln!("Failed to open log file: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Commands::Run { brief, no_upload } => run(settings, &brief, no_upload),
        Commands::Validate { brief } => validate(&brief),
        Commands::Legal { brief } => legal(&settings, &brief),
    }
}

fn init_logging(level: &str, json_logs: bool, log_file: Option<&Path>) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };
    let json_layer = json_logs.then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!json_logs).then(|| fmt::layer().compact().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn run(mut settings: Settings, brief_path: &Path, no_upload: bool) -> ExitCode {
    if no_upload {
        settings.distribution.enabled = false;
    }
    if let Err(e) = settings.ensure_dirs() {
        error!(error = %e, "Output directories unavailable");
        return ExitCode::FAILURE;
    }

    let prompts = Arc::new(PromptLibrary::new(&settings.prompts_dir));
    let backend = match VertexBackend::new(&settings, prompts) {
        Ok(b) => Arc::new(b),
        Err(e) => {
            error!(error = %e, "Generative service unavailable");
            print_json(&json!({ "success": false, "error": e.to_string() }));
            return ExitCode::FAILURE;
        }
    };

    let gateway = Arc::new(Gateway::from_settings(backend, &settings));
    let legal = LegalScanner::from_path(&settings.prohibited_words_path);
    let distributor = distribution::from_settings(&settings);
    let pipeline = PipelineOrchestrator::new(gateway, &settings, legal, distributor);

    info!(brief = %brief_path.display(), "Starting campaign run");
    match pipeline.run_path(brief_path) {
        Ok(outcome) => {
            print_json(&json!({
                "success": outcome.success,
                "state": outcome.state,
                "report_path": outcome.report_path,
                "errors": outcome.errors,
            }));
            if outcome.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(PipelineError::LegalBlocked(result)) => {
            error!(details = %result.details, "Campaign blocked");
            print_json(&json!({ "success": false, "blocked": true, "legal": result }));
            ExitCode::from(EXIT_LEGAL_BLOCK)
        }
        Err(e) => {
            print_json(&json!({ "success": false, "error": e.to_string() }));
            ExitCode::FAILURE
        }
    }
}

fn validate(brief_path: &Path) -> ExitCode {
    match CampaignBrief::load(brief_path) {
        Ok(brief) => {
            print_json(&json!({
                "valid": true,
                "campaign_id": brief.campaign_id,
                "products": brief.products.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
                "region": brief.region,
            }));
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_json(&json!({ "valid": false, "error": e.to_string() }));
            ExitCode::FAILURE
        }
    }
}

fn legal(settings: &Settings, brief_path: &Path) -> ExitCode {
    let brief = match CampaignBrief::load(brief_path) {
        Ok(b) => b,
        Err(e) => {
            print_json(&json!({ "valid": false, "error": e.to_string() }));
            return ExitCode::FAILURE;
        }
    };

    let scanner = LegalScanner::from_path(&settings.prohibited_words_path);
    let result = scanner.check(&brief.campaign_message, &brief.campaign_message);
    print_json(&json!(result));
    if result.blocked {
        ExitCode::from(EXIT_LEGAL_BLOCK)
    } else {
        ExitCode::SUCCESS
    }
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()));
}
