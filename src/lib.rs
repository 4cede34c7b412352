//! CampaignForge Core - Creative Automation Pipeline
//!
//! # Run Guarantees
//! 1. The Legal Gate Runs First
//! 2. Every Service Call Passes the Quota
//! 3. Only Rate Limits Are Retried
//! 4. A Failed Product Never Stops the Run
//! 5. Base Assets Are Reused, Never Regenerated
//! 6. Every Run Ends in One Report

pub mod brief;
pub mod settings;
pub mod hashing;
pub mod backend;
pub mod gateway;
pub mod prompts;
pub mod assets;
pub mod overlay;
pub mod compose;
pub mod compliance;
pub mod legal;
pub mod locale;
pub mod report;
pub mod distribution;
pub mod pipeline;

pub use brief::{Brand, BriefError, CampaignBrief, Product, Rgb};
pub use settings::{ConfigError, Settings};
pub use hashing::{canonical_json, fingerprint, sha256_hex};
pub use backend::{BackendError, GenerativeBackend, Operation, OperationOutput};
pub use gateway::{Clock, Gateway, GatewayError, ManualClock, RateLimiter, RetryPolicy, SystemClock};
pub use assets::{AssetError, AssetResolver, ResolvedAsset};
pub use compose::{AspectRatio, CampaignOutput, ComposeError, CompositionOrchestrator};
pub use compliance::{ComplianceEngine, ComplianceResult};
pub use legal::{LegalCheckResult, LegalRules, LegalScanner, Severity};
pub use report::{CampaignReport, ReportAggregator, ReportSummary};
pub use distribution::{Distributor, NoopDistributor, UploadOutcome};
pub use pipeline::{PipelineError, PipelineOrchestrator, RunOutcome, RunState};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
