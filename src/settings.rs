//! Process Settings
//!
//! Layered: built-in defaults, optional TOML file, then `CAMPAIGNFORGE__*`
//! environment variables.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "CAMPAIGNFORGE";
pub const DEFAULT_CONFIG_FILE: &str = "campaignforge.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Failed to create directory {0}: {1}")]
    Directory(String, std::io::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub gcp_project_id: String,
    #[serde(default = "default_location")]
    pub gcp_location: String,
    #[serde(default = "default_imagen_model")]
    pub imagen_model: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_compose_model")]
    pub compose_model: String,
    #[serde(default)]
    pub access_token: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_rpm_limit")]
    pub rpm_limit: u32,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: PathBuf,
    #[serde(default = "default_prohibited_words_path")]
    pub prohibited_words_path: PathBuf,

    #[serde(default)]
    pub distribution: DistributionSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributionSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_distribution_base_path")]
    pub base_path: String,
}

fn default_location() -> String {
    "us-central1".into()
}

fn default_imagen_model() -> String {
    "imagen-3.0-generate-002".into()
}

fn default_text_model() -> String {
    "gemini-2.5-flash".into()
}

fn default_compose_model() -> String {
    "gemini-2.5-flash-image".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    10
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_rpm_limit() -> u32 {
    60
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_prompts_dir() -> PathBuf {
    PathBuf::from("prompts")
}

fn default_prohibited_words_path() -> PathBuf {
    PathBuf::from("data/prohibited_words.json")
}

fn default_distribution_base_path() -> String {
    "/creative-automation".into()
}

impl Default for DistributionSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            access_token: String::new(),
            base_path: default_distribution_base_path(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gcp_project_id: String::new(),
            gcp_location: default_location(),
            imagen_model: default_imagen_model(),
            text_model: default_text_model(),
            compose_model: default_compose_model(),
            access_token: String::new(),
            log_level: default_log_level(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            timeout_seconds: default_timeout_seconds(),
            rpm_limit: default_rpm_limit(),
            output_dir: default_output_dir(),
            reports_dir: default_reports_dir(),
            assets_dir: default_assets_dir(),
            prompts_dir: default_prompts_dir(),
            prohibited_words_path: default_prohibited_words_path(),
            distribution: DistributionSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings. An explicit `file` must exist; the default file is optional.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file_source = match file {
            Some(path) => config::File::from(path.to_path_buf()).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let built = config::Config::builder()
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    pub fn products_dir(&self) -> PathBuf {
        self.assets_dir.join("products")
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Create every directory the pipeline writes into.
    pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
        for dir in [&self.output_dir, &self.reports_dir, &self.products_dir()] {
            fs::create_dir_all(dir)
                .map_err(|e| ConfigError::Directory(dir.display().to_string(), e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.rpm_limit, 60);
        assert_eq!(settings.max_retries, 3);
        assert_eq!(settings.retry_backoff(), Duration::from_secs(10));
        assert_eq!(settings.products_dir(), PathBuf::from("assets/products"));
        assert!(!settings.distribution.enabled);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            "rpm_limit = 5\noutput_dir = \"out\"\n[distribution]\nenabled = true"
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.rpm_limit, 5);
        assert_eq!(settings.output_dir, PathBuf::from("out"));
        assert!(settings.distribution.enabled);
        assert_eq!(settings.distribution.base_path, "/creative-automation");
        assert_eq!(settings.imagen_model, "imagen-3.0-generate-002");
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_ensure_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            output_dir: dir.path().join("outputs"),
            reports_dir: dir.path().join("reports"),
            assets_dir: dir.path().join("assets"),
            ..Settings::default()
        };
        settings.ensure_dirs().unwrap();
        assert!(settings.products_dir().is_dir());
        assert!(settings.reports_dir.is_dir());
    }
}
