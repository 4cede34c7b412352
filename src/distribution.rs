//! Asset Distribution - Remote Upload Boundary
//!
//! Failures here are logged per file and never fail a run.

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::assets::safe_file_stem;
use crate::settings::Settings;

const API_URL: &str = "https://api.dropboxapi.com/2";
const CONTENT_URL: &str = "https://content.dropboxapi.com/2";

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error("local file not found: {0}")]
    MissingFile(String),

    #[error("failed to read {0}: {1}")]
    Read(String, std::io::Error),

    #[error("remote request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("no shareable link available for {0}")]
    NoLink(String),
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub local_path: PathBuf,
    pub shared_url: Result<String, DistributionError>,
}

pub trait Distributor: Send + Sync {
    /// Replace the product's remote folder with `paths` (base asset + variants).
    fn upload_campaign_assets(
        &self,
        campaign_id: &str,
        product_name: &str,
        paths: &[PathBuf],
    ) -> Vec<UploadOutcome>;

    fn upload_report(&self, campaign_id: &str, report_path: &Path) -> Option<UploadOutcome>;
}

/// Used when distribution is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDistributor;

impl Distributor for NoopDistributor {
    fn upload_campaign_assets(
        &self,
        _campaign_id: &str,
        product_name: &str,
        _paths: &[PathBuf],
    ) -> Vec<UploadOutcome> {
        debug!(product = %product_name, "Distribution disabled, skipping upload");
        vec![]
    }

    fn upload_report(&self, _campaign_id: &str, _report_path: &Path) -> Option<UploadOutcome> {
        None
    }
}

/// Build the distributor the settings ask for; misconfiguration disables it.
pub fn from_settings(settings: &Settings) -> Arc<dyn Distributor> {
    let dist = &settings.distribution;
    if !dist.enabled {
        return Arc::new(NoopDistributor);
    }
    if dist.access_token.is_empty() {
        error!("Distribution enabled but no access token configured; uploads disabled");
        return Arc::new(NoopDistributor);
    }
    match DropboxDistributor::new(&dist.access_token, &dist.base_path, settings.request_timeout()) {
        Ok(d) => Arc::new(d),
        Err(e) => {
            error!(error = %e, "Distribution client initialization failed; uploads disabled");
            Arc::new(NoopDistributor)
        }
    }
}

#[derive(Debug, Deserialize)]
struct SharedLink {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SharedLinkList {
    #[serde(default)]
    links: Vec<SharedLink>,
}

pub struct DropboxDistributor {
    client: Client,
    token: String,
    base_path: String,
}

impl DropboxDistributor {
    pub fn new(token: &str, base_path: &str, timeout: Duration) -> Result<Self, DistributionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token: token.to_string(),
            base_path: base_path.trim_end_matches('/').to_string(),
        })
    }

    pub fn remote_path(&self, relative: &str) -> String {
        format!("{}/{}", self.base_path, relative).replace("//", "/")
    }

    fn rpc(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<reqwest::blocking::Response, DistributionError> {
        let response = self
            .client
            .post(format!("{}/{}", API_URL, endpoint))
            .bearer_auth(&self.token)
            .json(&body)
            .send()?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(api_error(response))
        }
    }

    /// Missing folders count as deleted.
    fn delete_folder(&self, relative: &str) -> bool {
        let path = self.remote_path(relative);
        match self.rpc("files/delete_v2", json!({ "path": path })) {
            Ok(_) => {
                info!(path = %path, "Deleted remote folder");
                true
            }
            Err(DistributionError::Api { body, .. }) if body.contains("not_found") => {
                debug!(path = %path, "Remote folder already absent");
                true
            }
            Err(e) => {
                error!(path = %path, error = %e, "Failed to delete remote folder");
                false
            }
        }
    }

    /// Existing folders count as created.
    fn create_folder(&self, relative: &str) -> bool {
        let path = self.remote_path(relative);
        match self.rpc("files/create_folder_v2", json!({ "path": path, "autorename": false })) {
            Ok(_) => {
                info!(path = %path, "Created remote folder");
                true
            }
            Err(DistributionError::Api { status: 409, .. }) => {
                debug!(path = %path, "Remote folder already exists");
                true
            }
            Err(e) => {
                error!(path = %path, error = %e, "Failed to create remote folder");
                false
            }
        }
    }

    fn upload_file(&self, local: &Path, relative: &str) -> Result<String, DistributionError> {
        if !local.is_file() {
            return Err(DistributionError::MissingFile(local.display().to_string()));
        }
        let bytes =
            fs::read(local).map_err(|e| DistributionError::Read(local.display().to_string(), e))?;
        let path = self.remote_path(relative);
        let arg = json!({ "path": path, "mode": "overwrite", "autorename": false });

        let response = self
            .client
            .post(format!("{}/files/upload", CONTENT_URL))
            .bearer_auth(&self.token)
            .header("Dropbox-API-Arg", arg.to_string())
            .header("Content-Type", "application/octet-stream")
            .body(bytes)
            .send()?;
        if !response.status().is_success() {
            return Err(api_error(response));
        }

        self.shared_link(&path)
    }

    fn shared_link(&self, path: &str) -> Result<String, DistributionError> {
        match self.rpc("sharing/create_shared_link_with_settings", json!({ "path": path })) {
            Ok(response) => Ok(response.json::<SharedLink>()?.url),
            Err(DistributionError::Api { body, .. })
                if body.contains("shared_link_already_exists") =>
            {
                let list: SharedLinkList = self
                    .rpc("sharing/list_shared_links", json!({ "path": path, "direct_only": true }))?
                    .json()?;
                list.links
                    .into_iter()
                    .next()
                    .map(|l| l.url)
                    .ok_or_else(|| DistributionError::NoLink(path.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

fn api_error(response: reqwest::blocking::Response) -> DistributionError {
    let status = response.status();
    let body = response.text().unwrap_or_default();
    DistributionError::Api {
        status: status.as_u16(),
        body,
    }
}

impl Distributor for DropboxDistributor {
    fn upload_campaign_assets(
        &self,
        campaign_id: &str,
        product_name: &str,
        paths: &[PathBuf],
    ) -> Vec<UploadOutcome> {
        let folder = format!("{}/{}", campaign_id, safe_file_stem(product_name));
        self.delete_folder(&folder);
        self.create_folder(&folder);

        let outcomes: Vec<UploadOutcome> = paths
            .iter()
            .map(|local| {
                let name = local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let shared_url = self.upload_file(local, &format!("{}/{}", folder, name));
                if let Err(e) = &shared_url {
                    error!(file = %local.display(), error = %e, "Upload failed");
                }
                UploadOutcome {
                    local_path: local.clone(),
                    shared_url,
                }
            })
            .collect();

        let failed = outcomes.iter().filter(|o| o.shared_url.is_err()).count();
        if failed > 0 {
            warn!(failed, total = paths.len(), "Upload incomplete");
        } else {
            info!(
                uploaded = outcomes.len(),
                folder = %self.remote_path(&folder),
                "Upload complete"
            );
        }
        outcomes
    }

    fn upload_report(&self, campaign_id: &str, report_path: &Path) -> Option<UploadOutcome> {
        let folder = format!("{}/reports", campaign_id);
        self.create_folder(&folder);
        let name = report_path.file_name()?.to_string_lossy().into_owned();
        let shared_url = self.upload_file(report_path, &format!("{}/{}", folder, name));
        match &shared_url {
            Ok(url) => info!(url = %url, "Report uploaded"),
            Err(e) => error!(error = %e, "Report upload failed"),
        }
        Some(UploadOutcome {
            local_path: report_path.to_path_buf(),
            shared_url,
        })
    }
}

/// Number of successful uploads in `outcomes`.
pub fn uploaded_count(outcomes: &[UploadOutcome]) -> usize {
    outcomes.iter().filter(|o| o.shared_url.is_ok()).count()
}
