//! CLI configuration handling.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use tallybridge_core::notify::SmtpConfig;
use tallybridge_core::{Secret, ServiceCredential};

const DEFAULT_TOKEN_URL: &str = "https://accounts.zoho.com/oauth/v2/token";

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_api_base() -> String {
    tallybridge_core::books::DEFAULT_API_BASE.to_string()
}

/// One OAuth client registration for an upstream service.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    pub client_id: String,
    pub client_secret: Secret,
    pub refresh_token: Secret,

    /// Authorization server token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// API host for this service's resource endpoints.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    pub organization_id: Option<String>,
}

impl CredentialConfig {
    pub fn to_credential(&self) -> ServiceCredential {
        let mut credential = ServiceCredential::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.refresh_token.clone(),
        );
        if let Some(org) = &self.organization_id {
            credential = credential.with_organization_id(org.clone());
        }
        credential
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(flatten)]
    pub credential: CredentialConfig,

    /// Folder holding the scanned invoice files.
    pub scanned_folder_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Credential used for invoice listing, analytics and job cards.
    pub accounting: CredentialConfig,

    /// Separate registration for the reconciliation pass. Falls back to
    /// `accounting` when absent.
    pub accounting_secondary: Option<CredentialConfig>,

    pub storage: StorageConfig,

    pub mail: Option<SmtpConfig>,
}

impl AppConfig {
    /// The credential that drives the reconciler's accounting calls.
    pub fn reconcile_accounting(&self) -> &CredentialConfig {
        self.accounting_secondary.as_ref().unwrap_or(&self.accounting)
    }
}

/// Load configuration from an explicit path or the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config_path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path(),
    };

    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config from {:?}", config_path))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config from {:?}", config_path))?;

    Ok(config)
}

fn default_config_path() -> PathBuf {
    ProjectDirs::from("com", "tallybridge", "tallybridge")
        .map(|d| d.config_dir().join("tallybridge.toml"))
        .unwrap_or_else(|| PathBuf::from("tallybridge.toml"))
}
