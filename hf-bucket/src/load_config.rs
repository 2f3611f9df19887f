/// `load_config` module: builds the single [`AppConfig`] every command runs with.
///
/// Sources, in order of precedence (later wins):
/// 1. built-in defaults of every section;
/// 2. an optional YAML file (`--config`), where every key is optional;
/// 3. environment variables (`.env` is loaded by `main` before this runs).
///
/// Secrets (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`) are only ever read from the
/// environment. Sections a command does not need may stay incomplete; commands ask for what they
/// need through [`AppConfig::require_storage`] and [`AppConfig::require_worker_url`], which fail
/// with a descriptive message.
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::{anyhow, bail, Context, Result};
use hf_bucket_core::config::{
    ConsumerConfig, HubConfig, QueueConfig, SourcePolicy, StorageConfig, SyncConfig,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const ENV_S3_ENDPOINT_URL: &str = "S3_ENDPOINT_URL";
pub const ENV_S3_BUCKET_NAME: &str = "S3_BUCKET_NAME";
pub const ENV_S3_REGION: &str = "S3_REGION";
pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_WORKER_URL: &str = "WORKER_URL";
pub const ENV_QUEUE_SQLITE_PATH: &str = "QUEUE_SQLITE_PATH";

pub const MISSING_S3_CONFIGURATION: &str = "Missing S3 configuration. Please set S3_ENDPOINT_URL, S3_BUCKET_NAME, AWS_ACCESS_KEY_ID, and AWS_SECRET_ACCESS_KEY environment variables.";
pub const INVALID_WORKER_URL: &str =
    "Invalid or missing WORKER_URL. Please set it as an environment variable.";

/// Non-secret bucket settings; credentials are added from the environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub endpoint_url: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    #[serde(skip)]
    pub access_key_id: Option<String>,
    #[serde(skip)]
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourcePolicy,
    pub hub: HubConfig,
    pub storage: StorageSection,
    pub queue: QueueConfig,
    pub consumer: ConsumerConfig,
    pub sync: SyncConfig,
    pub server: ServerConfig,
    pub worker_url: Option<String>,
}

impl AppConfig {
    /// Complete bucket configuration, or the error the user sees when something is missing.
    pub fn require_storage(&self) -> Result<StorageConfig> {
        let s = &self.storage;
        match (
            &s.endpoint_url,
            &s.bucket,
            &s.access_key_id,
            &s.secret_access_key,
        ) {
            (Some(endpoint_url), Some(bucket), Some(access_key_id), Some(secret_access_key)) => {
                let storage = StorageConfig {
                    endpoint_url: endpoint_url.clone(),
                    bucket: bucket.clone(),
                    region: s.region.clone().unwrap_or_else(|| "auto".to_string()),
                    access_key_id: access_key_id.clone(),
                    secret_access_key: secret_access_key.clone(),
                };
                storage.trace_loaded();
                Ok(storage)
            }
            _ => {
                error!("[CONFIG] Storage configuration incomplete");
                bail!(MISSING_S3_CONFIGURATION)
            }
        }
    }

    /// Admission API base URL; rejects the placeholder left in sample `.env` files.
    pub fn require_worker_url(&self) -> Result<String> {
        match self.worker_url.as_deref() {
            Some(url) if !url.contains("<your-account>") => Ok(url.to_string()),
            _ => {
                error!("[CONFIG] Worker URL missing or placeholder");
                Err(anyhow!(INVALID_WORKER_URL))
            }
        }
    }

    /// Cross-section checks. A queue lease must outlive the longest transfer it covers.
    pub fn validate(&self) -> Result<()> {
        let visibility = self.queue.visibility_timeout_secs;
        let transfer = self.consumer.transfer_timeout_secs;
        if visibility <= transfer {
            error!(
                visibility_timeout_secs = visibility,
                transfer_timeout_secs = transfer,
                "[CONFIG] Lease shorter than transfer timeout"
            );
            bail!(
                "queue.visibility_timeout_secs ({visibility}) must be greater than consumer.transfer_timeout_secs ({transfer})"
            );
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_value(ENV_S3_ENDPOINT_URL) {
            self.storage.endpoint_url = Some(v);
        }
        if let Some(v) = env_value(ENV_S3_BUCKET_NAME) {
            self.storage.bucket = Some(v);
        }
        if let Some(v) = env_value(ENV_S3_REGION) {
            self.storage.region = Some(v);
        }
        self.storage.access_key_id = env_value(ENV_AWS_ACCESS_KEY_ID);
        self.storage.secret_access_key = env_value(ENV_AWS_SECRET_ACCESS_KEY);
        if let Some(v) = env_value(ENV_WORKER_URL) {
            self.worker_url = Some(v);
        }
        if let Some(v) = env_value(ENV_QUEUE_SQLITE_PATH) {
            self.queue.sqlite_path = PathBuf::from(v);
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Load defaults, then the optional YAML file, then environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => {
            info!(config_path = ?path, "Loading configuration from file");
            let content = fs::read_to_string(path).map_err(|e| {
                error!(error = ?e, config_path = ?path, "Failed to read config file");
                anyhow!("Failed to read config file {:?}: {}", path, e)
            })?;
            let parsed: AppConfig = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config YAML {path:?}"))?;
            info!(config_path = ?path, "Parsed config YAML successfully");
            parsed
        }
        None => {
            info!("No config file given, using defaults");
            AppConfig::default()
        }
    };

    config.apply_env();
    config.validate()?;
    config.consumer.trace_loaded();
    Ok(config)
}
