//! Explicit configuration for every pipeline component.
//!
//! Built once at process start (see the CLI's `load_config`) and passed by reference into the
//! producer, consumer, queue and synchroniser. Nothing in this crate reads the environment.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Which source URLs the producer admits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePolicy {
    /// A source URL must contain this string.
    pub allowed_domain: String,
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self {
            allowed_domain: "huggingface.co".to_string(),
        }
    }
}

/// Where the Hub lives and which revision files are resolved at.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    pub endpoint: String,
    pub revision: String,
    /// Per-request timeout for listing calls.
    pub request_timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface.co".to_string(),
            revision: "main".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl HubConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Fully-qualified download URL of one repository file.
    pub fn file_url(&self, repo: &crate::job::RepoRef, path: &str) -> String {
        format!(
            "{}/resolve/{}/{}",
            repo.repo_type.repo_base_url(&self.endpoint, &repo.repo_id),
            self.revision,
            path
        )
    }
}

/// Destination bucket and credentials. Secrets come from the environment, never from files.
#[derive(Clone)]
pub struct StorageConfig {
    pub endpoint_url: String,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &"<redacted>")
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl StorageConfig {
    pub fn trace_loaded(&self) {
        info!(
            endpoint_url = %self.endpoint_url,
            bucket = %self.bucket,
            region = %self.region,
            "Loaded storage config"
        );
    }
}

/// Durable queue location and redelivery timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub sqlite_path: PathBuf,
    /// How long a received message stays hidden before it is redelivered unsettled.
    /// Must exceed the consumer's transfer timeout.
    pub visibility_timeout_secs: u64,
    /// Delay before a retried message becomes visible again.
    pub retry_delay_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("hf-bucket-queue.sqlite"),
            visibility_timeout_secs: 2 * 60 * 60,
            retry_delay_secs: 10,
        }
    }
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// Consumer retry policy and polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Deliveries after which a failing job is acknowledged and dropped.
    pub max_attempts: u32,
    pub max_batch_size: usize,
    /// Messages of one batch processed at a time.
    pub batch_concurrency: usize,
    pub poll_interval_ms: u64,
    /// Upper bound on one whole transfer (fetch and write).
    pub transfer_timeout_secs: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_batch_size: 10,
            batch_concurrency: 1,
            poll_interval_ms: 1_000,
            transfer_timeout_secs: 60 * 60,
        }
    }
}

impl ConsumerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }

    pub fn trace_loaded(&self) {
        info!(
            max_attempts = self.max_attempts,
            max_batch_size = self.max_batch_size,
            batch_concurrency = self.batch_concurrency,
            "Loaded consumer config"
        );
        debug!(?self, "Consumer config loaded (full debug)");
    }
}

/// Bulk sync tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Files submitted at a time. 1 means strictly sequential.
    pub concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}
