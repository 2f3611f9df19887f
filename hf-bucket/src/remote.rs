//! HTTP client of a running admission API.
//!
//! Used by `submit --via remote` and `sync --via remote`: every file becomes one `POST` to the
//! worker, which queues it. Every problem, transport included, comes back as a
//! [`TransferOutcome::Failure`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use hf_bucket_core::contract::Submitter;
use hf_bucket_core::job::TransferOutcome;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::load_config::INVALID_WORKER_URL;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdmissionReply {
    success: bool,
    message: Option<String>,
    job_id: Option<Uuid>,
    status: Option<String>,
    error: Option<String>,
}

pub struct AdmissionClient {
    http: reqwest::Client,
    worker_url: String,
}

impl AdmissionClient {
    pub fn new(worker_url: &str) -> Result<Self> {
        if worker_url.trim().is_empty() || worker_url.contains("<your-account>") {
            error!(worker_url, "Refusing to build admission client");
            bail!(INVALID_WORKER_URL);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        info!(worker_url, "Initialized admission client");
        Ok(Self {
            http,
            worker_url: worker_url.to_string(),
        })
    }
}

#[async_trait]
impl Submitter for AdmissionClient {
    async fn submit(&self, source_url: &str, destination_path: &str) -> TransferOutcome {
        debug!(source_url, destination_path, "[REMOTE] Posting transfer request");
        let response = match self
            .http
            .post(&self.worker_url)
            .json(&json!({ "hf_url": source_url, "r2_path": destination_path }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "[REMOTE] Request failed");
                return TransferOutcome::failure(format!("Network error: {e}"));
            }
        };

        let status = response.status();
        let reply: AdmissionReply = match response.json().await {
            Ok(reply) => reply,
            Err(e) => {
                error!(%status, error = %e, "[REMOTE] Unreadable reply");
                return TransferOutcome::failure(format!("Network error: {e}"));
            }
        };

        if reply.success && reply.status.as_deref() == Some("queued") {
            if let Some(job_id) = reply.job_id {
                info!(%job_id, "[REMOTE] Transfer job queued");
                return TransferOutcome::queued(reply.message.unwrap_or_default(), job_id);
            }
        }
        match reply.error {
            Some(error) => TransferOutcome::failure(error),
            None => TransferOutcome::failure(format!("Unexpected reply from worker ({status})")),
        }
    }
}
