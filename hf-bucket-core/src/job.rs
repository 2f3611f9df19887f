//! Transfer job records and the outcome types shared by every pipeline stage.
//!
//! A [`TransferJob`] is created once by the producer and never mutated afterwards; retries
//! redeliver the same record. Delivery bookkeeping (the attempt counter) lives on the queue's
//! [`Delivery`](crate::contract::Delivery), not here.
//!
//! The serialized field names (`hf_url`, `r2_path`, `timestamp`, `job_id`) are the queue message
//! schema and must stay stable. Unknown fields are ignored on decode.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// One requested source → destination transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferJob {
    #[serde(rename = "hf_url")]
    pub source_url: String,
    #[serde(rename = "r2_path")]
    pub destination_path: String,
    /// Unix milliseconds on the wire.
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    pub job_id: Uuid,
}

impl TransferJob {
    /// Stamp a fresh identity and creation time onto a validated request.
    ///
    /// The creation time is truncated to the wire's millisecond precision so a decoded job
    /// compares equal to the one that was enqueued.
    pub fn new(source_url: impl Into<String>, destination_path: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_path: destination_path.into(),
            created_at: Utc::now().trunc_subsecs(3),
            job_id: Uuid::new_v4(),
        }
    }
}

/// Admission status carried by a queued success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => f.write_str("queued"),
        }
    }
}

/// Result of one transfer attempt or one admission call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    Success {
        message: String,
        /// Present when the success is a queued admission.
        job_id: Option<Uuid>,
        status: Option<JobStatus>,
    },
    Failure {
        error: String,
    },
}

impl TransferOutcome {
    /// A completed transfer on the direct path.
    pub fn completed(message: impl Into<String>) -> Self {
        TransferOutcome::Success {
            message: message.into(),
            job_id: None,
            status: None,
        }
    }

    /// A deferred success: the job was admitted, not yet transferred.
    pub fn queued(message: impl Into<String>, job_id: Uuid) -> Self {
        TransferOutcome::Success {
            message: message.into(),
            job_id: Some(job_id),
            status: Some(JobStatus::Queued),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        TransferOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success { .. })
    }
}

/// Outcome of one file in a repository sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkResult {
    /// Repository-relative path.
    pub file: String,
    pub result: TransferOutcome,
}

/// Kind of Hub repository. Selects both the default bucket prefix and the URL layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoType {
    Dataset,
    Model,
}

impl RepoType {
    /// Bucket prefix used when the caller does not give one.
    pub fn default_prefix(&self) -> &'static str {
        match self {
            RepoType::Dataset => "datasets",
            RepoType::Model => "models",
        }
    }

    /// Path segment under `/api/` used by the listing endpoint.
    pub fn api_segment(&self) -> &'static str {
        match self {
            RepoType::Dataset => "datasets",
            RepoType::Model => "models",
        }
    }

    /// Base web URL of a repository. Models live at the Hub root.
    pub fn repo_base_url(&self, endpoint: &str, repo_id: &str) -> String {
        let endpoint = endpoint.trim_end_matches('/');
        match self {
            RepoType::Dataset => format!("{endpoint}/datasets/{repo_id}"),
            RepoType::Model => format!("{endpoint}/{repo_id}"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepoType::Dataset => "dataset",
            RepoType::Model => "model",
        }
    }
}

impl fmt::Display for RepoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dataset" | "datasets" => Ok(RepoType::Dataset),
            "model" | "models" => Ok(RepoType::Model),
            other => Err(format!(
                "unknown repository type '{other}' (expected 'dataset' or 'model')"
            )),
        }
    }
}

/// A repository on the Hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub repo_id: String,
    pub repo_type: RepoType,
}

impl RepoRef {
    pub fn new(repo_id: impl Into<String>, repo_type: RepoType) -> Self {
        Self {
            repo_id: repo_id.into(),
            repo_type,
        }
    }
}

/// Success count over total for a finished sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub repo: RepoRef,
    pub succeeded: usize,
    pub total: usize,
}

impl SyncSummary {
    pub fn from_results(repo: RepoRef, results: &[BulkResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.result.is_success()).count();
        Self {
            repo,
            succeeded,
            total: results.len(),
        }
    }

    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

impl fmt::Display for SyncSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Finished syncing {}: {}",
            self.repo.repo_type, self.repo.repo_id
        )?;
        write!(f, "{}/{} files uploaded", self.succeeded, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn job_uses_queue_wire_names() {
        let job = TransferJob {
            source_url: "https://huggingface.co/x".into(),
            destination_path: "datasets/x".into(),
            created_at: Utc.timestamp_millis_opt(1_700_000_000_123).unwrap(),
            job_id: Uuid::nil(),
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["hf_url"], "https://huggingface.co/x");
        assert_eq!(value["r2_path"], "datasets/x");
        assert_eq!(value["timestamp"], 1_700_000_000_123i64);
        assert_eq!(value["job_id"], "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn fresh_job_survives_the_wire_unchanged() {
        let job = TransferJob::new(
            "https://huggingface.co/datasets/squad/resolve/main/README.md",
            "datasets/squad/README.md",
        );
        let decoded: TransferJob =
            serde_json::from_str(&serde_json::to_string(&job).unwrap()).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn job_decode_ignores_unknown_fields() {
        let raw = r#"{
            "hf_url": "https://huggingface.co/a",
            "r2_path": "b",
            "timestamp": 1,
            "job_id": "6f1c1f8e-2d57-4b4e-9a53-2f4f0f6f2c11",
            "priority": "high"
        }"#;
        let job: TransferJob = serde_json::from_str(raw).unwrap();
        assert_eq!(job.destination_path, "b");
    }

    #[test]
    fn new_jobs_get_distinct_ids() {
        let a = TransferJob::new("u", "p");
        let b = TransferJob::new("u", "p");
        assert_ne!(a.job_id, b.job_id);
    }

    #[test]
    fn repo_type_urls() {
        assert_eq!(
            RepoType::Dataset.repo_base_url("https://huggingface.co/", "squad"),
            "https://huggingface.co/datasets/squad"
        );
        assert_eq!(
            RepoType::Model.repo_base_url("https://huggingface.co", "bert-base-uncased"),
            "https://huggingface.co/bert-base-uncased"
        );
        assert_eq!("model".parse::<RepoType>(), Ok(RepoType::Model));
        assert!("space".parse::<RepoType>().is_err());
    }

    #[test]
    fn summary_counts_successes() {
        let results = vec![
            BulkResult {
                file: "a".into(),
                result: TransferOutcome::completed("ok"),
            },
            BulkResult {
                file: "b".into(),
                result: TransferOutcome::failure("boom"),
            },
        ];
        let summary = SyncSummary::from_results(RepoRef::new("squad", RepoType::Dataset), &results);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(
            summary.to_string(),
            "Finished syncing dataset: squad\n1/2 files uploaded"
        );
    }
}
