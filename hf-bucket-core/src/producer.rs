//! Job admission: validate a transfer request, give it an identity, enqueue it once.

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::config::SourcePolicy;
use crate::contract::{JobQueue, QueueError, Submitter};
use crate::job::{TransferJob, TransferOutcome};

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("Missing hf_url or r2_path")]
    MissingField,

    #[error("Invalid Hugging Face URL")]
    InvalidSource,

    #[error("Failed to queue job: {0}")]
    Enqueue(#[from] QueueError),
}

impl AdmissionError {
    /// Rejected before touching the queue.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AdmissionError::MissingField | AdmissionError::InvalidSource
        )
    }
}

pub struct JobProducer<Q> {
    queue: Q,
    policy: SourcePolicy,
}

impl<Q: JobQueue> JobProducer<Q> {
    pub fn new(queue: Q, policy: SourcePolicy) -> Self {
        Self { queue, policy }
    }

    /// Validate and enqueue. Exactly one enqueue per valid call, none otherwise.
    pub async fn admit(
        &self,
        source_url: &str,
        destination_path: &str,
    ) -> Result<TransferJob, AdmissionError> {
        if source_url.is_empty() || destination_path.is_empty() {
            warn!(
                source_url,
                destination_path, "[PRODUCER] Rejected request with missing field"
            );
            return Err(AdmissionError::MissingField);
        }
        if !source_url.contains(&self.policy.allowed_domain) {
            warn!(
                source_url,
                allowed_domain = %self.policy.allowed_domain,
                "[PRODUCER] Rejected request for disallowed source"
            );
            return Err(AdmissionError::InvalidSource);
        }

        let job = TransferJob::new(source_url, destination_path);
        match self.queue.enqueue(&job).await {
            Ok(()) => {
                info!(
                    job_id = %job.job_id,
                    source_url = %job.source_url,
                    destination_path = %job.destination_path,
                    "[PRODUCER] Transfer job queued"
                );
                Ok(job)
            }
            Err(e) => {
                error!(job_id = %job.job_id, error = %e, "[PRODUCER] Enqueue failed");
                Err(AdmissionError::Enqueue(e))
            }
        }
    }
}

#[async_trait]
impl<Q: JobQueue> Submitter for JobProducer<Q> {
    async fn submit(&self, source_url: &str, destination_path: &str) -> TransferOutcome {
        match self.admit(source_url, destination_path).await {
            Ok(job) => TransferOutcome::queued(
                format!(
                    "Transfer job queued: {} → R2://{}",
                    job.source_url, job.destination_path
                ),
                job.job_id,
            ),
            Err(e) => TransferOutcome::failure(e.to_string()),
        }
    }
}
