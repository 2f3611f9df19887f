//! Queued execution with bounded retry.
//!
//! Each delivered message runs through one state machine:
//!
//! ```text
//! received ──transfer ok──────────────────────────▶ ack        (Acked)
//!    │
//!    └─transfer failed ─ attempts < max_attempts ─▶ retry      (Retried)
//!                      └ attempts ≥ max_attempts ─▶ log + ack  (Abandoned)
//! ```
//!
//! Source fetch failures, sink failures and timeouts all take the same attempt-counted path.
//! There is no dead-letter queue: abandoning a job leaves only the log record.

use chrono::{SecondsFormat, Utc};
use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::{debug, error, info, warn};

use crate::config::ConsumerConfig;
use crate::contract::{
    Delivery, MessageSource, StreamTransfer, TransferError, TransferReceipt, TransferRequest,
};

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acked,
    Retried,
    Abandoned,
}

/// Tally of one processed batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub acked: usize,
    pub retried: usize,
    pub abandoned: usize,
    /// Messages whose ack/retry call itself failed; the queue redelivers them later.
    pub settle_errors: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.acked + self.retried + self.abandoned
    }

    fn record(&mut self, disposition: Disposition, settled: bool) {
        match disposition {
            Disposition::Acked => self.acked += 1,
            Disposition::Retried => self.retried += 1,
            Disposition::Abandoned => self.abandoned += 1,
        }
        if !settled {
            self.settle_errors += 1;
        }
    }
}

/// Decide what to do with a failed delivery.
pub fn failure_disposition(attempts: u32, max_attempts: u32) -> Disposition {
    if attempts < max_attempts {
        Disposition::Retried
    } else {
        Disposition::Abandoned
    }
}

pub struct QueueConsumer<T> {
    transfer: T,
    config: ConsumerConfig,
}

impl<T: StreamTransfer> QueueConsumer<T> {
    pub fn new(transfer: T, config: ConsumerConfig) -> Self {
        Self { transfer, config }
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Process one batch. Every message gets its own, independent decision.
    pub async fn process_batch<D: Delivery>(&self, batch: Vec<D>) -> BatchReport {
        let concurrency = self.config.batch_concurrency.max(1);
        let settled: Vec<(Disposition, bool)> = stream::iter(batch.iter())
            .map(|message| self.process_message(message))
            .buffered(concurrency)
            .collect()
            .await;

        let mut report = BatchReport::default();
        for (disposition, ok) in settled {
            report.record(disposition, ok);
        }
        debug!(?report, "[CONSUMER] Batch processed");
        report
    }

    /// Run one message through the state machine. Returns the disposition and whether the
    /// queue accepted the ack/retry.
    pub async fn process_message<D: Delivery>(&self, message: &D) -> (Disposition, bool) {
        let job = message.job();
        let attempts = message.attempts();
        info!(
            job_id = %job.job_id,
            source_url = %job.source_url,
            attempt = attempts,
            "[CONSUMER] Processing transfer job"
        );

        let request = TransferRequest::new(&job.source_url, &job.destination_path)
            .with_metadata("job_id", job.job_id.to_string())
            .with_metadata("source_url", &job.source_url)
            .with_metadata(
                "processed_at",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            );

        match self.run_transfer(request).await {
            Ok(receipt) => {
                info!(
                    job_id = %job.job_id,
                    destination_path = %job.destination_path,
                    bytes = %bytes_label(&receipt),
                    content_type = %receipt.content_type,
                    "[CONSUMER] Job completed"
                );
                let settled = settle(message.ack().await, &job.job_id, "ack");
                (Disposition::Acked, settled)
            }
            Err(e) => {
                error!(
                    job_id = %job.job_id,
                    attempt = attempts,
                    source_failure = e.is_source_failure(),
                    error = %e,
                    "[CONSUMER] Job failed"
                );
                match failure_disposition(attempts, self.config.max_attempts) {
                    Disposition::Retried => {
                        let settled = settle(message.retry().await, &job.job_id, "retry");
                        (Disposition::Retried, settled)
                    }
                    // A failure is never acked as completed.
                    Disposition::Abandoned | Disposition::Acked => {
                        error!(
                            job_id = %job.job_id,
                            attempts,
                            "[CONSUMER] Job failed permanently after {} attempts",
                            attempts
                        );
                        let settled = settle(message.ack().await, &job.job_id, "ack");
                        (Disposition::Abandoned, settled)
                    }
                }
            }
        }
    }

    async fn run_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        let limit = self.config.transfer_timeout();
        match tokio::time::timeout(limit, self.transfer.transfer(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransferError::Timeout(limit)),
        }
    }
}

fn settle(
    result: Result<(), crate::contract::QueueError>,
    job_id: &uuid::Uuid,
    action: &str,
) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(job_id = %job_id, action, error = %e, "[CONSUMER] Could not settle message; it will be redelivered");
            false
        }
    }
}

fn bytes_label(receipt: &TransferReceipt) -> String {
    receipt
        .bytes_written
        .map(|b| b.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Poll `source` until `shutdown` resolves.
///
/// Sleeps for the poll interval when the queue is empty or unreachable. A batch already being
/// processed is finished before the loop exits.
pub async fn run_consumer<S, T, F>(source: &S, consumer: &QueueConsumer<T>, shutdown: F)
where
    S: MessageSource,
    T: StreamTransfer,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let config = consumer.config();
    info!(
        max_batch_size = config.max_batch_size,
        max_attempts = config.max_attempts,
        "[CONSUMER] Starting consumer loop"
    );

    loop {
        let received = tokio::select! {
            _ = &mut shutdown => break,
            received = source.receive_batch(config.max_batch_size) => received,
        };

        let idle = match received {
            Ok(batch) if batch.is_empty() => true,
            Ok(batch) => {
                let report = consumer.process_batch(batch).await;
                info!(
                    acked = report.acked,
                    retried = report.retried,
                    abandoned = report.abandoned,
                    "[CONSUMER] Batch done"
                );
                false
            }
            Err(e) => {
                warn!(error = %e, "[CONSUMER] Failed to receive batch");
                true
            }
        };

        if idle {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(config.poll_interval()) => {}
            }
        }
    }
    info!("[CONSUMER] Consumer loop stopped");
}
