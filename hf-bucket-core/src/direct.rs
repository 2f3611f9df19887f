//! Immediate transfer without the queue: the caller waits for the object to land.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{error, info};

use crate::contract::{StreamTransfer, Submitter, TransferError, TransferRequest};
use crate::job::TransferOutcome;

pub struct DirectSubmitter<T> {
    transfer: T,
    bucket: String,
    timeout: Duration,
}

impl<T: StreamTransfer> DirectSubmitter<T> {
    /// `bucket` only labels the success message; `transfer` already knows where to write.
    pub fn new(transfer: T, bucket: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transfer,
            bucket: bucket.into(),
            timeout,
        }
    }
}

#[async_trait]
impl<T: StreamTransfer> Submitter for DirectSubmitter<T> {
    async fn submit(&self, source_url: &str, destination_path: &str) -> TransferOutcome {
        let request = TransferRequest::new(source_url, destination_path);
        let result = match tokio::time::timeout(self.timeout, self.transfer.transfer(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(TransferError::Timeout(self.timeout)),
        };

        match result {
            Ok(receipt) => {
                info!(
                    source_url,
                    destination_path,
                    bytes = ?receipt.bytes_written,
                    "[DIRECT] Transfer completed"
                );
                TransferOutcome::completed(format!(
                    "Transferred {} → R2://{}/{}",
                    source_url, self.bucket, destination_path
                ))
            }
            Err(e) => {
                error!(source_url, destination_path, error = %e, "[DIRECT] Transfer failed");
                TransferOutcome::failure(e.to_string())
            }
        }
    }
}
