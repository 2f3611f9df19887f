//! # contract: the seams of the transfer pipeline
//!
//! Every collaborator the pipeline talks to is a trait in this module:
//!
//! - [`StreamTransfer`]: moves bytes from a source URL into the bucket.
//! - [`JobQueue`]: durable enqueue used by the producer.
//! - [`MessageSource`] / [`Delivery`]: batch receive and per-message ack/retry used by the consumer.
//! - [`RepoLister`]: lazy listing of a Hub repository.
//! - [`Submitter`]: "transfer this file somehow", used by the bulk synchroniser.
//!
//! The producer, consumer and synchroniser depend only on these traits, never on SQLite, S3 or
//! HTTP directly.
//!
//! ## Mocking & Testing
//! - The traits are annotated for `mockall`; mocks are exported under the default
//!   `test-export-mocks` feature so the CLI crate's tests can use them too.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::time::Duration;

#[allow(unused_imports)]
use mockall::{automock, predicate::*};

use crate::job::{RepoRef, TransferJob, TransferOutcome};

/// Request handed to a [`StreamTransfer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_url: String,
    pub destination_path: String,
    /// Custom object metadata, where the sink supports it.
    pub metadata: HashMap<String, String>,
}

impl TransferRequest {
    pub fn new(source_url: impl Into<String>, destination_path: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_path: destination_path.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// What a finished transfer wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// `None` when the source did not announce a length.
    pub bytes_written: Option<u64>,
    pub content_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("Failed to fetch from Hugging Face: {status} {url}")]
    SourceStatus { status: u16, url: String },

    #[error("source fetch error: {0}")]
    Source(String),

    #[error("S3 upload error: {0}")]
    Sink(String),

    #[error("transfer timed out after {0:?}")]
    Timeout(Duration),
}

impl TransferError {
    /// True when the failure happened before any byte reached the sink.
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            TransferError::SourceStatus { .. } | TransferError::Source(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("queue storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("job serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("listing request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("listing returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("unexpected listing payload: {0}")]
    Payload(String),
}

/// Streams one source URL into one destination path.
///
/// Writes are keyed overwrites: transferring the same job twice leaves the later content in place.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait StreamTransfer: Send + Sync {
    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError>;
}

/// Durable enqueue. One call, one message; no retries at this layer.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &TransferJob) -> Result<(), QueueError>;
}

/// One delivered queue message.
///
/// The attempt counter belongs to the queue: it is 1 on first delivery and grows on every
/// redelivery. Application code only reads it.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Delivery: Send + Sync {
    fn job(&self) -> TransferJob;

    fn attempts(&self) -> u32;

    /// Settle the message; it will not be delivered again.
    async fn ack(&self) -> Result<(), QueueError>;

    /// Ask the queue to deliver the message again later.
    async fn retry(&self) -> Result<(), QueueError>;
}

/// Batch receive side of a queue.
#[async_trait]
pub trait MessageSource: Send + Sync {
    type Message: Delivery;

    async fn receive_batch(&self, max_messages: usize) -> Result<Vec<Self::Message>, QueueError>;
}

/// Kind of a listed repository entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a recursive repository listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    pub path: String,
    pub kind: EntryKind,
    pub size: Option<u64>,
}

/// Lists a repository recursively.
///
/// The returned stream is finite and pulled page by page; it cannot be rewound; call
/// `list_files` again to start over.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait RepoLister: Send + Sync {
    fn list_files(&self, repo: &RepoRef) -> BoxStream<'static, Result<RepoEntry, HubError>>;
}

/// Gets one file from the Hub into the bucket, immediately or by admitting a job.
///
/// Never fails out-of-band: every problem is a [`TransferOutcome::Failure`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Submitter: Send + Sync {
    async fn submit(&self, source_url: &str, destination_path: &str) -> TransferOutcome;
}
