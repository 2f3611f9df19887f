#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hf_bucket_core::config::QueueConfig;
use hf_bucket_core::contract::{StreamTransfer, TransferError, TransferReceipt, TransferRequest};
use hf_bucket_core::queue::SqliteQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
    pub metadata: HashMap<String, String>,
}

/// In-memory stand-in for both the Hub (sources) and the bucket (objects).
#[derive(Clone, Default)]
pub struct MemoryBucket {
    sources: Arc<Mutex<HashMap<String, (Vec<u8>, Option<String>)>>>,
    objects: Arc<Mutex<HashMap<String, StoredObject>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryBucket {
    pub fn publish(&self, url: &str, body: &[u8], content_type: Option<&str>) {
        self.sources.lock().unwrap().insert(
            url.to_string(),
            (body.to_vec(), content_type.map(str::to_string)),
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamTransfer for MemoryBucket {
    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        let source = self.sources.lock().unwrap().get(&request.source_url).cloned();
        let (body, content_type) = source.ok_or_else(|| TransferError::SourceStatus {
            status: 404,
            url: request.source_url.clone(),
        })?;
        let content_type =
            content_type.unwrap_or_else(|| "application/octet-stream".to_string());
        let bytes_written = body.len() as u64;

        self.objects.lock().unwrap().insert(
            request.destination_path.clone(),
            StoredObject {
                body,
                content_type: content_type.clone(),
                metadata: request.metadata.clone(),
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(TransferReceipt {
            bytes_written: Some(bytes_written),
            content_type,
        })
    }
}

pub fn queue_config(dir: &Path, visibility_timeout_secs: u64, retry_delay_secs: u64) -> QueueConfig {
    QueueConfig {
        sqlite_path: dir.join("queue.sqlite"),
        visibility_timeout_secs,
        retry_delay_secs,
    }
}

pub async fn open_queue(dir: &Path, visibility_timeout_secs: u64, retry_delay_secs: u64) -> SqliteQueue {
    SqliteQueue::connect(&queue_config(dir, visibility_timeout_secs, retry_delay_secs))
        .await
        .expect("queue should open")
}
