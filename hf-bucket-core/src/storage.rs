//! S3-compatible sink: streams a source URL straight into a bucket object.
//!
//! Known-length sources go through a single `PutObject` whose body is fed chunk by chunk from the
//! HTTP response. Sources without a `Content-Length` use a multipart upload with fixed-size parts,
//! aborted on any error. The whole object is never held in memory.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use rusoto_core::{ByteStream, HttpClient, Region};
use rusoto_credential::StaticProvider;
use rusoto_s3::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedMultipartUpload,
    CompletedPart, CreateMultipartUploadRequest, PutObjectRequest, S3Client, UploadPartRequest, S3,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::contract::{StreamTransfer, TransferError, TransferReceipt, TransferRequest};

/// Multipart part size. S3 requires at least 5 MiB for every part but the last.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const SOURCE_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum StorageSetupError {
    #[error("failed to create S3 HTTP client: {0}")]
    Http(String),

    #[error("failed to create source HTTP client: {0}")]
    Source(#[from] reqwest::Error),
}

pub struct BucketTransfer {
    client: S3Client,
    http: reqwest::Client,
    bucket: String,
}

impl BucketTransfer {
    pub fn new(config: &StorageConfig) -> Result<Self, StorageSetupError> {
        let region = Region::Custom {
            name: config.region.clone(),
            endpoint: config.endpoint_url.clone(),
        };
        let credentials = StaticProvider::new_minimal(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
        );
        let dispatcher = HttpClient::new().map_err(|e| StorageSetupError::Http(e.to_string()))?;
        let client = S3Client::new_with(dispatcher, credentials, region);
        let http = reqwest::Client::builder()
            .user_agent(concat!("hf-bucket/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(SOURCE_CONNECT_TIMEOUT)
            .build()?;

        info!(endpoint_url = %config.endpoint_url, bucket = %config.bucket, "[STORAGE] Bucket client ready");
        Ok(Self {
            client,
            http,
            bucket: config.bucket.clone(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_streaming(
        &self,
        response: reqwest::Response,
        request: &TransferRequest,
        content_type: &str,
        length: u64,
    ) -> Result<(), TransferError> {
        // rusoto wants a Sync body; forward the response chunks through a channel.
        let (tx, rx) = mpsc::channel::<Result<Bytes, std::io::Error>>(8);
        let mut source = response.bytes_stream();
        let pump = tokio::spawn(async move {
            while let Some(chunk) = source.next().await {
                let chunk = chunk.map_err(std::io::Error::other);
                let failed = chunk.is_err();
                if tx.send(chunk).await.is_err() || failed {
                    break;
                }
            }
        });

        let put = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: request.destination_path.clone(),
            body: Some(ByteStream::new_with_size(
                ReceiverStream::new(rx),
                length as usize,
            )),
            content_length: Some(length as i64),
            content_type: Some(content_type.to_string()),
            metadata: metadata_of(request),
            ..Default::default()
        };

        let result = self.client.put_object(put).await;
        pump.abort();
        result.map(|_| ()).map_err(|e| TransferError::Sink(e.to_string()))
    }

    async fn put_multipart(
        &self,
        response: reqwest::Response,
        request: &TransferRequest,
        content_type: &str,
    ) -> Result<u64, TransferError> {
        let key = request.destination_path.clone();
        let created = self
            .client
            .create_multipart_upload(CreateMultipartUploadRequest {
                bucket: self.bucket.clone(),
                key: key.clone(),
                content_type: Some(content_type.to_string()),
                metadata: metadata_of(request),
                ..Default::default()
            })
            .await
            .map_err(|e| TransferError::Sink(e.to_string()))?;
        let upload_id = created
            .upload_id
            .ok_or_else(|| TransferError::Sink("no upload id returned".to_string()))?;
        debug!(key = %key, upload_id = %upload_id, "[STORAGE] Started multipart upload");

        match self.upload_parts(response, &key, &upload_id).await {
            Ok((parts, written)) => {
                self.client
                    .complete_multipart_upload(CompleteMultipartUploadRequest {
                        bucket: self.bucket.clone(),
                        key: key.clone(),
                        upload_id: upload_id.clone(),
                        multipart_upload: Some(CompletedMultipartUpload { parts: Some(parts) }),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| TransferError::Sink(e.to_string()))?;
                Ok(written)
            }
            Err(e) => {
                warn!(key = %key, upload_id = %upload_id, error = %e, "[STORAGE] Aborting multipart upload");
                if let Err(abort_err) = self
                    .client
                    .abort_multipart_upload(AbortMultipartUploadRequest {
                        bucket: self.bucket.clone(),
                        key: key.clone(),
                        upload_id: upload_id.clone(),
                        ..Default::default()
                    })
                    .await
                {
                    error!(key = %key, error = %abort_err, "[STORAGE] Abort failed");
                }
                Err(e)
            }
        }
    }

    async fn upload_parts(
        &self,
        response: reqwest::Response,
        key: &str,
        upload_id: &str,
    ) -> Result<(Vec<CompletedPart>, u64), TransferError> {
        let mut source = response.bytes_stream();
        let mut buffer = BytesMut::with_capacity(PART_SIZE);
        let mut parts = Vec::new();
        let mut written = 0u64;

        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(|e| TransferError::Source(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
            while buffer.len() >= PART_SIZE {
                let part = buffer.split_to(PART_SIZE).freeze();
                written += part.len() as u64;
                let number = parts.len() as i64 + 1;
                parts.push(self.upload_part(key, upload_id, number, part).await?);
            }
        }
        // The last part may be short; an empty source still needs one part.
        if !buffer.is_empty() || parts.is_empty() {
            let part = buffer.freeze();
            written += part.len() as u64;
            let number = parts.len() as i64 + 1;
            parts.push(self.upload_part(key, upload_id, number, part).await?);
        }
        Ok((parts, written))
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i64,
        part: Bytes,
    ) -> Result<CompletedPart, TransferError> {
        let size = part.len();
        let output = self
            .client
            .upload_part(UploadPartRequest {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
                part_number,
                content_length: Some(size as i64),
                body: Some(ByteStream::from(part.to_vec())),
                ..Default::default()
            })
            .await
            .map_err(|e| TransferError::Sink(e.to_string()))?;
        debug!(key = %key, part_number, size, "[STORAGE] Uploaded part");
        Ok(CompletedPart {
            e_tag: output.e_tag,
            part_number: Some(part_number),
        })
    }
}

#[async_trait]
impl StreamTransfer for BucketTransfer {
    async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        let response = self
            .http
            .get(&request.source_url)
            .send()
            .await
            .map_err(|e| TransferError::Source(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::SourceStatus {
                status: status.as_u16(),
                url: request.source_url.clone(),
            });
        }

        let content_type = content_type_of(response.headers());
        let bytes_written = match response.content_length() {
            Some(length) => {
                self.put_streaming(response, &request, &content_type, length)
                    .await?;
                length
            }
            None => self.put_multipart(response, &request, &content_type).await?,
        };

        info!(
            bucket = %self.bucket,
            key = %request.destination_path,
            bytes = bytes_written,
            "[STORAGE] Object written"
        );
        Ok(TransferReceipt {
            bytes_written: Some(bytes_written),
            content_type,
        })
    }
}

/// `Content-Type` of the source, or the generic binary type.
pub fn content_type_of(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

fn metadata_of(request: &TransferRequest) -> Option<HashMap<String, String>> {
    if request.metadata.is_empty() {
        None
    } else {
        Some(request.metadata.clone())
    }
}
