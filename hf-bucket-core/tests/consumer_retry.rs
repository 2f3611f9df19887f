use async_trait::async_trait;
use std::time::Duration;

use hf_bucket_core::config::ConsumerConfig;
use hf_bucket_core::consumer::{Disposition, QueueConsumer};
use hf_bucket_core::contract::{
    MockDelivery, MockStreamTransfer, QueueError, StreamTransfer, TransferError, TransferReceipt,
    TransferRequest,
};
use hf_bucket_core::job::TransferJob;

fn job() -> TransferJob {
    TransferJob::new(
        "https://huggingface.co/datasets/squad/resolve/main/train.json",
        "datasets/squad/train.json",
    )
}

fn delivery(job: TransferJob, attempts: u32, acks: usize, retries: usize) -> MockDelivery {
    let mut delivery = MockDelivery::new();
    delivery.expect_job().return_const(job);
    delivery.expect_attempts().return_const(attempts);
    delivery.expect_ack().times(acks).returning(|| Ok(()));
    delivery.expect_retry().times(retries).returning(|| Ok(()));
    delivery
}

fn failing_transfer() -> MockStreamTransfer {
    let mut transfer = MockStreamTransfer::new();
    transfer
        .expect_transfer()
        .returning(|_| Err(TransferError::Sink("connection reset".into())));
    transfer
}

#[tokio::test]
async fn success_is_acked_with_job_metadata() {
    let job = job();
    let job_id = job.job_id.to_string();
    let source_url = job.source_url.clone();

    let mut transfer = MockStreamTransfer::new();
    transfer
        .expect_transfer()
        .times(1)
        .withf(move |r: &TransferRequest| {
            r.destination_path == "datasets/squad/train.json"
                && r.metadata.get("job_id") == Some(&job_id)
                && r.metadata.get("source_url") == Some(&source_url)
                && r.metadata
                    .get("processed_at")
                    .is_some_and(|t| t.ends_with('Z') && t.contains('.'))
        })
        .returning(|_| {
            Ok(TransferReceipt {
                bytes_written: Some(1024),
                content_type: "application/json".into(),
            })
        });

    let consumer = QueueConsumer::new(transfer, ConsumerConfig::default());
    let message = delivery(job, 1, 1, 0);
    assert_eq!(consumer.process_message(&message).await, (Disposition::Acked, true));
}

#[tokio::test]
async fn failures_below_ceiling_are_retried() {
    let consumer = QueueConsumer::new(failing_transfer(), ConsumerConfig::default());

    for attempt in [1, 2] {
        let message = delivery(job(), attempt, 0, 1);
        assert_eq!(
            consumer.process_message(&message).await,
            (Disposition::Retried, true)
        );
    }
}

#[tokio::test]
async fn failure_at_ceiling_is_acked_and_dropped() {
    let consumer = QueueConsumer::new(failing_transfer(), ConsumerConfig::default());
    let message = delivery(job(), 3, 1, 0);
    assert_eq!(
        consumer.process_message(&message).await,
        (Disposition::Abandoned, true)
    );
}

#[tokio::test]
async fn source_status_takes_the_same_retry_path() {
    let mut transfer = MockStreamTransfer::new();
    transfer.expect_transfer().returning(|r| {
        Err(TransferError::SourceStatus {
            status: 503,
            url: r.source_url,
        })
    });
    let consumer = QueueConsumer::new(transfer, ConsumerConfig::default());

    let first = delivery(job(), 1, 0, 1);
    assert_eq!(consumer.process_message(&first).await.0, Disposition::Retried);
    let last = delivery(job(), 3, 1, 0);
    assert_eq!(consumer.process_message(&last).await.0, Disposition::Abandoned);
}

struct StalledTransfer;

#[async_trait]
impl StreamTransfer for StalledTransfer {
    async fn transfer(&self, _request: TransferRequest) -> Result<TransferReceipt, TransferError> {
        tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
        Ok(TransferReceipt {
            bytes_written: None,
            content_type: "application/octet-stream".into(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn timeout_is_a_retryable_failure() {
    let config = ConsumerConfig {
        transfer_timeout_secs: 5,
        ..ConsumerConfig::default()
    };
    let consumer = QueueConsumer::new(StalledTransfer, config);
    let message = delivery(job(), 1, 0, 1);
    assert_eq!(consumer.process_message(&message).await, (Disposition::Retried, true));
}

#[tokio::test]
async fn settle_failure_is_counted() {
    let consumer = QueueConsumer::new(failing_transfer(), ConsumerConfig::default());

    let mut message = MockDelivery::new();
    message.expect_job().return_const(job());
    message.expect_attempts().return_const(1u32);
    message
        .expect_retry()
        .times(1)
        .returning(|| Err(QueueError::Unavailable("locked".into())));
    message.expect_ack().times(0);

    let report = consumer.process_batch(vec![message]).await;
    assert_eq!(report.retried, 1);
    assert_eq!(report.settle_errors, 1);
}

#[tokio::test]
async fn batch_decisions_are_independent() {
    let ok = job();
    let ok_url = ok.source_url.clone();
    let bad = TransferJob::new("https://huggingface.co/missing", "datasets/missing");

    let mut transfer = MockStreamTransfer::new();
    transfer.expect_transfer().returning(move |r| {
        if r.source_url == ok_url {
            Ok(TransferReceipt {
                bytes_written: Some(1),
                content_type: "text/plain".into(),
            })
        } else {
            Err(TransferError::SourceStatus {
                status: 404,
                url: r.source_url,
            })
        }
    });

    let config = ConsumerConfig {
        batch_concurrency: 2,
        ..ConsumerConfig::default()
    };
    let consumer = QueueConsumer::new(transfer, config);
    let batch = vec![
        delivery(ok, 1, 1, 0),
        delivery(bad.clone(), 1, 0, 1),
        delivery(bad, 3, 1, 0),
    ];

    let report = consumer.process_batch(batch).await;
    assert_eq!(report.acked, 1);
    assert_eq!(report.retried, 1);
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.settle_errors, 0);
    assert_eq!(report.total(), 3);
}
