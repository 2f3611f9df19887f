use hf_bucket_core::config::SourcePolicy;
use hf_bucket_core::contract::{MockJobQueue, QueueError, Submitter};
use hf_bucket_core::job::{JobStatus, TransferJob, TransferOutcome};
use hf_bucket_core::producer::{AdmissionError, JobProducer};
use std::sync::{Arc, Mutex};

const URL: &str = "https://huggingface.co/datasets/squad/resolve/main/README.md";

fn producer_without_enqueue() -> JobProducer<MockJobQueue> {
    let mut queue = MockJobQueue::new();
    queue.expect_enqueue().times(0);
    JobProducer::new(queue, SourcePolicy::default())
}

#[tokio::test]
async fn empty_fields_are_rejected_without_enqueue() {
    let producer = producer_without_enqueue();

    for (url, path) in [("", "datasets/x"), (URL, ""), ("", "")] {
        let outcome = producer.submit(url, path).await;
        assert_eq!(outcome, TransferOutcome::failure("Missing hf_url or r2_path"));
    }
}

#[tokio::test]
async fn foreign_domain_is_rejected_without_enqueue() {
    let producer = producer_without_enqueue();

    let outcome = producer
        .submit("https://example.com/file.bin", "datasets/x/file.bin")
        .await;
    assert_eq!(outcome, TransferOutcome::failure("Invalid Hugging Face URL"));

    let err = producer
        .admit("https://example.com/file.bin", "datasets/x/file.bin")
        .await
        .unwrap_err();
    assert!(matches!(err, AdmissionError::InvalidSource));
    assert!(err.is_validation());
}

#[tokio::test]
async fn allowed_domain_is_configurable() {
    let mut queue = MockJobQueue::new();
    queue.expect_enqueue().times(1).returning(|_| Ok(()));
    let producer = JobProducer::new(
        queue,
        SourcePolicy {
            allowed_domain: "hf-mirror.internal".into(),
        },
    );

    assert!(producer
        .submit("https://hf-mirror.internal/x/resolve/main/a.bin", "models/x/a.bin")
        .await
        .is_success());
    assert!(!producer.submit(URL, "datasets/squad/README.md").await.is_success());
}

#[tokio::test]
async fn valid_request_is_enqueued_exactly_once() {
    let seen: Arc<Mutex<Vec<TransferJob>>> = Arc::default();
    let captured = seen.clone();

    let mut queue = MockJobQueue::new();
    queue.expect_enqueue().times(1).returning(move |job| {
        captured.lock().unwrap().push(job.clone());
        Ok(())
    });
    let producer = JobProducer::new(queue, SourcePolicy::default());

    let outcome = producer.submit(URL, "datasets/squad/README.md").await;

    let jobs = seen.lock().unwrap();
    assert_eq!(jobs.len(), 1);
    let job = &jobs[0];
    assert_eq!(job.source_url, URL);
    assert_eq!(job.destination_path, "datasets/squad/README.md");
    assert_eq!(job.job_id.get_version_num(), 4);

    match outcome {
        TransferOutcome::Success {
            message,
            job_id,
            status,
        } => {
            assert_eq!(
                message,
                format!("Transfer job queued: {URL} → R2://datasets/squad/README.md")
            );
            assert_eq!(job_id, Some(job.job_id));
            assert_eq!(status, Some(JobStatus::Queued));
        }
        other => panic!("expected queued success, got {other:?}"),
    }
}

#[tokio::test]
async fn enqueue_failure_is_reported_not_retried() {
    let mut queue = MockJobQueue::new();
    queue
        .expect_enqueue()
        .times(1)
        .returning(|_| Err(QueueError::Unavailable("disk full".into())));
    let producer = JobProducer::new(queue, SourcePolicy::default());

    let outcome = producer.submit(URL, "datasets/squad/README.md").await;
    assert_eq!(
        outcome,
        TransferOutcome::failure("Failed to queue job: queue unavailable: disk full")
    );
}

#[tokio::test]
async fn every_admission_gets_a_fresh_identity() {
    let mut queue = MockJobQueue::new();
    queue.expect_enqueue().times(2).returning(|_| Ok(()));
    let producer = JobProducer::new(queue, SourcePolicy::default());

    let first = producer.admit(URL, "a").await.unwrap();
    let second = producer.admit(URL, "a").await.unwrap();
    assert_ne!(first.job_id, second.job_id);
    assert!(second.created_at >= first.created_at);
}
