//! Delivery outcome scenarios against the in-memory broker.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{failing_store, FakeExtractor, Harness, MockStore};
use upframer_models::{JobStatus, ProcessingResult};
use upframer_queue::memory::Settlement;
use upframer_queue::{
    BrokerTransport, HEADER_FAILURE_REASON, HEADER_ORIGINAL_QUEUE, PRIMARY_QUEUE, RESULT_QUEUE,
};
use upframer_storage::{
    build_object_store, DeploymentMode, LocalStorage, StorageConfig, StorageError, StorageKind,
    StoredArchive,
};
use upframer_worker::{DeliveryOutcome, FailureClass};

const DLQ: &str = "job-creation.dlq";

#[tokio::test]
async fn test_transient_failure_on_first_delivery_is_requeued() {
    let h = Harness::new(Arc::new(failing_store()), Arc::new(FakeExtractor { frames: 2 }));
    let video = h.local_video();
    let body = h.send_job(video.to_str().unwrap(), "job-a", None).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(outcome, Some(DeliveryOutcome::Requeued { retry_count: 1 }));
    let requeued = h.broker.messages(PRIMARY_QUEUE);
    assert_eq!(requeued.len(), 1);
    assert_eq!(requeued[0].body, body);
    assert_eq!(requeued[0].headers.retry_metadata().retry_count, 1);
    assert!(h.broker.messages(DLQ).is_empty());
    assert!(h.broker.messages(RESULT_QUEUE).is_empty());
    assert_eq!(
        h.broker.settlements(),
        vec![("1".to_string(), Settlement::Nack { requeue: false })]
    );
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn test_transient_failure_at_retry_limit_is_dead_lettered() {
    let h = Harness::new(Arc::new(failing_store()), Arc::new(FakeExtractor { frames: 2 }));
    let video = h.local_video();
    let body = h.send_job(video.to_str().unwrap(), "job-b", Some(3)).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(
        outcome,
        Some(DeliveryOutcome::DeadLettered { class: FailureClass::Temporary })
    );
    let dead = h.broker.messages(DLQ);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, body);
    assert_eq!(dead[0].headers.retry_metadata().retry_count, 3);
    assert_eq!(dead[0].headers.get_str(HEADER_ORIGINAL_QUEUE), Some(PRIMARY_QUEUE));
    assert!(dead[0].headers.get_str(HEADER_FAILURE_REASON).unwrap().contains("503"));
    assert!(h.broker.messages(PRIMARY_QUEUE).is_empty());
    assert_eq!(
        h.broker.settlements(),
        vec![("1".to_string(), Settlement::Nack { requeue: false })]
    );
}

#[tokio::test]
async fn test_retry_counter_climbs_until_dead_lettered() {
    let h = Harness::new(Arc::new(failing_store()), Arc::new(FakeExtractor { frames: 1 }));
    let video = h.local_video();
    h.send_job(video.to_str().unwrap(), "job-climb", None).await;

    for expected in 1..=3 {
        let outcome = h.executor.process_next().await.unwrap();
        assert_eq!(outcome, Some(DeliveryOutcome::Requeued { retry_count: expected }));
    }
    let outcome = h.executor.process_next().await.unwrap();

    assert!(matches!(outcome, Some(DeliveryOutcome::DeadLettered { .. })));
    assert_eq!(h.broker.messages(DLQ).len(), 1);
    assert!(h.broker.messages(PRIMARY_QUEUE).is_empty());
    assert_eq!(h.broker.settlements().len(), 4);
}

#[tokio::test]
async fn test_malformed_body_is_dead_lettered_immediately() {
    let h = Harness::new(Arc::new(MockStore::new()), Arc::new(FakeExtractor { frames: 1 }));
    h.send(b"{\"videoUrl\": 42".to_vec(), Some(2)).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(
        outcome,
        Some(DeliveryOutcome::DeadLettered { class: FailureClass::Permanent })
    );
    let dead = h.broker.messages(DLQ);
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, b"{\"videoUrl\": 42");
    assert_eq!(dead[0].headers.retry_metadata().retry_count, 2);
    assert!(dead[0]
        .headers
        .get_str(HEADER_FAILURE_REASON)
        .unwrap()
        .starts_with("Invalid job data"));
    assert!(h.broker.messages(PRIMARY_QUEUE).is_empty());
}

#[tokio::test]
async fn test_special_character_job_id_completes_with_safe_archive_name() {
    let output = tempfile::TempDir::new().unwrap();
    let store = Arc::new(LocalStorage::new(output.path()));
    let h = Harness::new(store, Arc::new(FakeExtractor { frames: 1 }));
    let video = h.local_video();
    h.send_job(video.to_str().unwrap(), "../job-with-special-chars-123!@#", None).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(outcome, Some(DeliveryOutcome::Completed));
    let results = h.broker.messages(RESULT_QUEUE);
    let result: ProcessingResult = serde_json::from_slice(&results[0].body).unwrap();
    assert_eq!(result.job_id.as_str(), "../job-with-special-chars-123!@#");

    let archives: Vec<_> = std::fs::read_dir(output.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    assert_eq!(archives.len(), 1);
    assert!(archives[0].starts_with("frames____job-with-special-chars-123___-"));
    assert!(archives[0].ends_with(".zip"));
    assert!(result.output_path.ends_with(&archives[0]));
    assert!(h.broker.messages(DLQ).is_empty());
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn test_success_publishes_exactly_one_result() {
    let output = tempfile::TempDir::new().unwrap();
    let store = Arc::new(LocalStorage::new(output.path()));
    let h = Harness::new(store, Arc::new(FakeExtractor { frames: 3 }));
    let video = h.local_video();
    h.send_job(video.to_str().unwrap(), "job-d", None).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(outcome, Some(DeliveryOutcome::Completed));
    let results = h.broker.messages(RESULT_QUEUE);
    assert_eq!(results.len(), 1);

    let result: ProcessingResult = serde_json::from_slice(&results[0].body).unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.job_id.as_str(), "job-d");
    assert!(result.output_path.starts_with("file://"));
    assert!(result.output_path.ends_with("/frames_job-d.zip"));
    assert!(output.path().join("frames_job-d.zip").is_file());

    assert_eq!(h.broker.settlements(), vec![("1".to_string(), Settlement::Ack)]);
    assert!(h.broker.messages(DLQ).is_empty());
    assert!(h.leftovers().is_empty());
    // The caller's source file is not ours to delete
    assert!(video.exists());
}

#[tokio::test]
async fn test_result_wire_format() {
    let mut store = MockStore::new();
    store.expect_kind().return_const(StorageKind::Remote);
    store.expect_store_archive().returning(|_, name| {
        Ok(StoredArchive {
            path: format!("results/{}", name),
            url: format!("https://frames.s3.us-east-1.amazonaws.com/results/{}", name),
        })
    });
    let h = Harness::new(Arc::new(store), Arc::new(FakeExtractor { frames: 1 }));
    let video = h.local_video();
    h.send_job(video.to_str().unwrap(), "job-wire", None).await;

    h.executor.process_next().await.unwrap();

    let results = h.broker.messages(RESULT_QUEUE);
    assert_eq!(
        String::from_utf8(results[0].body.clone()).unwrap(),
        r#"{"outputPath":"https://frames.s3.us-east-1.amazonaws.com/results/frames_job-wire.zip","status":"completed","jobId":"job-wire"}"#
    );
}

#[tokio::test]
async fn test_production_without_credentials_fails_startup() {
    let config = StorageConfig {
        mode: DeploymentMode::Production,
        ..StorageConfig::default()
    };

    let err = build_object_store(&config).await.err().unwrap();
    assert!(matches!(err, StorageError::ConfigError(_)));
}

#[tokio::test]
async fn test_missing_local_source_is_permanent() {
    let h = Harness::new(Arc::new(MockStore::new()), Arc::new(FakeExtractor { frames: 1 }));
    h.send_job("/definitely/not/here.mp4", "job-missing", Some(1)).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(
        outcome,
        Some(DeliveryOutcome::DeadLettered { class: FailureClass::Permanent })
    );
    assert_eq!(h.broker.messages(DLQ)[0].headers.retry_metadata().retry_count, 1);
}

#[tokio::test]
async fn test_extraction_failure_is_retried() {
    let output = tempfile::TempDir::new().unwrap();
    let h = Harness::new(
        Arc::new(LocalStorage::new(output.path())),
        Arc::new(FakeExtractor { frames: 0 }),
    );
    let video = h.local_video();
    h.send_job(video.to_str().unwrap(), "job-ffmpeg", None).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(outcome, Some(DeliveryOutcome::Requeued { retry_count: 1 }));
    assert!(h.leftovers().is_empty());
    assert!(std::fs::read_dir(output.path()).map(|d| d.count()).unwrap_or(0) == 0);
}

#[tokio::test]
async fn test_remote_source_on_local_storage_is_retried() {
    let output = tempfile::TempDir::new().unwrap();
    let h = Harness::new(
        Arc::new(LocalStorage::new(output.path())),
        Arc::new(FakeExtractor { frames: 1 }),
    );
    h.send_job("s3://videos/in.mp4", "job-remote-local", None).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(outcome, Some(DeliveryOutcome::Requeued { retry_count: 1 }));
}

#[tokio::test]
async fn test_empty_remote_key_is_invalid_source() {
    let h = Harness::new(Arc::new(MockStore::new()), Arc::new(FakeExtractor { frames: 1 }));
    h.send_job("s3://videos/", "job-bad-ref", None).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(
        outcome,
        Some(DeliveryOutcome::DeadLettered { class: FailureClass::Permanent })
    );
}

#[tokio::test]
async fn test_remote_object_missing_is_permanent() {
    let mut store = MockStore::new();
    store.expect_kind().return_const(StorageKind::Remote);
    store
        .expect_fetch()
        .returning(|reference, _| {
            Err(StorageError::not_found(format!(
                "s3://{}/{}",
                reference.bucket, reference.key
            )))
        });
    let h = Harness::new(Arc::new(store), Arc::new(FakeExtractor { frames: 1 }));
    h.send_job(
        "https://videos.s3.us-east-1.amazonaws.com/uploads/gone.mp4",
        "job-gone",
        None,
    )
    .await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(
        outcome,
        Some(DeliveryOutcome::DeadLettered { class: FailureClass::Permanent })
    );
    assert!(h.leftovers().is_empty());
}

#[tokio::test]
async fn test_foreign_bucket_source_is_dead_lettered_first_time() {
    let mut store = MockStore::new();
    store.expect_kind().return_const(StorageKind::Remote);
    store.expect_fetch().returning(|reference, _| {
        Err(StorageError::invalid_reference(format!(
            "bucket {} is not the configured bucket frames",
            reference.bucket
        )))
    });
    let h = Harness::new(Arc::new(store), Arc::new(FakeExtractor { frames: 1 }));
    h.send_job("s3://someone-else/in.mp4", "job-foreign", None).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(
        outcome,
        Some(DeliveryOutcome::DeadLettered { class: FailureClass::Permanent })
    );
    assert!(h.broker.messages(PRIMARY_QUEUE).is_empty());
}

#[tokio::test]
async fn test_result_publish_failure_takes_the_retry_path() {
    let output = tempfile::TempDir::new().unwrap();
    let h = Harness::new(
        Arc::new(LocalStorage::new(output.path())),
        Arc::new(FakeExtractor { frames: 1 }),
    );
    h.broker.fail_publishes_to(RESULT_QUEUE);
    let video = h.local_video();
    h.send_job(video.to_str().unwrap(), "job-pub", Some(1)).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(outcome, Some(DeliveryOutcome::Requeued { retry_count: 2 }));
    assert_eq!(
        h.broker.settlements(),
        vec![("1".to_string(), Settlement::Nack { requeue: false })]
    );
}

#[tokio::test]
async fn test_failed_requeue_leaves_delivery_unsettled() {
    let h = Harness::new(Arc::new(failing_store()), Arc::new(FakeExtractor { frames: 1 }));
    let video = h.local_video();
    h.send_job(video.to_str().unwrap(), "job-stuck", None).await;
    h.broker.fail_publishes_to(PRIMARY_QUEUE);

    let result = h.executor.process_next().await;

    assert!(result.is_err());
    assert_eq!(h.broker.in_flight(), 1);
    assert!(h.broker.settlements().is_empty());
}

#[tokio::test]
async fn test_unknown_failure_is_retried() {
    // A file where the work dir should be makes workspace creation fail
    let parent = tempfile::TempDir::new().unwrap();
    let blocked = parent.path().join("work");
    std::fs::write(&blocked, b"").unwrap();

    let config = upframer_worker::WorkerConfig {
        work_dir: blocked,
        poll_block: Duration::from_millis(10),
        ..upframer_worker::WorkerConfig::default()
    };
    let h = Harness::with_config(
        config,
        parent,
        Arc::new(MockStore::new()),
        Arc::new(FakeExtractor { frames: 1 }),
    );
    h.send_job("/videos/in.mp4", "job-io", None).await;

    let outcome = h.executor.process_next().await.unwrap();

    assert_eq!(outcome, Some(DeliveryOutcome::Requeued { retry_count: 1 }));
}

#[tokio::test]
async fn test_run_loop_processes_until_shutdown() {
    let output = tempfile::TempDir::new().unwrap();
    let h = Harness::new(
        Arc::new(LocalStorage::new(output.path())),
        Arc::new(FakeExtractor { frames: 1 }),
    );
    let video = h.local_video();
    h.send_job(video.to_str().unwrap(), "job-loop-1", None).await;
    h.send_job(video.to_str().unwrap(), "job-loop-2", None).await;

    let executor = h.executor.clone();
    let running = tokio::spawn(async move { executor.run().await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.broker.messages(RESULT_QUEUE).len() < 2 {
        assert!(tokio::time::Instant::now() < deadline, "jobs were not processed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    h.executor.shutdown();
    running.await.unwrap().unwrap();

    assert_eq!(h.broker.in_flight(), 0);
    assert_eq!(h.broker.declarations()[0], PRIMARY_QUEUE);
}

/// Run the executor in the background once its queue is declared.
async fn start_running(h: &Harness) -> tokio::task::JoinHandle<upframer_worker::WorkerResult<()>> {
    let executor = h.executor.clone();
    let running = tokio::spawn(async move { executor.run().await });
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while h.broker.declarations().is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "executor never started");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    // Let the first poll begin
    tokio::time::sleep(Duration::from_millis(50)).await;
    running
}

#[tokio::test]
async fn test_shutdown_lets_inflight_poll_deliver() {
    let output = tempfile::TempDir::new().unwrap();
    let work_dir = tempfile::TempDir::new().unwrap();
    let config = upframer_worker::WorkerConfig {
        work_dir: work_dir.path().to_path_buf(),
        poll_block: Duration::from_secs(2),
        ..upframer_worker::WorkerConfig::default()
    };
    let h = Harness::with_config(
        config,
        work_dir,
        Arc::new(LocalStorage::new(output.path())),
        Arc::new(FakeExtractor { frames: 1 }),
    );
    let video = h.local_video();
    let running = start_running(&h).await;

    h.executor.shutdown();
    h.send_job(video.to_str().unwrap(), "job-late", None).await;

    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(h.broker.messages(RESULT_QUEUE).len(), 1);
    assert!(h.broker.messages(PRIMARY_QUEUE).is_empty());
    assert_eq!(h.broker.in_flight(), 0);
}

#[tokio::test]
async fn test_shutdown_interrupts_poll_error_backoff() {
    let h = Harness::new(Arc::new(MockStore::new()), Arc::new(FakeExtractor { frames: 1 }));
    let running = start_running(&h).await;

    // Every poll now fails and the loop backs off
    h.broker.close().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.executor.shutdown();
    let stopped = tokio::time::timeout(Duration::from_secs(1), running).await;

    assert!(stopped.is_ok(), "shutdown waited out the poll backoff");
    stopped.unwrap().unwrap().unwrap();
}
