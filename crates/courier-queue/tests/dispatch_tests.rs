use std::sync::Arc;
use std::time::Duration;

use courier_queue::{
    Admission, AdmissionConfig, AdmissionRouter, BackoffStrategy, DispatchOrder,
    FailureTolerance, JobRecord, JobState, JobStatus, JobStore, MemoryJobStore, MockTransport,
    Progress, QueueError, RetryPolicy, SendRequest, StatusService, WorkerConfig, WorkerPool,
};
use courier_queue::job::MessagePayload;

fn addresses(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("user{}@example.com", i)).collect()
}

fn payload() -> Arc<MessagePayload> {
    Arc::new(MessagePayload {
        from: "me@example.com".to_string(),
        subject: "Referral request".to_string(),
        body: "<p>Hello</p>".to_string(),
        attachment_ref: Some("resume-42".to_string()),
    })
}

fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff: BackoffStrategy::Constant { millis: 10 },
        jitter_factor: 0.0,
        send_timeout: Duration::from_secs(5),
    }
}

struct Harness {
    store: Arc<MemoryJobStore>,
    transport: Arc<MockTransport>,
    pool: Arc<WorkerPool>,
}

impl Harness {
    fn new(transport: MockTransport, config: WorkerConfig) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let transport = Arc::new(transport);
        let pool = Arc::new(WorkerPool::new(store.clone(), transport.clone(), config));
        Self {
            store,
            transport,
            pool,
        }
    }

    async fn submit(
        &self,
        recipients: Vec<String>,
        tolerance: FailureTolerance,
    ) -> (courier_queue::JobId, tokio::task::JoinHandle<()>) {
        let record = JobRecord::new(recipients.into(), payload(), tolerance);
        let order = DispatchOrder {
            job_id: record.id,
            recipients: record.recipients.clone(),
            payload: record.payload.clone(),
        };
        let created = self.store.create(record).await.unwrap();
        (created.id, self.pool.spawn(order))
    }
}

#[tokio::test(start_paused = true)]
async fn test_partial_failure_within_tolerance_completes() {
    let recipients = addresses(10);
    let transport = MockTransport::new()
        .reject(&recipients[2], "550 mailbox unavailable")
        .reject(&recipients[5], "550 mailbox unavailable")
        .reject(&recipients[8], "550 mailbox unavailable");
    let h = Harness::new(transport, WorkerConfig::default());

    let (id, dispatch) = h.submit(recipients, FailureTolerance::default()).await;
    dispatch.await.unwrap();

    let job = h.store.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Completed(Progress { sent: 7, failed: 3 }));
    assert_eq!(job.progress_percent(), 70);
    assert_eq!(job.errors.len(), 3);
    assert!(job.errors.iter().all(|e| e.contains("550 mailbox unavailable")));
}

#[tokio::test(start_paused = true)]
async fn test_every_recipient_failing_fails_job() {
    let recipients = addresses(3);
    let mut transport = MockTransport::new();
    for r in &recipients {
        transport = transport.reject(r, "554 rejected");
    }
    let h = Harness::new(transport, WorkerConfig::default());

    let (id, dispatch) = h.submit(recipients, FailureTolerance::MaxCount { count: 10 }).await;
    dispatch.await.unwrap();

    let job = h.store.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Failed(Progress { sent: 0, failed: 3 }));
}

#[tokio::test(start_paused = true)]
async fn test_strict_tolerance_fails_on_one_bounce() {
    let recipients = addresses(4);
    let transport = MockTransport::new().reject(&recipients[0], "550 no such user");
    let h = Harness::new(transport, WorkerConfig::default());

    let (id, dispatch) = h.submit(recipients, FailureTolerance::None).await;
    dispatch.await.unwrap();

    let job = h.store.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Failed(Progress { sent: 3, failed: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried() {
    let recipients = addresses(2);
    let transport = MockTransport::new().flaky(&recipients[0], 2);
    let config = WorkerConfig {
        retry: fast_retry(3),
        ..Default::default()
    };
    let h = Harness::new(transport, config);

    let (id, dispatch) = h.submit(recipients.clone(), FailureTolerance::None).await;
    dispatch.await.unwrap();

    let job = h.store.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Completed(Progress { sent: 2, failed: 0 }));
    assert_eq!(h.transport.attempts(&recipients[0]), 3);
    assert_eq!(h.transport.attempts(&recipients[1]), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retries_stop_at_max_attempts() {
    let recipients = addresses(2);
    let transport = MockTransport::new().unavailable(&recipients[1]);
    let config = WorkerConfig {
        retry: fast_retry(3),
        ..Default::default()
    };
    let h = Harness::new(transport, config);

    let (id, dispatch) = h.submit(recipients.clone(), FailureTolerance::default()).await;
    dispatch.await.unwrap();

    let job = h.store.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Completed(Progress { sent: 1, failed: 1 }));
    assert_eq!(h.transport.attempts(&recipients[1]), 3);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let recipients = addresses(2);
    let transport = MockTransport::new().reject(&recipients[0], "550 unknown user");
    let config = WorkerConfig {
        retry: fast_retry(5),
        ..Default::default()
    };
    let h = Harness::new(transport, config);

    let (_, dispatch) = h.submit(recipients.clone(), FailureTolerance::default()).await;
    dispatch.await.unwrap();

    assert_eq!(h.transport.attempts(&recipients[0]), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hung_send_times_out() {
    let recipients = addresses(3);
    let transport = MockTransport::new().hang(&recipients[1]);
    let config = WorkerConfig {
        retry: fast_retry(2),
        ..Default::default()
    };
    let h = Harness::new(transport, config);

    let (id, dispatch) = h.submit(recipients.clone(), FailureTolerance::default()).await;
    dispatch.await.unwrap();

    let job = h.store.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Completed(Progress { sent: 2, failed: 1 }));
    assert_eq!(h.transport.attempts(&recipients[1]), 2);
    assert_eq!(job.errors, vec![format!("{}: Send timed out", recipients[1])]);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_sends_never_exceed_limit() {
    let transport = MockTransport::new().with_latency(Duration::from_millis(20));
    let config = WorkerConfig {
        max_in_flight: 4,
        ..Default::default()
    };
    let h = Harness::new(transport, config);

    // two jobs share the same pool-wide limit
    let (first, a) = h.submit(addresses(30), FailureTolerance::default()).await;
    let (second, b) = h.submit(addresses(30), FailureTolerance::default()).await;
    a.await.unwrap();
    b.await.unwrap();

    assert!(h.transport.peak_in_flight() <= 4);
    assert_eq!(h.transport.peak_in_flight(), 4);
    assert_eq!(h.transport.calls(), 60);
    for id in [first, second] {
        assert_eq!(h.store.get(id).await.unwrap().status(), JobStatus::Completed);
    }
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_progress_monotonically() {
    let recipients = addresses(25);
    let transport = MockTransport::new()
        .with_latency(Duration::from_millis(15))
        .reject(&recipients[3], "550")
        .reject(&recipients[17], "550");
    let config = WorkerConfig {
        max_in_flight: 3,
        ..Default::default()
    };
    let h = Harness::new(transport, config);
    let (id, dispatch) = h.submit(recipients, FailureTolerance::default()).await;

    let store = h.store.clone();
    let reader = tokio::spawn(async move {
        let mut last_rank = 0;
        let mut last_sent = 0;
        let mut last_failed = 0;
        let mut last_updated = None;
        loop {
            let snap = store.get(id).await.unwrap();
            let failed = snap.failed_count().unwrap_or(0);

            assert!(snap.state.rank() >= last_rank);
            assert!(snap.sent_count() >= last_sent);
            assert!(failed >= last_failed);
            assert!(snap.sent_count() + failed <= snap.total_recipients);
            if let Some(prev) = last_updated {
                assert!(snap.updated_at >= prev);
            }

            last_rank = snap.state.rank();
            last_sent = snap.sent_count();
            last_failed = failed;
            last_updated = Some(snap.updated_at);

            if snap.state.is_terminal() {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    });

    dispatch.await.unwrap();
    let last = reader.await.unwrap();
    assert_eq!(last.state, JobState::Completed(Progress { sent: 23, failed: 2 }));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_settles_waiting_recipients_as_failed() {
    let transport = MockTransport::new().with_latency(Duration::from_millis(100));
    let config = WorkerConfig {
        max_in_flight: 1,
        ..Default::default()
    };
    let h = Harness::new(transport, config);
    let (id, dispatch) = h.submit(addresses(5), FailureTolerance::default()).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    h.pool.shutdown();
    dispatch.await.unwrap();

    let job = h.store.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Failed(Progress { sent: 1, failed: 4 }));
    assert!(job.errors.iter().all(|e| e.contains("dispatcher shut down")));
}

#[tokio::test]
async fn test_status_reads_after_completion_are_idempotent() {
    let h = Harness::new(MockTransport::new(), WorkerConfig::default());
    let (id, dispatch) = h.submit(addresses(3), FailureTolerance::default()).await;
    dispatch.await.unwrap();

    let status = StatusService::new(h.store.clone());
    let first = status.status(id).await.unwrap();
    let second = status.status(id).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.progress_percent, 100);
    assert_eq!(first.failed_count, Some(0));

    let missing = uuid::Uuid::new_v4();
    assert_eq!(
        status.status(missing).await.unwrap_err(),
        QueueError::NotFound(missing)
    );
}

#[tokio::test]
async fn test_admission_routes_by_recipient_count() {
    let store = Arc::new(MemoryJobStore::new());
    let transport = Arc::new(MockTransport::new());
    let pool = Arc::new(WorkerPool::new(
        store.clone(),
        transport.clone(),
        WorkerConfig::default(),
    ));
    let router = AdmissionRouter::new(store.clone(), pool, AdmissionConfig::default());

    let single = SendRequest {
        from: "me@example.com".to_string(),
        to: vec!["you@example.com".to_string(), "me@example.com".to_string()],
        subject: "Hi".to_string(),
        body: "Body".to_string(),
        attachment_ref: None,
    };
    // the sender is excluded, leaving a single recipient
    assert!(matches!(router.admit(single).await.unwrap(), Admission::Sent(_)));
    assert!(store.is_empty().await);

    let bulk = SendRequest {
        from: "me@example.com".to_string(),
        to: vec!["a@example.com; b@example.com c@example.com".to_string()],
        subject: "Hi".to_string(),
        body: "Body".to_string(),
        attachment_ref: None,
    };
    let Admission::Queued(queued) = router.admit(bulk).await.unwrap() else {
        panic!("expected a queued job");
    };
    assert_eq!(store.len().await, 1);
    queued.dispatch.await.unwrap();

    // one inline message plus one per bulk recipient
    assert_eq!(transport.calls(), 4);
    let job = store.get(queued.job.id).await.unwrap();
    assert_eq!(job.state, JobState::Completed(Progress { sent: 3, failed: 0 }));
}

/// Delivers to everyone except one address, where `send` panics
#[derive(Debug)]
struct PanickingTransport {
    victim: String,
}

#[async_trait::async_trait]
impl courier_queue::MailTransport for PanickingTransport {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn send(
        &self,
        message: &courier_queue::OutboundMessage,
    ) -> Result<courier_queue::Delivery, courier_queue::TransportError> {
        if message.primary_recipient() == self.victim {
            panic!("relay client crashed");
        }
        Ok(courier_queue::Delivery::accepted(None))
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_send_fails_only_that_recipient() {
    let recipients = addresses(4);
    let store = Arc::new(MemoryJobStore::new());
    let transport = Arc::new(PanickingTransport {
        victim: recipients[1].clone(),
    });
    let pool = Arc::new(WorkerPool::new(
        store.clone(),
        transport,
        WorkerConfig::default(),
    ));

    let record = JobRecord::new(recipients.clone().into(), payload(), FailureTolerance::default());
    let order = DispatchOrder {
        job_id: record.id,
        recipients: record.recipients.clone(),
        payload: record.payload.clone(),
    };
    let id = store.create(record).await.unwrap().id;
    pool.spawn(order).await.unwrap();

    let job = store.get(id).await.unwrap();
    assert_eq!(job.state, JobState::Completed(Progress { sent: 3, failed: 1 }));
    assert_eq!(job.failed_count(), Some(1));
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].starts_with(&recipients[1]));
    assert!(job.errors[0].contains("delivery task panicked"));
}
