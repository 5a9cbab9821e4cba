use std::sync::Arc;
use std::time::Duration;

use courier_api::{CourierConfig, CourierServer};
use courier_client::{
    ClientError, CourierClient, JobStatus, PollEvent, Poller, PollerConfig, SendEmail, SendOutcome,
};
use courier_queue::MockTransport;

/// Serve a fresh Courier API on an ephemeral port.
async fn spawn_server(transport: MockTransport) -> CourierClient {
    let server = CourierServer::with_transport(CourierConfig::default(), Arc::new(transport));
    let app = server.router();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    CourierClient::new(&format!("http://{}", addr))
}

fn message(to: &[&str]) -> SendEmail {
    SendEmail::new("me@example.com", to.iter().copied(), "Referral", "<p>Hi</p>")
        .with_resume("resume-3")
}

fn fast_poll() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(20),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_single_recipient_is_delivered() {
    let client = spawn_server(MockTransport::new()).await;

    let outcome = client.send_email(&message(&["a@example.com"])).await.unwrap();
    match outcome {
        SendOutcome::Delivered(receipt) => {
            assert_eq!(receipt.recipients, vec!["a@example.com".to_string()]);
        }
        other => panic!("expected inline delivery, got {:?}", other),
    }
}

#[tokio::test]
async fn test_bulk_send_is_followed_to_completion() {
    let client = Arc::new(spawn_server(MockTransport::new()).await);
    let to = ["a@example.com", "b@example.com", "c@example.com", "d@example.com"];

    let job = match client.send_email(&message(&to)).await.unwrap() {
        SendOutcome::Queued(job) => job,
        other => panic!("expected a queued job, got {:?}", other),
    };
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.total_recipients, 4);

    let mut handle = Poller::start(client.clone(), job.job_id, fast_poll());
    let last = tokio::time::timeout(Duration::from_secs(10), handle.finished())
        .await
        .unwrap();

    let view = last.view().unwrap();
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.sent_count, 4);
    assert_eq!(last.percent(), Some(100));

    // a finished job reads back unchanged
    let again = client.job_status(job.job_id).await.unwrap();
    assert_eq!(&again, view);
}

#[tokio::test]
async fn test_failed_bulk_job_is_reported() {
    let transport = MockTransport::new()
        .reject("a@example.com", "550 no such user")
        .reject("b@example.com", "550 no such user");
    let client = Arc::new(spawn_server(transport).await);

    let SendOutcome::Queued(job) = client
        .send_email(&message(&["a@example.com", "b@example.com"]))
        .await
        .unwrap()
    else {
        panic!("expected a queued job");
    };

    let mut handle = Poller::start(client, job.job_id, fast_poll());
    let last = handle.finished().await;
    let view = last.view().unwrap();
    assert_eq!(view.status, JobStatus::Failed);
    assert_eq!(view.failed_count, Some(2));
    assert_eq!(last.percent(), Some(0));
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let client = Arc::new(spawn_server(MockTransport::new()).await);
    let id = uuid::Uuid::new_v4();

    let err = client.job_status(id).await.unwrap_err();
    assert!(matches!(err, ClientError::NotFound(_)));

    let mut handle = Poller::start(client, id, fast_poll());
    assert!(matches!(
        handle.finished().await,
        PollEvent::Failed(ClientError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_validation_errors_carry_the_api_code() {
    let client = spawn_server(MockTransport::new()).await;

    let err = client.send_email(&message(&["nope"])).await.unwrap_err();
    match err {
        ClientError::Api { status, code, .. } => {
            assert_eq!(status, 422);
            assert_eq!(code, "VALIDATION_ERROR");
        }
        other => panic!("expected an API error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_a_connection_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = CourierClient::new(&format!("http://{}", addr));
    let err = client.job_status(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ClientError::Connection(_)));
    assert!(err.is_transient());
}
