mod support;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use paperdesk_core::tasks::{EmailScanJob, Progress, ScanRequest, TaskFailure, TaskHandle, EMAIL_SCAN_JOB};
use paperdesk_core::{ApiError, ErrorCategory, Severity, TaskOutcome, TaskPoller};
use serde_json::{json, Value};
use support::{Harness, InstantSleeper};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn base_url(server: &MockServer) -> String {
    format!("{}/api/v1", server.uri())
}

async fn mount_scan_started(server: &MockServer, task_id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/v1/email/scan"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": task_id,
            "message": "Email scan started"
        })))
        .expect(1)
        .mount(server)
        .await;
}

async fn mount_status_once(server: &MockServer, task_id: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/email/scan-status/{}", task_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_scan_polled_to_completion() {
    let server = MockServer::start().await;
    mount_scan_started(&server, "c0ffee").await;
    mount_status_once(&server, "c0ffee", json!({"state": "PENDING", "status": "Task is waiting to be processed"})).await;
    mount_status_once(
        &server,
        "c0ffee",
        json!({"state": "PROGRESS", "current": 2, "total": 5, "status": "Scanning INBOX"}),
    )
    .await;
    mount_status_once(
        &server,
        "c0ffee",
        json!({"state": "SUCCESS", "result": {"emails_processed": 5, "documents_created": 2}}),
    )
    .await;

    let h = Harness::new(&base_url(&server));
    h.authenticate("tok-1").await;

    let sleeper = Arc::new(InstantSleeper::default());
    let poller = TaskPoller::with_sleeper(Duration::from_secs(2), sleeper.clone());
    let job = Arc::new(EmailScanJob::new(h.api.clone(), ScanRequest::default()));

    let progress = Arc::new(Mutex::new(Vec::new()));
    let progress_sink = progress.clone();
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let outcome_sink = outcomes.clone();

    let ticket = poller
        .start_with_progress(
            EMAIL_SCAN_JOB,
            job,
            move |p: &Progress| progress_sink.lock().unwrap().push(p.clone()),
            move |o: TaskOutcome<Value>| outcome_sink.lock().unwrap().push(o),
        )
        .await
        .expect("scan submitted");
    assert_eq!(ticket.handle, TaskHandle::from("c0ffee"));
    assert_eq!(poller.active_handle(EMAIL_SCAN_JOB), Some(TaskHandle::from("c0ffee")));
    ticket.finished().await;

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![TaskOutcome::Succeeded(json!({"emails_processed": 5, "documents_created": 2}))]
    );
    let progress = progress.lock().unwrap();
    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].percent(), Some(40));
    assert_eq!(*sleeper.delays.lock().unwrap(), vec![Duration::from_secs(2); 2]);
    assert!(!poller.is_active(EMAIL_SCAN_JOB));
}

#[tokio::test]
async fn test_scan_request_body_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/email/scan"))
        .and(body_json(json!({"config_id": 4, "days": 30, "force": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"task_id": "t-4"})))
        .expect(1)
        .mount(&server)
        .await;
    mount_status_once(&server, "t-4", json!({"state": "FAILURE", "error": "IMAP authentication failed"})).await;

    let h = Harness::new(&base_url(&server));
    let poller = TaskPoller::with_sleeper(Duration::from_secs(2), Arc::new(InstantSleeper::default()));
    let job = Arc::new(EmailScanJob::new(
        h.api.clone(),
        ScanRequest {
            config_id: Some(4),
            days: 30,
            force: true,
        },
    ));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = outcomes.clone();

    poller
        .start(EMAIL_SCAN_JOB, job, move |o: TaskOutcome<Value>| sink.lock().unwrap().push(o))
        .await
        .expect("scan submitted")
        .finished()
        .await;

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![TaskOutcome::Failed(TaskFailure::Job("IMAP authentication failed".into()))]
    );
}

#[tokio::test]
async fn test_status_error_abandons_scan() {
    let server = MockServer::start().await;
    mount_scan_started(&server, "t-9").await;
    Mock::given(method("GET"))
        .and(path("/api/v1/email/scan-status/t-9"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "Result backend unavailable"})))
        .expect(1)
        .mount(&server)
        .await;

    let h = Harness::new(&base_url(&server));
    let poller = TaskPoller::with_sleeper(Duration::from_secs(2), Arc::new(InstantSleeper::default()));
    let job = Arc::new(EmailScanJob::new(h.api.clone(), ScanRequest::default()));
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let sink = outcomes.clone();

    poller
        .start(EMAIL_SCAN_JOB, job, move |o: TaskOutcome<Value>| sink.lock().unwrap().push(o))
        .await
        .expect("scan submitted")
        .finished()
        .await;

    assert_eq!(
        *outcomes.lock().unwrap(),
        vec![TaskOutcome::Failed(TaskFailure::Transport(ApiError::ServerError(
            "Result backend unavailable".into()
        )))]
    );
    // The pipeline reported the failed status query like any other request.
    let notices = h.sink.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].category, ErrorCategory::ServerError);
}

#[tokio::test]
async fn test_rejected_scan_starts_no_polling() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/email/scan"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"detail": "A scan is already in progress"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let h = Harness::new(&base_url(&server));
    let poller = TaskPoller::with_sleeper(Duration::from_secs(2), Arc::new(InstantSleeper::default()));
    let job = Arc::new(EmailScanJob::new(h.api.clone(), ScanRequest::default()));

    let err = poller
        .start(EMAIL_SCAN_JOB, job, |_: TaskOutcome<Value>| panic!("no terminal callback"))
        .await
        .expect_err("submit rejected");

    assert_eq!(err, ApiError::Conflict("A scan is already in progress".into()));
    assert!(!poller.is_active(EMAIL_SCAN_JOB));
    let notices = h.sink.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].severity, Severity::Warning);
}
