use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use nmap_pilot_rs::api::ApiClient;
use nmap_pilot_rs::poller::{JobPoller, PollError, PollEvent, PollPhase};

const TICK: Duration = Duration::from_millis(30);

/// Scripted job-status endpoint. Responses are served in order; once the
/// script runs out every request reports "running". Each request consumes a
/// gate permit first, so a test can hold a fetch in flight by starving the
/// gate and release it later with `add_permits`.
#[derive(Clone)]
struct FakeJobs {
    responses: Arc<Mutex<VecDeque<Value>>>,
    hits: Arc<Mutex<Vec<String>>>,
    gate: Arc<Semaphore>,
}

impl FakeJobs {
    fn scripted(responses: Vec<Value>, free_permits: usize) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            hits: Arc::new(Mutex::new(Vec::new())),
            gate: Arc::new(Semaphore::new(free_permits)),
        }
    }

    fn hit_count(&self) -> usize {
        self.hits.lock().unwrap().len()
    }

    fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

async fn job_status(State(jobs): State<FakeJobs>, Path(job_id): Path<String>) -> Json<Value> {
    jobs.hits.lock().unwrap().push(job_id);
    let permit = jobs.gate.acquire().await.expect("gate open");
    permit.forget();
    let next = jobs
        .responses
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| json!({ "status": "running" }));
    Json(next)
}

async fn serve(jobs: FakeJobs) -> String {
    let app = Router::new()
        .route("/scan/async/{job_id}", get(job_status))
        .with_state(jobs);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn starts_idle() {
    let (poller, _events) = JobPoller::new(ApiClient::new("http://127.0.0.1:1"));
    let snap = poller.snapshot();
    assert_eq!(snap.phase, PollPhase::Idle);
    assert_eq!(snap.poll_count, 0);
    assert!(snap.job_id.is_none());
    assert!(snap.last_error.is_none());
}

#[tokio::test]
async fn completes_after_terminal_status_with_exact_poll_count() {
    let jobs = FakeJobs::scripted(
        vec![
            json!({ "status": "running" }),
            json!({ "status": "running" }),
            json!({ "status": "done", "message": "Nmap scan completed successfully", "output": "done" }),
        ],
        1_000,
    );
    let base = serve(jobs.clone()).await;
    let (poller, mut events) = JobPoller::with_interval(ApiClient::new(base), TICK);

    poller.start("J1");
    let status = match events.recv().await.expect("terminal event") {
        PollEvent::Completed(status) => status,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(status.report.output.as_deref(), Some("done"));

    let snap = poller.snapshot();
    assert_eq!(snap.phase, PollPhase::Stopped);
    assert_eq!(snap.poll_count, 3);
    assert_eq!(snap.job_id.as_deref(), Some("J1"));
    assert!(snap.last_error.is_none());
    assert!(snap.result.is_some());

    // The completion channel fires exactly once and the timer is dead.
    tokio::time::sleep(TICK * 3).await;
    assert!(events.try_recv().is_err());
    let hits = jobs.hit_count();
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(jobs.hit_count(), hits);
}

#[tokio::test]
async fn job_error_fires_the_error_channel_once() {
    let jobs = FakeJobs::scripted(
        vec![
            json!({ "status": "running" }),
            json!({ "error": "Nmap scan failed", "details": "exit code 1" }),
        ],
        1_000,
    );
    let base = serve(jobs.clone()).await;
    let (poller, mut events) = JobPoller::with_interval(ApiClient::new(base), TICK);

    poller.start("J1");
    match events.recv().await.expect("terminal event") {
        PollEvent::Failed(PollError::Job(msg)) => {
            assert_eq!(msg, "Nmap scan failed: exit code 1");
        }
        other => panic!("expected job error, got {other:?}"),
    }

    let snap = poller.snapshot();
    assert_eq!(snap.phase, PollPhase::Stopped);
    assert_eq!(snap.poll_count, 2);
    assert_eq!(snap.last_error.as_deref(), Some("Nmap scan failed: exit code 1"));
    // the terminal body is still recorded
    assert!(snap.result.is_some());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn stop_between_polls_discards_the_inflight_fetch() {
    // The first two fetches respond freely; the third parks on the gate.
    let jobs = FakeJobs::scripted(
        vec![
            json!({ "status": "running" }),
            json!({ "status": "running" }),
            json!({ "status": "done" }),
        ],
        2,
    );
    let base = serve(jobs.clone()).await;
    let (poller, mut events) = JobPoller::with_interval(ApiClient::new(base), TICK);

    poller.start("J1");
    wait_until(|| jobs.hit_count() >= 3 && poller.snapshot().poll_count == 2).await;

    poller.stop();
    jobs.gate.add_permits(10);

    tokio::time::sleep(TICK * 4).await;
    let snap = poller.snapshot();
    assert_eq!(snap.phase, PollPhase::Stopped);
    assert_eq!(snap.poll_count, 2);
    assert!(snap.result.is_none());
    assert!(events.try_recv().is_err());

    // stop when already stopped is a no-op
    poller.stop();
    assert_eq!(poller.snapshot().poll_count, 2);
}

#[tokio::test]
async fn restart_retires_the_previous_timer() {
    // No terminal status: every request reports "running".
    let jobs = FakeJobs::scripted(Vec::new(), 1_000);
    let base = serve(jobs.clone()).await;
    let (poller, _events) = JobPoller::with_interval(ApiClient::new(base), TICK);

    poller.start("J1");
    poller.start("J2");
    tokio::time::sleep(TICK * 5).await;
    poller.stop();

    let hits = jobs.hits();
    let from_j1 = hits.iter().filter(|id| *id == "J1").count();
    let from_j2 = hits.iter().filter(|id| *id == "J2").count();
    // J1's immediate first fetch may have slipped out before the restart,
    // but its timer must not have survived it.
    assert!(from_j1 <= 1, "stale J1 timer ticked {from_j1} times");
    assert!(from_j2 >= 2, "J2 timer never took over");

    let snap = poller.snapshot();
    assert_eq!(snap.job_id.as_deref(), Some("J2"));
    assert_eq!(snap.phase, PollPhase::Stopped);
}

#[tokio::test]
async fn fetch_failure_stops_the_loop_without_retry() {
    let hit_count = Arc::new(Mutex::new(0usize));
    let hits = hit_count.clone();
    let app = Router::new().route(
        "/scan/async/{job_id}",
        get(move || {
            *hits.lock().unwrap() += 1;
            async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (poller, mut events) =
        JobPoller::with_interval(ApiClient::new(format!("http://{addr}")), TICK);
    poller.start("J1");

    match events.recv().await.expect("failure event") {
        PollEvent::Failed(PollError::Fetch(_)) => {}
        other => panic!("expected fetch failure, got {other:?}"),
    }

    let snap = poller.snapshot();
    assert_eq!(snap.phase, PollPhase::Stopped);
    // failed fetches are not counted as polls
    assert_eq!(snap.poll_count, 0);
    assert!(snap.last_error.is_some());

    tokio::time::sleep(TICK * 3).await;
    assert!(events.try_recv().is_err());
    let after = *hit_count.lock().unwrap();
    tokio::time::sleep(TICK * 3).await;
    assert_eq!(*hit_count.lock().unwrap(), after, "poll loop kept fetching");
}
