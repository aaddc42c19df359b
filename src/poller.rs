use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ApiClient, JobStatus};

/// How often a job's status is checked unless overridden.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Poll lifecycle. There is no way back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Polling,
    Stopped,
}

/// Terminal notification for one `start()` invocation. At most one event is
/// emitted per start; an explicit `stop()` emits none.
#[derive(Debug, Clone)]
pub enum PollEvent {
    /// The job finished cleanly; carries the terminal status body.
    Completed(JobStatus),
    /// The job reported an error, or a status fetch failed.
    Failed(PollError),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PollError {
    /// Terminal status carried a service-reported error.
    #[error("{0}")]
    Job(String),
    /// A status fetch failed outright; the poll loop does not retry.
    #[error("job status check failed: {0}")]
    Fetch(String),
}

/// Observable poll state, for display and assertions.
#[derive(Debug, Clone)]
pub struct PollSnapshot {
    pub phase: PollPhase,
    pub job_id: Option<String>,
    pub poll_count: u64,
    pub last_error: Option<String>,
    pub result: Option<JobStatus>,
}

struct PollState {
    phase: PollPhase,
    job_id: Option<String>,
    poll_count: u64,
    last_error: Option<String>,
    result: Option<JobStatus>,
    // Monotonic start() counter; completions from older generations are
    // discarded without effect.
    generation: u64,
    cancel: Option<CancellationToken>,
}

/// Tracks one asynchronous scan job by fetching its status on a repeating
/// timer until a terminal status arrives, a fetch fails, or `stop()` is
/// called. Restarting while polling retires the previous timer first, so a
/// poller never has two tick streams alive.
///
/// Fetches are deliberately not serialized: a slow response never delays the
/// next tick, and `poll_count` reflects completion order. Stale completions
/// (older generation, or arriving after the phase left `Polling`) are
/// discarded before touching any state.
pub struct JobPoller {
    client: ApiClient,
    interval: Duration,
    state: Arc<Mutex<PollState>>,
    events: UnboundedSender<PollEvent>,
}

impl JobPoller {
    pub fn new(client: ApiClient) -> (Self, UnboundedReceiver<PollEvent>) {
        Self::with_interval(client, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(
        client: ApiClient,
        interval: Duration,
    ) -> (Self, UnboundedReceiver<PollEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let poller = Self {
            client,
            interval,
            state: Arc::new(Mutex::new(PollState {
                phase: PollPhase::Idle,
                job_id: None,
                poll_count: 0,
                last_error: None,
                result: None,
                generation: 0,
                cancel: None,
            })),
            events,
        };
        (poller, receiver)
    }

    /// Begin polling `job_id`. Resets the poll counter and any prior
    /// result/error, cancels a still-running timer, and performs the first
    /// status check immediately rather than waiting a full interval.
    pub fn start(&self, job_id: impl Into<String>) {
        let job_id = job_id.into();
        let (generation, cancel) = {
            let mut state = self.state.lock().expect("poll state lock");
            if let Some(old) = state.cancel.take() {
                old.cancel();
            }
            state.generation += 1;
            state.phase = PollPhase::Polling;
            state.job_id = Some(job_id.clone());
            state.poll_count = 0;
            state.last_error = None;
            state.result = None;
            let token = CancellationToken::new();
            state.cancel = Some(token.clone());
            (state.generation, token)
        };

        debug!(%job_id, generation, interval_ms = self.interval.as_millis() as u64, "polling started");
        let client = self.client.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        // Each fetch runs as its own task so an outstanding
                        // request cannot skip or delay the next tick.
                        tokio::spawn(poll_once(
                            client.clone(),
                            state.clone(),
                            events.clone(),
                            job_id.clone(),
                            generation,
                        ));
                    }
                }
            }
        });
    }

    /// Cancel the active timer, if any, and freeze the poll state. Safe to
    /// call repeatedly; a completion arriving afterwards has no effect.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("poll state lock");
        if let Some(token) = state.cancel.take() {
            token.cancel();
        }
        if state.phase == PollPhase::Polling {
            debug!(job_id = state.job_id.as_deref().unwrap_or(""), "polling stopped");
            state.phase = PollPhase::Stopped;
        }
    }

    pub fn is_polling(&self) -> bool {
        self.state.lock().expect("poll state lock").phase == PollPhase::Polling
    }

    pub fn snapshot(&self) -> PollSnapshot {
        let state = self.state.lock().expect("poll state lock");
        PollSnapshot {
            phase: state.phase,
            job_id: state.job_id.clone(),
            poll_count: state.poll_count,
            last_error: state.last_error.clone(),
            result: state.result.clone(),
        }
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One status fetch and its state transition. Runs unsynchronized with the
/// ticker; the generation/phase guard makes stale completions inert.
async fn poll_once(
    client: ApiClient,
    state: Arc<Mutex<PollState>>,
    events: UnboundedSender<PollEvent>,
    job_id: String,
    generation: u64,
) {
    let fetched = client.job_status(&job_id).await;

    let mut state = state.lock().expect("poll state lock");
    if state.generation != generation || state.phase != PollPhase::Polling {
        // Raced a stop() or a newer start(); this completion no longer counts.
        return;
    }
    match fetched {
        Ok(status) => {
            state.poll_count += 1;
            debug!(%job_id, poll_count = state.poll_count, "status checked");
            if status.is_running() {
                return;
            }
            state.phase = PollPhase::Stopped;
            if let Some(token) = state.cancel.take() {
                token.cancel();
            }
            state.result = Some(status.clone());
            match status.report.backend_error() {
                Some(err) => {
                    state.last_error = Some(err.clone());
                    let _ = events.send(PollEvent::Failed(PollError::Job(err)));
                }
                None => {
                    let _ = events.send(PollEvent::Completed(status));
                }
            }
        }
        Err(err) => {
            state.phase = PollPhase::Stopped;
            if let Some(token) = state.cancel.take() {
                token.cancel();
            }
            let failure = PollError::Fetch(err.to_string());
            state.last_error = Some(failure.to_string());
            let _ = events.send(PollEvent::Failed(failure));
        }
    }
}
