use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::api::{ApiClient, JobStatus, ScanReport};
use crate::poller::{JobPoller, PollError, PollEvent, PollSnapshot};
use crate::request::{self, ValidationError};
use crate::selection::SelectionModel;

/// Everything a scan attempt can fail with, from either execution path.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Rejected locally, before any network activity.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Network failure or non-2xx response from the service.
    #[error("scan service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// Success-shaped response carrying a service-reported error.
    #[error("{0}")]
    Backend(String),
    /// The poll loop ended in failure (job error or mid-poll fetch failure).
    #[error(transparent)]
    Poll(#[from] PollError),
}

/// Identifies a background scan job accepted by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
}

/// Drives scans end to end over both execution paths and holds the
/// displayable outcome: a result body, an error string, or a notice line,
/// plus a busy flag that stays set through the whole async poll.
pub struct ScanController {
    client: ApiClient,
    poller: JobPoller,
    events: UnboundedReceiver<PollEvent>,
    loading: bool,
    result: Option<JobStatus>,
    error: Option<String>,
    notice: Option<String>,
}

impl ScanController {
    pub fn new(client: ApiClient) -> Self {
        let (poller, events) = JobPoller::new(client.clone());
        Self::assemble(client, poller, events)
    }

    pub fn with_poll_interval(client: ApiClient, interval: Duration) -> Self {
        let (poller, events) = JobPoller::with_interval(client.clone(), interval);
        Self::assemble(client, poller, events)
    }

    fn assemble(
        client: ApiClient,
        poller: JobPoller,
        events: UnboundedReceiver<PollEvent>,
    ) -> Self {
        Self {
            client,
            poller,
            events,
            loading: false,
            result: None,
            error: None,
            notice: None,
        }
    }

    /// Validate, submit to `/scan`, and block until the service responds.
    pub async fn run_sync(
        &mut self,
        target: &str,
        selection: &SelectionModel,
    ) -> Result<ScanReport, ScanError> {
        let request = match request::build(target, selection) {
            Ok(request) => request,
            Err(err) => {
                self.error = Some(err.to_string());
                return Err(err.into());
            }
        };
        self.begin();

        let report = match self.client.scan(&request).await {
            Ok(report) => report,
            Err(err) => {
                self.loading = false;
                self.error = Some(err.to_string());
                return Err(err.into());
            }
        };
        self.loading = false;

        if let Some(err) = report.backend_error() {
            self.error = Some(err.clone());
            return Err(ScanError::Backend(err));
        }
        self.notice = Some(
            report
                .message
                .clone()
                .unwrap_or_else(|| "Scan completed successfully".to_string()),
        );
        self.result = Some(JobStatus::from(report.clone()));
        Ok(report)
    }

    /// Validate, submit to `/scan/async`, and hand the accepted job to the
    /// poller. Returns as soon as the job is started; the controller stays
    /// busy until the poll loop reports a terminal state via
    /// [`ScanController::wait`].
    pub async fn run_async(
        &mut self,
        target: &str,
        selection: &SelectionModel,
    ) -> Result<JobHandle, ScanError> {
        let request = match request::build(target, selection) {
            Ok(request) => request,
            Err(err) => {
                self.error = Some(err.to_string());
                return Err(err.into());
            }
        };
        self.begin();

        let started = match self.client.scan_async(&request).await {
            Ok(started) => started,
            Err(err) => {
                self.loading = false;
                self.error = Some(err.to_string());
                return Err(err.into());
            }
        };
        if let Some(err) = started.error {
            self.loading = false;
            self.error = Some(err.clone());
            return Err(ScanError::Backend(err));
        }
        let Some(job_id) = started.job_id else {
            self.loading = false;
            let msg = "scan service accepted the job but returned no job id".to_string();
            self.error = Some(msg.clone());
            return Err(ScanError::Backend(msg));
        };

        self.notice = Some(
            started
                .message
                .unwrap_or_else(|| "Scan started".to_string()),
        );
        debug!(%job_id, "async scan accepted");
        self.poller.start(job_id.clone());
        Ok(JobHandle { job_id })
    }

    /// Await the poll loop's terminal event after a successful
    /// [`ScanController::run_async`] and fold it into the same result/error
    /// fields the sync path uses.
    pub async fn wait(&mut self) -> Result<JobStatus, ScanError> {
        let event = self.events.recv().await;
        self.loading = false;
        match event {
            Some(PollEvent::Completed(status)) => {
                self.notice = Some(
                    status
                        .report
                        .message
                        .clone()
                        .unwrap_or_else(|| "Async scan completed successfully".to_string()),
                );
                self.result = Some(status.clone());
                Ok(status)
            }
            Some(PollEvent::Failed(err)) => {
                self.error = Some(err.to_string());
                Err(err.into())
            }
            // The poller owns the sender for as long as the controller
            // lives, so the channel cannot close underneath us.
            None => Err(ScanError::Backend(
                "polling ended without reporting a result".to_string(),
            )),
        }
    }

    /// Stop tracking the current job without discarding results already held.
    pub fn stop_polling(&mut self) {
        self.poller.stop();
        self.loading = false;
    }

    /// Discard any held result/error/notice and stop polling, returning the
    /// controller to its idle display state. The selection is untouched.
    pub fn clear(&mut self) {
        self.result = None;
        self.error = None;
        self.notice = None;
        self.loading = false;
        self.poller.stop();
        // Drop any already-queued terminal event so a stale completion
        // cannot resurface on a later wait().
        while self.events.try_recv().is_ok() {}
    }

    fn begin(&mut self) {
        self.error = None;
        self.notice = None;
        self.result = None;
        self.loading = true;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn result(&self) -> Option<&JobStatus> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn poll_snapshot(&self) -> PollSnapshot {
        self.poller.snapshot()
    }
}
