use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::request::ScanRequest;

/// The only non-terminal job status string; anything else ends polling.
pub const RUNNING_STATUS: &str = "running";

/// `/alive` response.
#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
}

/// Body of a finished scan, shared by `/scan` responses and terminal job
/// statuses. Error responses arrive success-shaped with `error`/`details`
/// set, so every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mode: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_xml: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ScanReport {
    /// The service-reported failure, `"{error}: {details}"` when both are
    /// present, or `None` for a clean report.
    pub fn backend_error(&self) -> Option<String> {
        self.error.as_ref().map(|err| match &self.details {
            Some(details) => format!("{err}: {details}"),
            None => err.clone(),
        })
    }
}

/// `/scan/async/{job_id}` response. Running jobs carry only `status`;
/// terminal ones carry the report fields (and usually no `status` at all).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub report: ScanReport,
}

impl JobStatus {
    pub fn is_running(&self) -> bool {
        self.status.as_deref() == Some(RUNNING_STATUS)
    }
}

impl From<ScanReport> for JobStatus {
    fn from(report: ScanReport) -> Self {
        Self {
            status: None,
            report,
        }
    }
}

/// `/scan/async` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AsyncStarted {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// `/file` response: raw content for normal output, parsed host data for XML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Host>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One scanned host from a parsed XML results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub address: String,
    pub status: String,
    #[serde(default)]
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    pub port: u16,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub banner: String,
}

/// Thin HTTP client for the scanning service. Decodes bodies only; callers
/// classify service-reported errors. Non-2xx responses surface as
/// `reqwest::Error` regardless of body content.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn alive(&self) -> Result<Health, reqwest::Error> {
        let url = self.url("/alive");
        debug!(%url, "health check");
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Run a scan synchronously, blocking until the service finishes it.
    pub async fn scan(&self, request: &ScanRequest) -> Result<ScanReport, reqwest::Error> {
        let url = self.url("/scan");
        debug!(%url, target = %request.target, "sync scan");
        self.http
            .post(url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    /// Start a scan as a background job; the returned body carries the job id.
    pub async fn scan_async(&self, request: &ScanRequest) -> Result<AsyncStarted, reqwest::Error> {
        let url = self.url("/scan/async");
        debug!(%url, target = %request.target, "async scan start");
        self.http
            .post(url)
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub async fn job_status(&self, job_id: &str) -> Result<JobStatus, reqwest::Error> {
        let url = self.url(&format!("/scan/async/{job_id}"));
        debug!(%url, "job status fetch");
        self.http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    pub async fn fetch_file(
        &self,
        output_file: &str,
        output_mode: u8,
    ) -> Result<FileReport, reqwest::Error> {
        let url = self.url("/file");
        debug!(%url, output_file, output_mode, "results file fetch");
        let mode = output_mode.to_string();
        self.http
            .get(url)
            .query(&[("output_file", output_file), ("output_mode", mode.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_is_the_only_non_terminal_status() {
        let running: JobStatus = serde_json::from_str(r#"{"status":"running"}"#).unwrap();
        assert!(running.is_running());

        let done: JobStatus = serde_json::from_str(r#"{"status":"done"}"#).unwrap();
        assert!(!done.is_running());

        // terminal job bodies often have no status field at all
        let finished: JobStatus =
            serde_json::from_str(r#"{"message":"ok","output":"..."}"#).unwrap();
        assert!(!finished.is_running());
        assert_eq!(finished.report.message.as_deref(), Some("ok"));
    }

    #[test]
    fn backend_error_concatenates_details() {
        let report: ScanReport =
            serde_json::from_str(r#"{"error":"Nmap scan failed","details":"bad flag"}"#).unwrap();
        assert_eq!(
            report.backend_error().as_deref(),
            Some("Nmap scan failed: bad flag")
        );

        let bare: ScanReport = serde_json::from_str(r#"{"error":"Invalid job ID"}"#).unwrap();
        assert_eq!(bare.backend_error().as_deref(), Some("Invalid job ID"));

        assert_eq!(ScanReport::default().backend_error(), None);
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = ApiClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
