use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::poller::TaskSource;
use super::status::{TaskHandle, TaskStatus, WireTaskStatus};
use crate::api::{ApiClient, ApiError, ApiRequest};

/// Job class under which mailbox scans are tracked.
pub const EMAIL_SCAN_JOB: &str = "email-scan";

const SCAN_PATH: &str = "/email/scan";
const SCAN_STATUS_PATH: &str = "/email/scan-status";

/// Mailbox scans look back a week unless told otherwise.
const DEFAULT_SCAN_DAYS: u32 = 7;

/// Parameters for a manual mailbox scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRequest {
    /// Scan one mailbox; all active mailboxes when `None`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<i64>,
    pub days: u32,
    /// Ignore the last scan time
    pub force: bool,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            config_id: None,
            days: DEFAULT_SCAN_DAYS,
            force: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ScanStarted {
    task_id: String,
}

/// Mailbox scan as a pollable task. The result payload is passed through
/// as raw JSON.
pub struct EmailScanJob {
    api: ApiClient,
    request: ScanRequest,
}

impl EmailScanJob {
    pub fn new(api: ApiClient, request: ScanRequest) -> Self {
        Self { api, request }
    }
}

#[async_trait]
impl TaskSource<Value> for EmailScanJob {
    async fn submit(&self) -> Result<TaskHandle, ApiError> {
        let started: ScanStarted = self.api.post_json(SCAN_PATH, &self.request).await?;
        Ok(TaskHandle(started.task_id))
    }

    async fn fetch_status(&self, handle: &TaskHandle) -> Result<TaskStatus<Value>, ApiError> {
        let path = format!("{}/{}", SCAN_STATUS_PATH, handle);
        let wire: WireTaskStatus = self.api.send_json(ApiRequest::get(path)).await?;
        wire.into_status()
    }
}
