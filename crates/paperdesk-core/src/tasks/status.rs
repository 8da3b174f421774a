use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::api::ApiError;

/// Opaque task id issued by a "start job" call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(pub String);

impl TaskHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskHandle {
    fn from(s: &str) -> Self {
        TaskHandle(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    pub message: Option<String>,
}

impl Progress {
    pub fn percent(&self) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let pct = (self.current.min(self.total) * 100) / self.total;
        Some(pct as u8)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus<R> {
    Pending,
    Running(Option<Progress>),
    Succeeded(R),
    Failed(String),
}

impl<R> TaskStatus<R> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded(_) | TaskStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskFailure {
    /// The job itself reported failure
    Job(String),
    /// A status query failed before the job reached a terminal state
    Transport(ApiError),
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskFailure::Job(msg) => write!(f, "Task failed: {}", msg),
            TaskFailure::Transport(err) => write!(f, "Lost track of task: {}", err),
        }
    }
}

/// Result handed to the terminal callback.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<R> {
    Succeeded(R),
    Failed(TaskFailure),
}

impl<R> TaskOutcome<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded(_))
    }
}

/// Status payload as reported by the backend's task endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct WireTaskStatus {
    pub state: String,
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

const UNKNOWN_FAILURE: &str = "Task failed without an error message";

impl WireTaskStatus {
    /// Map the backend's task vocabulary onto [`TaskStatus`].
    pub fn into_status<R: DeserializeOwned>(self) -> Result<TaskStatus<R>, ApiError> {
        let status = match self.state.to_ascii_uppercase().as_str() {
            "PENDING" => TaskStatus::Pending,
            "RUNNING" | "PROGRESS" | "STARTED" | "RETRY" => {
                let progress = match (self.current, self.total) {
                    (Some(current), Some(total)) => Some(Progress {
                        current,
                        total,
                        message: self.status.filter(|s| !s.is_empty()),
                    }),
                    _ => None,
                };
                TaskStatus::Running(progress)
            }
            "SUCCESS" => {
                let result = serde_json::from_value(self.result.unwrap_or(Value::Null)).map_err(|e| {
                    ApiError::Unclassified {
                        status: None,
                        message: format!("Invalid task result: {}", e),
                    }
                })?;
                TaskStatus::Succeeded(result)
            }
            "FAILURE" | "REVOKED" => {
                TaskStatus::Failed(self.error.unwrap_or_else(|| UNKNOWN_FAILURE.to_string()))
            }
            other => {
                warn!(state = %other, "Unknown task state, treating as pending");
                TaskStatus::Pending
            }
        };
        Ok(status)
    }
}
