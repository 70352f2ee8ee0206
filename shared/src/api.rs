//! API types and structures for the task scheduling service
//!
//! This module defines the task models exposed over the REST API, the submit
//! request body, and the standardized error envelope returned on failures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted and waiting in the priority queue
    Queued,
    /// Picked up by a worker and currently executing
    Processing,
    /// Finished successfully; `result` is populated
    Completed,
    /// Finished with a business failure; `error` is populated
    Failed,
    /// Cancelled before or during execution; `error` is populated
    Cancelled,
}

impl TaskStatus {
    /// Returns true for states that permit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parses a wire status string; returns None for anything else.
    pub fn parse(value: &str) -> Option<TaskStatus> {
        match value {
            "queued" => Some(TaskStatus::Queued),
            "processing" => Some(TaskStatus::Processing),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable progress details attached to a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressInfo {
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    pub eta_seconds: Option<u64>,
}

impl ProgressInfo {
    /// Progress info carrying only a message.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            started_at: None,
            eta_seconds: None,
        }
    }
}

/// Publicly observable projection of a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub task_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub progress: u8,
    pub progress_info: Option<ProgressInfo>,
}

/// Response body for POST /api/v1/tasks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: Uuid,
    pub status: TaskStatus,
}

/// Request body for POST /api/v1/tasks
///
/// `parameters` is validated against the per-job schema before submission;
/// `priority` is bounds-checked by the handler (0-10, lower runs earlier).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTaskRequest {
    pub task_type: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub priority: Option<i64>,
}

/// Standardized error envelope returned on every failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
    pub request_id: Option<String>,
}

/// Machine-readable error codes used in the envelope
pub mod error_codes {
    pub const NOT_FOUND: &str = "not_found";
    pub const HTTP_ERROR: &str = "http_error";
    pub const VALIDATION_ERROR: &str = "validation_error";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const QUEUE_FULL: &str = "queue_full";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// HTTP headers consumed by the server
pub mod headers {
    pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
    pub const X_REQUEST_ID: &str = "x-request-id";
}

/// API endpoint paths
pub mod endpoints {
    pub const HEALTH: &str = "/health";
    pub const TASKS: &str = "/api/v1/tasks";
    pub const TASK_BY_ID: &str = "/api/v1/tasks/{task_id}";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_status_serialization() {
        let queued = TaskStatus::Queued;
        let json = serde_json::to_string(&queued).unwrap();
        assert_eq!(json, "\"queued\"");

        let cancelled = TaskStatus::Cancelled;
        let json = serde_json::to_string(&cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");

        let parsed: TaskStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(parsed, TaskStatus::Processing);
    }

    #[test]
    fn test_task_status_terminal() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_task_status_parse() {
        assert_eq!(TaskStatus::parse("failed"), Some(TaskStatus::Failed));
        assert_eq!(TaskStatus::parse("FAILED"), None);
        assert_eq!(TaskStatus::parse("done"), None);
    }

    #[test]
    fn test_task_info_serializes_absent_fields_as_null() {
        let info = TaskInfo {
            task_id: Uuid::new_v4(),
            status: TaskStatus::Queued,
            task_type: "compute_sum".to_string(),
            parameters: Map::new(),
            result: None,
            error: None,
            progress: 0,
            progress_info: Some(ProgressInfo::message("Queued")),
        };

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["status"], json!("queued"));
        assert_eq!(value["result"], Value::Null);
        assert_eq!(value["error"], Value::Null);
        assert_eq!(value["progress_info"]["message"], json!("Queued"));
        assert_eq!(value["progress_info"]["started_at"], Value::Null);
        // Canonical 36-character textual form
        assert_eq!(value["task_id"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_submit_request_defaults() {
        let request: SubmitTaskRequest =
            serde_json::from_value(json!({ "task_type": "lucky_job" })).unwrap();
        assert_eq!(request.task_type, "lucky_job");
        assert!(request.parameters.is_empty());
        assert_eq!(request.priority, None);
    }
}
