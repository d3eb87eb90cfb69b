//! `ExecutionEvent` — append-only lifecycle markers (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Created,
    Started,
    Progress,
    Completed,
    Failed,
    Cancelled,
    ContainerCreated,
    CleanupStarted,
    CleanupCompleted,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::Created => "CREATED",
            EventType::Started => "STARTED",
            EventType::Progress => "PROGRESS",
            EventType::Completed => "COMPLETED",
            EventType::Failed => "FAILED",
            EventType::Cancelled => "CANCELLED",
            EventType::ContainerCreated => "CONTAINER_CREATED",
            EventType::CleanupStarted => "CLEANUP_STARTED",
            EventType::CleanupCompleted => "CLEANUP_COMPLETED",
        };
        write!(f, "{s}")
    }
}

/// An append-only row in `core_execution_events`. Never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionEvent {
    pub execution_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl ExecutionEvent {
    pub fn new(execution_id: impl Into<String>, event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            execution_id: execution_id.into(),
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    /// The `{from, to, timestamp, error?, result?}` payload a status
    /// transition records, per spec.md §4.3.
    pub fn transition(
        execution_id: impl Into<String>,
        event_type: EventType,
        from: &str,
        to: &str,
        error: Option<&str>,
        result: Option<&serde_json::Value>,
    ) -> Self {
        let mut data = serde_json::json!({ "from": from, "to": to });
        if let Some(e) = error {
            data["error"] = serde_json::Value::String(e.to_string());
        }
        if let Some(r) = result {
            data["result"] = r.clone();
        }
        Self::new(execution_id, event_type, data)
    }
}
