//! `Execution` — a single run of an operation or workflow step, and the
//! status FSM in spec.md §4.3.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl ExecutionStatus {
    /// Terminal statuses never mutate again (spec.md §3 Execution invariants).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
                | ExecutionStatus::Skipped
        )
    }

    /// Legal direct transitions per the FSM diagram in spec.md §4.3.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Running)
                | (Pending, Cancelled)
                | (Queued, Running)
                | (Queued, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "PENDING",
            ExecutionStatus::Queued => "QUEUED",
            ExecutionStatus::Running => "RUNNING",
            ExecutionStatus::Completed => "COMPLETED",
            ExecutionStatus::Failed => "FAILED",
            ExecutionStatus::Cancelled => "CANCELLED",
            ExecutionStatus::Skipped => "SKIPPED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ExecutionStatus::Pending),
            "QUEUED" => Ok(ExecutionStatus::Queued),
            "RUNNING" => Ok(ExecutionStatus::Running),
            "COMPLETED" => Ok(ExecutionStatus::Completed),
            "FAILED" => Ok(ExecutionStatus::Failed),
            "CANCELLED" => Ok(ExecutionStatus::Cancelled),
            "SKIPPED" => Ok(ExecutionStatus::Skipped),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    Api,
    Cli,
    Schedule,
    Retry,
    Workflow,
    Internal,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerSource::Api => "API",
            TriggerSource::Cli => "CLI",
            TriggerSource::Schedule => "SCHEDULE",
            TriggerSource::Retry => "RETRY",
            TriggerSource::Workflow => "WORKFLOW",
            TriggerSource::Internal => "INTERNAL",
        };
        write!(f, "{s}")
    }
}

/// A single run of an operation or a workflow step (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Execution {
    /// ULID-like sortable id — a UUIDv7 rendered as a string, time-ordered
    /// for free and directly usable in `ORDER BY id` without an extra index.
    pub id: String,
    pub workflow: String,
    pub params: serde_json::Value,
    pub status: ExecutionStatus,
    pub lane: String,
    pub trigger_source: TriggerSource,
    pub parent_execution_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Execution {
    /// New id for a fresh execution row: a UUIDv7 string, sortable by
    /// creation time the way spec.md's "ULID-like sortable string" demands.
    pub fn new_id() -> String {
        uuid::Uuid::now_v7().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_further_transitions() {
        assert!(!ExecutionStatus::Completed.can_transition_to(ExecutionStatus::Running));
        assert!(!ExecutionStatus::Cancelled.can_transition_to(ExecutionStatus::Completed));
    }

    #[test]
    fn pending_can_reach_running_directly_or_via_queued() {
        assert!(ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Running));
        assert!(ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Queued));
        assert!(ExecutionStatus::Queued.can_transition_to(ExecutionStatus::Running));
    }

    #[test]
    fn status_round_trips_through_display_and_from_str() {
        for s in [
            ExecutionStatus::Pending,
            ExecutionStatus::Queued,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
            ExecutionStatus::Skipped,
        ] {
            let parsed: ExecutionStatus = s.to_string().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }
}
