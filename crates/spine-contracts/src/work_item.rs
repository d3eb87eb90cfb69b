//! `WorkItem` — a queued job waiting to be claimed (spec.md §3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkItemState {
    Pending,
    Running,
    Complete,
    Failed,
    RetryWait,
    Cancelled,
}

impl WorkItemState {
    /// Only PENDING (or RETRY_WAIT past its `next_attempt_at`) items may be
    /// claimed — see the claim contract in spec.md §4.6.
    pub fn is_claimable(self) -> bool {
        matches!(self, WorkItemState::Pending)
    }
}

impl std::fmt::Display for WorkItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkItemState::Pending => "PENDING",
            WorkItemState::Running => "RUNNING",
            WorkItemState::Complete => "COMPLETE",
            WorkItemState::Failed => "FAILED",
            WorkItemState::RetryWait => "RETRY_WAIT",
            WorkItemState::Cancelled => "CANCELLED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for WorkItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(WorkItemState::Pending),
            "RUNNING" => Ok(WorkItemState::Running),
            "COMPLETE" => Ok(WorkItemState::Complete),
            "FAILED" => Ok(WorkItemState::Failed),
            "RETRY_WAIT" => Ok(WorkItemState::RetryWait),
            "CANCELLED" => Ok(WorkItemState::Cancelled),
            other => Err(format!("unknown work item state: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkItem {
    pub id: i64,
    pub domain: String,
    pub workflow: String,
    pub partition_key: serde_json::Value,
    pub desired_at: DateTime<Utc>,
    pub priority: i32,
    pub state: WorkItemState,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub current_execution_id: Option<String>,
    pub latest_execution_id: Option<String>,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

    /// `delay(n) = base * 2^(n-1)`, base 60s, capped at `ceiling` (spec.md §4.6).
    pub fn backoff_delay_seconds(attempt: i32, base_seconds: i64, ceiling_seconds: i64) -> i64 {
        let attempt = attempt.max(1) as u32;
        let exp = 2i64.saturating_pow(attempt - 1);
        (base_seconds.saturating_mul(exp)).min(ceiling_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt_until_ceiling() {
        assert_eq!(WorkItem::backoff_delay_seconds(1, 60, 3600), 60);
        assert_eq!(WorkItem::backoff_delay_seconds(2, 60, 3600), 120);
        assert_eq!(WorkItem::backoff_delay_seconds(3, 60, 3600), 240);
        assert_eq!(WorkItem::backoff_delay_seconds(20, 60, 3600), 3600);
    }
}
