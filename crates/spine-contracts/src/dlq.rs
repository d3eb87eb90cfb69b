//! `DeadLetter` — an exhausted failure (spec.md §3, §4.8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeadLetter {
    pub id: String,
    pub execution_id: String,
    pub workflow: String,
    pub params: serde_json::Value,
    pub error: String,
    pub retry_count: i32,
    pub max_retries: i32,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    /// Bumped by `replay()`. Distinct from `retry_count`, which is the
    /// historical record of the original run's exhausted attempts and is
    /// never reset on replay (see DESIGN.md's Open Question resolution #1).
    pub replay_count: i32,
    pub created_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}
