//! `Schedule` — a periodic trigger (spec.md §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleTargetType {
    Operation,
    Workflow,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Schedule {
    pub id: String,
    pub name: String,
    pub target_type: ScheduleTargetType,
    pub target_name: String,
    pub cron_expression: Option<String>,
    pub interval_seconds: Option<i64>,
    pub timezone: String,
    pub enabled: bool,
    pub max_instances: i32,
    pub misfire_grace_seconds: i64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// A row in `core_schedule_runs` — one occurrence of a schedule firing
/// (or being skipped as missed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleRunOutcome {
    Dispatched,
    Missed,
    SkippedMaxInstances,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduleRun {
    pub id: String,
    pub schedule_id: String,
    pub occurrence_at: DateTime<Utc>,
    pub execution_id: Option<String>,
    pub outcome: ScheduleRunOutcome,
    pub created_at: DateTime<Utc>,
}
