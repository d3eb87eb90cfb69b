//! Request/response DTOs for the REST facade (spec.md §6).

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitRunRequest {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitRunResponse {
    pub run_id: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ListRunsQuery {
    pub workflow: Option<String>,
    pub status: Option<String>,
    pub lane: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RunWorkflowRequest {
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateScheduleRequest {
    pub name: String,
    pub target_type: crate::schedule::ScheduleTargetType,
    pub target_name: String,
    pub cron_expression: Option<String>,
    pub interval_seconds: Option<i64>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_instances")]
    pub max_instances: i32,
    #[serde(default = "default_misfire_grace")]
    pub misfire_grace_seconds: i64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_instances() -> i32 {
    1
}

fn default_misfire_grace() -> i64 {
    120
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DatabaseHealthResponse {
    pub connected: bool,
    pub backend: String,
}

/// `POST /runs/retry-failed` body (spec.md §4.2 `retry_failed(filter)`):
/// bulk-resets terminal FAILED work items back to PENDING. Both filters are
/// optional and narrow rather than require one another.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RetryFailedWorkItemsRequest {
    pub domain: Option<String>,
    pub workflow: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RetryFailedWorkItemsResponse {
    pub reset_count: i64,
}
